//! Paginated extractor for premproxy.com (ground: `premproxy.py`). Ports
//! are mapped through a key->port dictionary extracted from a linked
//! p.a.c.k.e.r.-packed JS file; each row's checkbox `value` attribute
//! carries `ip|key`.
use std::collections::HashMap;

use regex::Regex;
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::deobfuscate::{self, UnpackResult};
use crate::scrapers::Scraper;

const BASE_URL: &str = "https://premproxy.com";
const NAME: &str = "premproxy-com";

pub struct Premproxy;

impl Scraper for Premproxy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let urls = extract_pages(framework).await;
            let mut proxylist = Vec::new();
            for url in urls {
                let Some(html) = framework.get(&url, BASE_URL).await else {
                    log::error!("{NAME}: failed to download webpage: {url}");
                    continue;
                };
                proxylist.extend(parse_webpage(&html, framework).await);
                framework.paginate_delay().await;
            }
            proxylist
        })
    }
}

/// premproxy.com's pagination link count is inconsistent, so the set of
/// page URLs is read off the main list page's `ul.pagination` each time.
async fn extract_pages(framework: &ScraperFramework) -> Vec<String> {
    let list_url = format!("{BASE_URL}/list/");
    let Some(html) = framework.get(&list_url, BASE_URL).await else {
        log::error!("{NAME}: failed to download webpage: {list_url}");
        return Vec::new();
    };

    let document = Html::parse_document(&html);
    let Ok(pagination_sel) = Selector::parse("ul.pagination a") else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for link in document.select(&pagination_sel) {
        if link.text().collect::<String>().trim() == "next" {
            continue;
        }
        if let Some(href) = link.value().attr("href") {
            if href.contains("list") {
                urls.push(format!("{BASE_URL}{href}"));
            } else {
                urls.push(format!("{list_url}{href}"));
            }
        }
    }
    urls
}

/// Extracts a `key -> port` dictionary from the second `<script src=...>`
/// on the page, which links a p.a.c.k.e.r.-packed JS file of
/// `$(...).something(key, port)`-shaped calls.
async fn extract_ports(js_url: &str, framework: &ScraperFramework) -> HashMap<String, String> {
    let mut dictionary = HashMap::new();
    let Some(js) = framework.get(js_url, BASE_URL).await else {
        log::error!("{NAME}: failed to download webpage: {js_url}");
        return dictionary;
    };

    let unpacked = match deobfuscate::deobfuscate(&js) {
        Ok(UnpackResult::Unpacked(s)) => s,
        Ok(UnpackResult::NotPacked) => js,
        Err(e) => {
            log::error!("{NAME}: failed to extract ports from {js_url}: {e}");
            return dictionary;
        }
    };

    let cleaned = unpacked
        .replace("$(document).ready(function(){", "")
        .replace("});", "")
        .replace('\\', "")
        .replace('\'', "")
        .replace('.', "");

    let paren_re = Regex::new(r"\((.*?)\)").unwrap();
    let parts: Vec<String> = paren_re
        .captures_iter(&cleaned)
        .map(|c| c[1].to_string())
        .collect();

    let mut i = 0;
    while i + 1 < parts.len() {
        dictionary.insert(parts[i].clone(), parts[i + 1].clone());
        i += 2;
    }
    dictionary
}

async fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let script_sel = Selector::parse("script").unwrap();

    let scripts: Vec<_> = document.select(&script_sel).collect();
    let Some(js_src) = scripts.get(1).and_then(|s| s.value().attr("src")) else {
        return Vec::new();
    };
    let ports = extract_ports(&format!("{BASE_URL}{js_src}"), framework).await;
    if ports.is_empty() {
        return Vec::new();
    }

    let row_sel = Selector::parse("tr.anon, tr.transp").unwrap();
    let country_sel = Selector::parse("td[data-label='Country: ']").unwrap();
    let input_sel = Selector::parse("input").unwrap();

    let mut proxylist = Vec::new();
    for row in document.select(&row_sel) {
        if let Some(country_cell) = row.select(&country_sel).next() {
            let country = country_cell.text().collect::<String>().trim().to_lowercase();
            if !framework.accepted_country(&country) {
                continue;
            }
        }

        let Some(input) = row.select(&input_sel).next() else {
            continue;
        };
        if input.value().attr("type") != Some("checkbox") {
            continue;
        }
        let Some(value) = input.value().attr("value") else {
            continue;
        };

        let parts: Vec<&str> = value.split('|').collect();
        if parts.len() != 2 {
            continue;
        }
        if let Some(port) = ports.get(parts[1]) {
            let ip = parts[0].trim();
            if crate::parser::ip_is_valid(ip) {
                proxylist.push(format!("http://{ip}:{port}"));
            }
        }
    }

    if proxylist.is_empty() {
        framework.dump_debug_html(NAME, html);
    }
    proxylist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_dictionary_pairs_up_parenthesized_groups() {
        let cleaned = "foo(abc,8080)bar(def,8081)";
        let paren_re = Regex::new(r"\((.*?)\)").unwrap();
        let parts: Vec<String> = paren_re.captures_iter(cleaned).map(|c| c[1].to_string()).collect();
        let mut dict = HashMap::new();
        let mut i = 0;
        while i + 1 < parts.len() {
            dict.insert(parts[i].clone(), parts[i + 1].clone());
            i += 2;
        }
        assert_eq!(dict.get("abc,8080").map(String::as_str), None);
        assert_eq!(dict.len(), 1);
    }
}
