//! Obfuscated-port extractor for sockslist.net (ground: `sockslist.py`).
//! Ports are hidden behind a `document.write(a^b^c)`-style expression,
//! evaluated against a crazy-XOR dictionary found in an inline `<script>`.
use regex::Regex;
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::deobfuscate::XorDict;
use crate::scrapers::Scraper;

const BASE_URL: &str = "https://sockslist.net";
const NAME: &str = "sockslist-net";
const URLS: [&str; 3] = [
    "https://sockslist.net/list/proxy-socks-5-list#proxylist",
    "https://sockslist.net/list/proxy-socks-5-list/2#proxylist",
    "https://sockslist.net/list/proxy-socks-5-list/3#proxylist",
];

pub struct Sockslist;

impl Scraper for Sockslist {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut proxylist = Vec::new();
            for url in URLS {
                let Some(html) = framework.get(url, BASE_URL).await else {
                    log::error!("{NAME}: failed to download webpage: {url}");
                    continue;
                };
                proxylist.extend(parse_webpage(&html, framework));
            }
            proxylist
        })
    }
}

fn find_xor_dict(document: &Html) -> Option<XorDict> {
    let script_sel = Selector::parse("script").unwrap();
    for script in document.select(&script_sel) {
        let code: String = script.text().collect();
        for line in code.lines() {
            let line = line.trim();
            if line.contains('^') && line.contains(';') && line.contains('=') {
                return Some(XorDict::parse(line));
            }
        }
    }
    None
}

fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);

    let Some(encoding) = find_xor_dict(&document) else {
        log::error!("{NAME}: unable to find crazy XOR decoding secret code");
        framework.dump_debug_html(NAME, html);
        return Vec::new();
    };

    let Ok(table_sel) = Selector::parse("table.proxytbl tr") else {
        return Vec::new();
    };
    let ip_sel = Selector::parse("td.t_ip").unwrap();
    let port_sel = Selector::parse("td.t_port").unwrap();
    let country_sel = Selector::parse("td.t_country").unwrap();
    let port_expr_re = Regex::new(r"document\.write\(([\w\d^]+)\)").unwrap();

    let table = document.select(&table_sel);
    let mut proxylist = Vec::new();
    let mut seen_any_row = false;
    for row in table {
        let Some(ip_cell) = row.select(&ip_sel).next() else {
            continue;
        };
        seen_any_row = true;
        let ip: String = ip_cell.text().collect::<String>().trim().to_string();
        if !crate::parser::ip_is_valid(&ip) {
            log::warn!("{NAME}: invalid IP found: {ip}");
            continue;
        }

        let Some(port_cell) = row.select(&port_sel).next() else {
            continue;
        };
        let port_text: String = port_cell.text().collect();
        let Some(caps) = port_expr_re.captures(&port_text) else {
            log::error!("{NAME}: unable to find proxy port number");
            continue;
        };
        let Some(port) = encoding.eval(&caps[1]) else {
            log::error!("{NAME}: unable to decode proxy port number");
            continue;
        };

        let country = row
            .select(&country_sel)
            .next()
            .map(|c| c.text().collect::<String>())
            .unwrap_or_default();
        if framework.ignore_countries.iter().any(|c| c == &country) {
            continue;
        }

        proxylist.push(format!("{ip}:{port}"));
    }

    if !seen_any_row {
        log::error!("{NAME}: unable to find table with proxy list");
    }
    if proxylist.is_empty() {
        framework.dump_debug_html(NAME, html);
    }
    proxylist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_framework() -> ScraperFramework {
        ScraperFramework {
            session: reqwest::Client::new(),
            fetch_config: crate::http_client::FetchConfig::default(),
            ignore_countries: vec![],
            download_path: std::path::PathBuf::from("."),
            debug: false,
            proxy_file: None,
        }
    }

    #[test]
    fn decodes_xor_obfuscated_port() {
        let html = r#"
            <script>a=5;b=3;c=a^b;d=c^2;</script>
            <table class="proxytbl">
                <tr>
                    <td class="t_ip">1.2.3.4</td>
                    <td class="t_port">document.write(d)</td>
                    <td class="t_country">canada</td>
                </tr>
            </table>
        "#;
        let proxies = parse_webpage(html, &test_framework());
        assert_eq!(proxies, vec!["1.2.3.4:4".to_string()]);
    }
}
