//! Index-and-post extractor for proxyserverlist24.top (ground:
//! `proxyserverlist24.py`). The landing page links to dated posts; only
//! posts titled "Proxy Server ..." carry a proxy list.
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "http://www.proxyserverlist24.top/";
const NAME: &str = "proxyserverlist24-top";

pub struct Proxyserverlist24;

impl Scraper for Proxyserverlist24 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let Some(html) = framework.get(BASE_URL, BASE_URL).await else {
                log::error!("{NAME}: failed to download webpage: {BASE_URL}");
                return Vec::new();
            };

            let urls = parse_links(&html, framework);
            let mut proxylist = Vec::new();
            for url in urls {
                let Some(post_html) = framework.get(&url, BASE_URL).await else {
                    log::error!("{NAME}: failed to download webpage: {url}");
                    continue;
                };
                proxylist.extend(parse_webpage(&post_html, framework));
            }
            proxylist
        })
    }
}

fn parse_links(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let title_sel = Selector::parse("h3.post-title.entry-title a").unwrap();

    let mut urls = Vec::new();
    for link in document.select(&title_sel) {
        if !link.text().collect::<String>().contains("Proxy Server") {
            continue;
        }
        if let Some(href) = link.value().attr("href") {
            urls.push(href.to_string());
        }
    }

    if urls.is_empty() {
        framework.dump_debug_html(NAME, html);
    }
    urls
}

/// The proxy list lives in the third `<span>` of a `<pre class="alt2"
/// dir="ltr">` container, one proxy per line.
fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(container_sel) = Selector::parse("pre.alt2[dir='ltr']") else {
        return Vec::new();
    };
    let span_sel = Selector::parse("span").unwrap();

    let Some(container) = document.select(&container_sel).next() else {
        log::error!("{NAME}: unable to find element with proxy list");
        framework.dump_debug_html(NAME, html);
        return Vec::new();
    };

    let spans: Vec<_> = container.select(&span_sel).collect();
    if spans.len() < 3 {
        log::error!("{NAME}: unable to find element with proxy list");
        framework.dump_debug_html(NAME, html);
        return Vec::new();
    }

    let proxylist: Vec<String> = spans[2]
        .text()
        .collect::<String>()
        .lines()
        .map(str::to_string)
        .collect();

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
    fn only_proxy_server_titled_links_are_kept() {
        let html = r#"
            <h3 class="post-title entry-title"><a href="/a">Proxy Server List</a></h3>
            <h3 class="post-title entry-title"><a href="/b">Unrelated Post</a></h3>
        "#;
        let urls = parse_links(html, &test_framework());
        assert_eq!(urls, vec!["/a".to_string()]);
    }

    #[test]
    fn third_span_lines_become_proxies() {
        let html = r#"
            <pre class="alt2" dir="ltr">
                <span>one</span><span>two</span><span>1.2.3.4:8080
5.6.7.8:8081</span>
            </pre>
        "#;
        let proxies = parse_webpage(html, &test_framework());
        assert_eq!(proxies, vec!["1.2.3.4:8080".to_string(), "5.6.7.8:8081".to_string()]);
    }
}
