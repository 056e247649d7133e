//! Index-and-post extractor for socksproxylist24.top (ground:
//! `socksproxylist24.py`). Unlike proxyserverlist24, every linked post is
//! followed (no title filter), and the list lives in a single `<textarea>`.
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "http://www.socksproxylist24.top/";
const NAME: &str = "socksproxylist24-top";

pub struct Socksproxylist24;

impl Scraper for Socksproxylist24 {
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

    let urls: Vec<String> = document
        .select(&title_sel)
        .filter_map(|link| link.value().attr("href").map(str::to_string))
        .collect();

    if urls.is_empty() {
        framework.dump_debug_html(NAME, html);
    }
    urls
}

fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(textarea_sel) = Selector::parse("textarea[onclick]") else {
        return Vec::new();
    };

    let Some(textarea) = document.select(&textarea_sel).next() else {
        log::error!("{NAME}: unable to find textarea with proxy list");
        framework.dump_debug_html(NAME, html);
        return Vec::new();
    };

    let proxylist: Vec<String> = textarea
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
    fn all_post_links_are_kept_unfiltered() {
        let html = r#"
            <h3 class="post-title entry-title"><a href="/a">Anything</a></h3>
            <h3 class="post-title entry-title"><a href="/b">Whatever</a></h3>
        "#;
        let urls = parse_links(html, &test_framework());
        assert_eq!(urls, vec!["/a".to_string(), "/b".to_string()]);
    }

    #[test]
    fn textarea_lines_become_proxies() {
        let html = r#"<textarea onclick="this.focus();this.select()">1.2.3.4:1080
5.6.7.8:1080</textarea>"#;
        let proxies = parse_webpage(html, &test_framework());
        assert_eq!(proxies, vec!["1.2.3.4:1080".to_string(), "5.6.7.8:1080".to_string()]);
    }
}
