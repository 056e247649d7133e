//! Index-and-post extractor for vipsocks24.net (ground: `vipsocks24.py`).
//! Most posts carry a `<textarea>` list like socksproxylist24, but some
//! instead link a ZIP download via a "Download" image button.
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "http://vipsocks24.net/";
const NAME: &str = "vipsocks24-net";

pub struct Vipsocks24;

impl Scraper for Vipsocks24 {
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
                proxylist.extend(parse_webpage(&post_html, framework).await);
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

async fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(textarea_sel) = Selector::parse("textarea[onclick]") else {
        return Vec::new();
    };

    let proxylist = if let Some(textarea) = document.select(&textarea_sel).next() {
        textarea
            .text()
            .collect::<String>()
            .lines()
            .map(str::to_string)
            .collect()
    } else {
        log::debug!("{NAME}: unable to find textarea with proxy list");
        download_proxylist(&document, framework).await
    };

    if proxylist.is_empty() {
        framework.dump_debug_html(NAME, html);
    }
    proxylist
}

/// Deprecated page format fallback: find the `<img alt="Download">`'s
/// parent link and pull a ZIP archive instead.
async fn download_proxylist(document: &Html, framework: &ScraperFramework) -> Vec<String> {
    let Ok(img_sel) = Selector::parse("img[alt='Download']") else {
        return Vec::new();
    };

    let Some(download_url) = document.select(&img_sel).next().and_then(|img| {
        img.parent()
            .and_then(scraper::ElementRef::wrap)
            .filter(|parent| parent.value().name() == "a")
            .and_then(|parent| parent.value().attr("href"))
    }) else {
        log::error!("{NAME}: unable to find download button for proxy list");
        return Vec::new();
    };

    log::info!("{NAME}: downloading proxylist from: {download_url}");
    let Some(bytes) = framework.get_bytes(download_url).await else {
        log::error!("{NAME}: failed proxylist download: {download_url}");
        return Vec::new();
    };

    match crate::scrapers::unzip_first_txt_file(&bytes) {
        Some(lines) => lines,
        None => {
            log::error!("{NAME}: file downloaded from {download_url} is not a usable Zip archive");
            Vec::new()
        }
    }
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

    #[tokio::test]
    async fn textarea_lines_become_proxies() {
        let html = r#"<textarea onclick="this.focus();this.select()">1.2.3.4:1080</textarea>"#;
        let proxies = parse_webpage(html, &test_framework()).await;
        assert_eq!(proxies, vec!["1.2.3.4:1080".to_string()]);
    }

    #[tokio::test]
    async fn missing_textarea_and_download_button_yields_empty() {
        let html = "<div>nothing here</div>";
        let proxies = parse_webpage(html, &test_framework()).await;
        assert!(proxies.is_empty());
    }
}
