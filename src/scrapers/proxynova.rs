//! Tabular extractor with inline `document.write('ip')` IP obfuscation
//! for proxynova.com (ground: `proxynova.py`).
use regex::Regex;
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "https://www.proxynova.com";
const NAME: &str = "proxynova-com";
const URLS: [&str; 2] = [
    "https://www.proxynova.com/proxy-server-list/elite-proxies/",
    "https://www.proxynova.com/proxy-server-list/anonymous-proxies/",
];

pub struct ProxyNova;

impl Scraper for ProxyNova {
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

/// Columns: 0 IP (inline script), 1 Port, ..., 5 Country, 6 Anonymity.
fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table#tbl_proxy_list tbody tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();
    let script_sel = Selector::parse("script").unwrap();
    let ip_re = Regex::new(r"document\.write\('([\d.]+)'\)").unwrap();

    let mut proxylist = Vec::new();
    for row in document.select(&table_sel) {
        let columns: Vec<_> = row.select(&cell_sel).collect();
        if columns.len() != 8 {
            continue;
        }

        let Some(script) = columns[0].select(&script_sel).next() else {
            log::error!("{NAME}: invalid IP format on IP column");
            break;
        };
        let script_text: String = script.text().collect();
        let Some(ip_caps) = ip_re.captures(&script_text) else {
            log::error!("{NAME}: invalid IP format on IP column");
            break;
        };
        let ip = ip_caps[1].trim().to_string();

        let port = columns[1].text().collect::<String>().trim().to_string();
        let country = columns[5].text().collect::<String>().trim().to_lowercase();
        let status = columns[6].text().collect::<String>().trim().to_lowercase();

        if !framework.accepted_country(&country) {
            continue;
        }
        if status == "transparent" {
            continue;
        }

        proxylist.push(format!("{ip}:{port}"));
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
    fn extracts_ip_from_inline_script() {
        let html = r#"
            <table id="tbl_proxy_list"><tbody>
                <tr>
                    <td><script>document.write('1.2.3.4')</script></td>
                    <td>8080</td><td></td><td></td><td></td>
                    <td><a>united states<span>Dallas</span></a></td>
                    <td><span>elite</span></td><td></td>
                </tr>
            </tbody></table>
        "#;
        let proxies = parse_webpage(html, &test_framework());
        assert_eq!(proxies, vec!["1.2.3.4:8080".to_string()]);
    }
}
