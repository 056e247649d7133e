//! Tabular extractor for socks-proxy.net (ground: `socksproxy.py`).
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "https://socks-proxy.net";
const NAME: &str = "socksproxy-net";

pub struct Socksproxy;

impl Scraper for Socksproxy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let Some(html) = framework.get(BASE_URL, BASE_URL).await else {
                log::error!("{NAME}: failed to download webpage: {BASE_URL}");
                return Vec::new();
            };
            parse_webpage(&html, framework)
        })
    }
}

/// Columns: 0 IP, 1 Port, 2 Code, 3 Country, 4 Version, 5 Anonymity, 6
/// Https, 7 Last Checked.
fn parse_webpage(html: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table#proxylisttable tbody tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();

    let mut proxylist = Vec::new();
    for row in document.select(&table_sel) {
        let columns: Vec<String> = row
            .select(&cell_sel)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if columns.len() != 8 {
            log::error!("{NAME}: scrapping aborted, not enough columns");
            break;
        }

        let country = columns[3].to_lowercase();
        if !framework.accepted_country(&country) {
            continue;
        }
        if columns[5].to_lowercase() == "transparent" {
            continue;
        }

        let protocol = columns[4].to_lowercase();
        proxylist.push(format!("{}://{}:{}", protocol, columns[0], columns[1]));
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
    fn attaches_protocol_from_version_column() {
        let html = r#"
            <table id="proxylisttable"><tbody>
                <tr><td>1.2.3.4</td><td>1080</td><td>US</td><td>united states</td>
                    <td>Socks5</td><td>anonymous</td><td>no</td><td>1 min ago</td></tr>
            </tbody></table>
        "#;
        let proxies = parse_webpage(html, &test_framework());
        assert_eq!(proxies, vec!["socks5://1.2.3.4:1080".to_string()]);
    }
}
