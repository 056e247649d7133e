//! Tabular extractor for free-proxy-list.net (ground: `freeproxylist.py`).
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "https://free-proxy-list.net";
const NAME: &str = "freeproxylist-net";

pub struct Freeproxylist;

impl Scraper for Freeproxylist {
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

/// Columns: 0 IP, 1 Port, 2 Code, 3 Country, 4 Anonymity, 5 Google, 6
/// Https, 7 Last Checked. Transparent anonymity and ignored countries are
/// skipped.
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
            continue;
        }

        let country = columns[3].to_lowercase();
        if !framework.accepted_country(&country) {
            continue;
        }
        if columns[4].to_lowercase() == "transparent" {
            continue;
        }

        proxylist.push(format!("http://{}:{}", columns[0], columns[1]));
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
            ignore_countries: vec!["china".to_string()],
            download_path: std::path::PathBuf::from("."),
            debug: false,
            proxy_file: None,
        }
    }

    #[test]
    fn parses_fixed_width_table_rows() {
        let html = r#"
            <table id="proxylisttable"><tbody>
                <tr><td>1.2.3.4</td><td>8080</td><td>US</td><td>united states</td>
                    <td>elite proxy</td><td>no</td><td>no</td><td>1 min ago</td></tr>
                <tr><td>5.6.7.8</td><td>80</td><td>CN</td><td>china</td>
                    <td>anonymous</td><td>no</td><td>no</td><td>2 min ago</td></tr>
                <tr><td>9.9.9.9</td><td>81</td><td>FR</td><td>france</td>
                    <td>transparent</td><td>no</td><td>no</td><td>3 min ago</td></tr>
            </tbody></table>
        "#;
        let proxies = parse_webpage(html, &test_framework());
        assert_eq!(proxies, vec!["http://1.2.3.4:8080".to_string()]);
    }
}
