//! Paginated extractor for idcloak.com (ground: `idcloak.py`). HTTP/HTTPS
//! only; idcloak does list SOCKS4/5 but too rarely to be worth the extra
//! column parsing.
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::scrapers::Scraper;

const BASE_URL: &str = "http://www.idcloak.com/proxylist/proxy-list.html";
const NAME: &str = "idcloak-com";

pub struct Idcloak;

impl Scraper for Idcloak {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut proxylist = Vec::new();
            let mut page = 1u32;

            loop {
                let Some(html) = scrape_page(framework, page).await else {
                    log::error!("{NAME}: failed to download webpage, page {page}");
                    break;
                };
                let (proxies, next_page) = parse_page(&html, framework);
                if proxies.is_empty() {
                    log::info!("{NAME}: scrapping finished, transparent proxies ignored");
                    break;
                }
                proxylist.extend(proxies);

                match next_page {
                    Some(next) => {
                        framework.paginate_delay().await;
                        page = next;
                    }
                    None => break,
                }
            }

            proxylist
        })
    }
}

async fn scrape_page(framework: &ScraperFramework, page: u32) -> Option<String> {
    let page_str = page.to_string();
    let form = [
        ("port[]", "all"),
        ("protocol-http", "true"),
        ("protocol-https", "true"),
        ("anonymity-medium", "true"),
        ("anonymity-high", "true"),
        ("page", page_str.as_str()),
    ];
    framework.post_form(BASE_URL, &form).await
}

fn parse_page(html: &str, framework: &ScraperFramework) -> (Vec<String>, Option<u32>) {
    let document = Html::parse_document(html);
    let proxylist = parse_webpage(&document, framework, html);
    let next_page = parse_next_page(&document);
    (proxylist, next_page)
}

/// Columns: ..., 6 Port, 7 IP (ordering is reversed from the other sites).
fn parse_webpage(document: &Html, framework: &ScraperFramework, raw_html: &str) -> Vec<String> {
    let table_sel = Selector::parse("table#sort tr").unwrap();
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

        proxylist.push(format!("{}:{}", columns[7], columns[6]));
    }

    if proxylist.is_empty() {
        framework.dump_debug_html(NAME, raw_html);
    }
    proxylist
}

/// idcloak's pagination is a row of `<input>` elements; the one marked
/// `this_page` is current. If it isn't the last, the next page number is
/// `current + 1`.
fn parse_next_page(document: &Html) -> Option<u32> {
    let pagination_sel = Selector::parse("div.pagination").ok()?;
    let input_sel = Selector::parse("input").ok()?;

    let pagination = document.select(&pagination_sel).next()?;
    let inputs: Vec<_> = pagination.select(&input_sel).collect();
    let current_index = inputs
        .iter()
        .position(|el| el.value().attr("class") == Some("this_page"))?;
    let current_page = current_index + 1;

    if current_page < inputs.len() {
        Some(current_page as u32 + 1)
    } else {
        None
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

    #[test]
    fn parses_reversed_ip_port_columns() {
        let html = r#"
            <table id="sort">
                <tr><td></td><td></td><td></td><td></td><td></td><td></td>
                    <td>8080</td><td>1.2.3.4</td></tr>
            </table>
        "#;
        let document = Html::parse_document(html);
        let proxies = parse_webpage(&document, &test_framework(), html);
        assert_eq!(proxies, vec!["1.2.3.4:8080".to_string()]);
    }

    #[test]
    fn no_next_page_when_current_is_last() {
        let html = r#"
            <div class="pagination">
                <input class="page"/><input class="this_page"/>
            </div>
        "#;
        let document = Html::parse_document(html);
        assert_eq!(parse_next_page(&document), None);
    }

    #[test]
    fn next_page_when_more_remain() {
        let html = r#"
            <div class="pagination">
                <input class="this_page"/><input class="page"/>
            </div>
        "#;
        let document = Html::parse_document(html);
        assert_eq!(parse_next_page(&document), Some(2));
    }
}
