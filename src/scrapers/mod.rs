//! Scraper Framework and Scrapers (C3, spec.md §4.3).
//!
//! Every scraper returns raw proxy strings; the framework owns the
//! configured fetcher, site-appropriate headers, the ignore-country list,
//! and the debug HTML dump hook shared by every extractor (ground:
//! `proxy_scrapper.py::ProxyScrapper`).
pub mod filereader;
pub mod freeproxylist;
pub mod idcloak;
pub mod premproxy;
pub mod proxynova;
pub mod proxyserverlist24;
pub mod socksproxy;
pub mod socksproxylist24;
pub mod sockslist;
pub mod spysone;
pub mod vipsocks24;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;

use crate::config::ScrapperConfig;
use crate::http_client::{self, FetchConfig};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:54.0) Gecko/20100101 Firefox/54.0";

/// Shared plumbing every per-site extractor is handed: a configured
/// session, retry policy, the ignore-country list and a debug dump hook.
/// Mirrors `proxy_scrapper.py::ProxyScrapper`'s constructor fields.
pub struct ScraperFramework {
    pub session: Client,
    pub fetch_config: FetchConfig,
    pub ignore_countries: Vec<String>,
    pub download_path: PathBuf,
    pub debug: bool,
    pub proxy_file: Option<PathBuf>,
}

impl ScraperFramework {
    pub fn new(config: &ScrapperConfig, download_path: PathBuf, debug: bool) -> Self {
        let fetch_config = FetchConfig {
            max_retries: config.retries,
            backoff_factor: config.backoff_factor,
            connect_timeout: config.timeout,
            read_timeout: config.timeout,
        };
        let session = http_client::build_session(&fetch_config, config.proxy.as_deref())
            .unwrap_or_else(|_| Client::new());

        ScraperFramework {
            session,
            fetch_config,
            ignore_countries: config.ignore_countries.clone(),
            download_path,
            debug,
            proxy_file: config.proxy_file.clone(),
        }
    }

    fn headers(&self, referer: &str) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(DESKTOP_USER_AGENT),
        );
        if let Ok(value) = reqwest::header::HeaderValue::from_str(referer) {
            headers.insert(reqwest::header::REFERER, value);
        }
        headers
    }

    /// GET `url`, returning the body on HTTP 200 and `None` otherwise,
    /// mirroring `proxy_scrapper.py::download_webpage`'s "200 or nothing"
    /// contract.
    pub async fn get(&self, url: &str, referer: &str) -> Option<String> {
        match http_client::get(&self.session, url, self.headers(referer), &self.fetch_config).await {
            Ok(result) if result.status.is_success() => Some(result.body),
            Ok(result) => {
                log::error!("scraper fetch of {url} returned status {}", result.status);
                None
            }
            Err(e) => {
                log::error!("scraper fetch of {url} failed: {e}");
                None
            }
        }
    }

    /// POSTs a form payload, returning the body on HTTP 200 (ground:
    /// `idcloak.py::scrap_page`'s `post=payload` call).
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Option<String> {
        let body = serde_urlencoded::to_string(form).ok()?;
        let mut headers = self.headers(url);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        match http_client::post(&self.session, url, body, headers, &self.fetch_config).await {
            Ok(result) if result.status.is_success() => Some(result.body),
            Ok(result) => {
                log::error!("scraper post to {url} returned status {}", result.status);
                None
            }
            Err(e) => {
                log::error!("scraper post to {url} failed: {e}");
                None
            }
        }
    }

    /// Downloads raw bytes (for ZIP archive targets).
    pub async fn get_bytes(&self, url: &str) -> Option<Vec<u8>> {
        match self.session.get(url).headers(self.headers(url)).send().await {
            Ok(response) if response.status().is_success() => response.bytes().await.ok().map(|b| b.to_vec()),
            _ => None,
        }
    }

    /// Is this lowercase country name *not* on the ignore list.
    pub fn accepted_country(&self, country: &str) -> bool {
        !self.ignore_countries.iter().any(|c| c == country)
    }

    /// Writes the full HTML to `download_path/<name>.html` when a parse
    /// yields zero proxies and debug mode is on (spec.md §4.3).
    pub fn dump_debug_html(&self, name: &str, html: &str) {
        if !self.debug {
            return;
        }
        let path = self.download_path.join(format!("{name}.html"));
        if let Err(e) = std::fs::write(&path, html) {
            log::warn!("failed to write debug dump {}: {e}", path.display());
        }
    }

    /// Sleeps 2.0-4.0s uniformly at random between paginated requests
    /// (spec.md §4.3, §5).
    pub async fn paginate_delay(&self) {
        let secs = 2.0 + rand::random::<f64>() * 2.0;
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

/// Every scraper implements this; `scrape` performs the network I/O and
/// returns raw proxy strings on success, logging and returning empty on
/// parse failure (spec.md §7 item 3, never propagated as a hard error so
/// one broken site doesn't abort the refresh).
pub trait Scraper: Send + Sync {
    fn name(&self) -> &'static str;
    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>>;
}

/// Runs every registered scraper against one shared framework instance,
/// concatenating their raw output. Matches the orchestrator's "periodically
/// re-invoke C3" responsibility (spec.md §2).
pub async fn scrape_all(framework: &ScraperFramework) -> Vec<String> {
    let mut scrapers: Vec<Box<dyn Scraper>> = vec![
        Box::new(freeproxylist::Freeproxylist),
        Box::new(socksproxy::Socksproxy),
        Box::new(proxynova::ProxyNova),
        Box::new(idcloak::Idcloak),
        Box::new(sockslist::Sockslist),
        Box::new(spysone::SpysOne::http()),
        Box::new(spysone::SpysOne::https()),
        Box::new(spysone::SpysOne::socks()),
        Box::new(premproxy::Premproxy),
        Box::new(proxyserverlist24::Proxyserverlist24),
        Box::new(socksproxylist24::Socksproxylist24),
        Box::new(vipsocks24::Vipsocks24),
    ];
    if let Some(path) = framework.proxy_file.clone() {
        scrapers.push(Box::new(filereader::FileReader::new(path)));
    }

    let mut all = Vec::new();
    for scraper in &scrapers {
        let found = scraper.scrape(framework).await;
        if found.is_empty() {
            log::error!("scraper {} found no proxies", scraper.name());
        } else {
            log::info!("scraper {} found {} proxies", scraper.name(), found.len());
        }
        all.extend(found);
    }
    all
}

/// Extracts the first `.txt` entry of an in-memory ZIP archive as UTF-8
/// lines (spec.md §4.3 index-and-post ZIP handling; ground:
/// `vipsocks24.py::download_proxylist`).
pub fn unzip_first_txt_file(bytes: &[u8]) -> Option<Vec<String>> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).ok()?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).ok()?;
        if !file.name().ends_with(".txt") {
            continue;
        }
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut file, &mut contents).ok()?;
        return Some(contents.lines().map(str::to_string).collect());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_country_respects_ignore_list() {
        let framework = ScraperFramework {
            session: Client::new(),
            fetch_config: FetchConfig::default(),
            ignore_countries: vec!["china".to_string()],
            download_path: PathBuf::from("."),
            debug: false,
            proxy_file: None,
        };
        assert!(!framework.accepted_country("china"));
        assert!(framework.accepted_country("canada"));
    }
}
