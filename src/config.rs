//! Configuration (C6): `clap`-parsed CLI merged with a YAML config file,
//! validated at startup. Ported from `utils.py::get_args`'s argument
//! groups; the `TryFrom`-based validation pattern and the fatal-at-startup
//! `LoadConfigError` convention follow the original teacher's `config.rs`.
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::store::Protocol;

/// Command-line flags. Anything not passed here falls back to the YAML
/// file, and anything absent from both falls back to the defaults below.
#[derive(Debug, Parser)]
#[command(name = "pogo-proxies", about = "Scrapes, tests and republishes open proxies")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug artifact dumps (HTML, stage response bodies).
    #[arg(long = "debug")]
    pub debug: bool,

    /// Override the database connection string.
    #[arg(long = "db-url")]
    pub db_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_database_url")]
    database_url: String,

    #[serde(default = "default_download_path")]
    download_path: PathBuf,
    #[serde(default = "default_log_path")]
    log_path: PathBuf,

    #[serde(default = "default_proxy_scan_interval")]
    proxy_scan_interval: u64,
    #[serde(default = "default_refresh_interval")]
    proxy_refresh_interval: u64,
    #[serde(default = "default_output_interval")]
    output_interval: u64,
    #[serde(default = "default_output_limit")]
    output_limit: u32,
    #[serde(default)]
    output_no_protocol: bool,
    #[serde(default = "default_output_http")]
    output_http: Option<String>,
    #[serde(default = "default_output_socks")]
    output_socks: Option<String>,
    #[serde(default)]
    output_kinancity: Option<String>,
    #[serde(default)]
    output_proxychains: Option<String>,

    #[serde(default = "default_tester_retries")]
    tester_retries: u32,
    #[serde(default = "default_tester_backoff_factor")]
    tester_backoff_factor: f64,
    #[serde(default = "default_tester_timeout")]
    tester_timeout: f64,
    #[serde(default = "default_tester_max_concurrency")]
    tester_max_concurrency: u32,
    #[serde(default)]
    tester_disable_anonymity: bool,
    #[serde(default = "default_tester_notice_interval")]
    tester_notice_interval: u64,
    #[serde(default = "default_pogo_version")]
    tester_pogo_version: String,
    #[serde(default = "default_judge_url")]
    tester_judge_url: String,
    #[serde(default = "default_mobile_user_agent")]
    tester_mobile_user_agent: String,

    #[serde(default = "default_scrapper_retries")]
    scrapper_retries: u32,
    #[serde(default = "default_scrapper_backoff_factor")]
    scrapper_backoff_factor: f64,
    #[serde(default = "default_scrapper_timeout")]
    scrapper_timeout: f64,
    #[serde(default)]
    scrapper_proxy: Option<String>,
    #[serde(default)]
    proxy_file: Option<PathBuf>,

    #[serde(default = "default_ignore_countries")]
    ignore_countries: Vec<String>,

    #[serde(default)]
    local_ip: Option<IpAddr>,
}

fn default_database_url() -> String {
    "postgres://localhost/pogo_proxies".to_string()
}
fn default_download_path() -> PathBuf {
    PathBuf::from("downloads")
}
fn default_log_path() -> PathBuf {
    PathBuf::from("logs")
}
fn default_proxy_scan_interval() -> u64 {
    3600
}
fn default_refresh_interval() -> u64 {
    3600
}
fn default_output_interval() -> u64 {
    60 * 60
}
fn default_output_limit() -> u32 {
    100
}
fn default_output_http() -> Option<String> {
    Some("working_http.txt".to_string())
}
fn default_output_socks() -> Option<String> {
    Some("working_socks.txt".to_string())
}
fn default_tester_retries() -> u32 {
    5
}
fn default_tester_backoff_factor() -> f64 {
    0.5
}
fn default_tester_timeout() -> f64 {
    5.0
}
fn default_tester_max_concurrency() -> u32 {
    100
}
fn default_tester_notice_interval() -> u64 {
    60
}
fn default_pogo_version() -> String {
    "0.175.1".to_string()
}
fn default_judge_url() -> String {
    "http://azenv.net/".to_string()
}
fn default_mobile_user_agent() -> String {
    "pokemongo/1 CFNetwork/811.4.18 Darwin/16.5.0".to_string()
}
fn default_scrapper_retries() -> u32 {
    3
}
fn default_scrapper_backoff_factor() -> f64 {
    0.5
}
fn default_scrapper_timeout() -> f64 {
    5.0
}
fn default_ignore_countries() -> Vec<String> {
    vec!["china".to_string()]
}

/// Which file outputs are enabled and how they should be rendered.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub interval: Duration,
    pub limit: u32,
    pub include_protocol: bool,
    pub http_path: Option<PathBuf>,
    pub socks_path: Option<PathBuf>,
    pub kinancity_path: Option<PathBuf>,
    pub proxychains_path: Option<PathBuf>,
}

/// Tester-side knobs: pipeline retry/backoff/timeout plus scheduling.
#[derive(Debug, Clone)]
pub struct TesterConfig {
    pub retries: u32,
    pub backoff_factor: f64,
    pub timeout: Duration,
    pub max_concurrency: u32,
    pub disable_anonymity: bool,
    pub notice_interval: Duration,
    pub pogo_version: String,
    pub judge_url: String,
    pub scan_interval: Duration,
    pub mobile_user_agent: String,
}

/// Scraper-side knobs: retry/backoff/timeout plus an optional upstream
/// proxy for the scrape requests themselves.
#[derive(Debug, Clone)]
pub struct ScrapperConfig {
    pub retries: u32,
    pub backoff_factor: f64,
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub ignore_countries: Vec<String>,
    /// Optional line-delimited proxy list read by the `file-reader` source
    /// in addition to the network scrapers (ground: `filereader.py`).
    pub proxy_file: Option<PathBuf>,
}

/// Fully validated, merged configuration ready for the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub download_path: PathBuf,
    pub log_path: PathBuf,
    pub debug: bool,
    pub proxy_refresh_interval: Duration,
    pub output: OutputConfig,
    pub tester: TesterConfig,
    pub scrapper: ScrapperConfig,
    pub local_ip: Option<IpAddr>,
    pub default_protocol: Protocol,
}

impl Config {
    /// Loads the YAML file named by `cli.config_file`, merges CLI
    /// overrides on top, and validates the result. Mirrors
    /// `config.rs::load_config`'s "parse then validate" shape, with
    /// conflict checks adapted to this domain (distinct output paths).
    pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(&cli.config_file)?;
        let file: ConfigFile = serde_yaml::from_str(&raw)?;

        let database_url = cli.db_url.clone().unwrap_or(file.database_url);

        let config = Config {
            database_url,
            download_path: file.download_path,
            log_path: file.log_path,
            debug: cli.debug,
            proxy_refresh_interval: Duration::from_secs(file.proxy_refresh_interval),
            output: OutputConfig {
                interval: Duration::from_secs(file.output_interval),
                limit: file.output_limit,
                include_protocol: !file.output_no_protocol,
                http_path: file.output_http.map(PathBuf::from),
                socks_path: file.output_socks.map(PathBuf::from),
                kinancity_path: file.output_kinancity.map(PathBuf::from),
                proxychains_path: file.output_proxychains.map(PathBuf::from),
            },
            tester: TesterConfig {
                retries: file.tester_retries,
                backoff_factor: file.tester_backoff_factor,
                timeout: Duration::from_secs_f64(file.tester_timeout),
                max_concurrency: file.tester_max_concurrency,
                disable_anonymity: file.tester_disable_anonymity,
                notice_interval: Duration::from_secs(file.tester_notice_interval),
                pogo_version: file.tester_pogo_version,
                judge_url: file.tester_judge_url,
                scan_interval: Duration::from_secs(file.proxy_scan_interval),
                mobile_user_agent: file.tester_mobile_user_agent,
            },
            scrapper: ScrapperConfig {
                retries: file.scrapper_retries,
                backoff_factor: file.scrapper_backoff_factor,
                timeout: Duration::from_secs_f64(file.scrapper_timeout),
                proxy: file.scrapper_proxy,
                ignore_countries: file.ignore_countries,
                proxy_file: file.proxy_file,
            },
            local_ip: file.local_ip,
            default_protocol: Protocol::Http,
        };

        validate(&config)?;
        Ok(config)
    }
}

/// Rejects configurations with conflicting output destinations or
/// non-positive intervals, following `config.rs::load_config`'s
/// conflict-detection shape adapted to this domain.
fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for path in [
        &config.output.http_path,
        &config.output.socks_path,
        &config.output.kinancity_path,
        &config.output.proxychains_path,
    ]
    .into_iter()
    .flatten()
    {
        if !seen.insert(path.clone()) {
            return Err(ConfigError(format!(
                "output file {} is used by more than one output writer",
                path.display()
            )));
        }
    }

    if config.output.interval.is_zero() {
        return Err(ConfigError("output_interval must be positive".to_string()));
    }
    if config.proxy_refresh_interval.is_zero() {
        return Err(ConfigError(
            "proxy_refresh_interval must be positive".to_string(),
        ));
    }
    if config.tester.max_concurrency == 0 {
        return Err(ConfigError(
            "tester_max_concurrency must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            download_path: PathBuf::from("downloads"),
            log_path: PathBuf::from("logs"),
            debug: false,
            proxy_refresh_interval: Duration::from_secs(60),
            output: OutputConfig {
                interval: Duration::from_secs(60),
                limit: 10,
                include_protocol: true,
                http_path: Some(PathBuf::from("http.txt")),
                socks_path: Some(PathBuf::from("socks.txt")),
                kinancity_path: None,
                proxychains_path: None,
            },
            tester: TesterConfig {
                retries: 3,
                backoff_factor: 0.5,
                timeout: Duration::from_secs(5),
                max_concurrency: 10,
                disable_anonymity: false,
                notice_interval: Duration::from_secs(60),
                pogo_version: "0.175.1".to_string(),
                judge_url: "http://azenv.net/".to_string(),
                scan_interval: Duration::from_secs(3600),
                mobile_user_agent: "pokemongo/1 CFNetwork/811.4.18 Darwin/16.5.0".to_string(),
            },
            scrapper: ScrapperConfig {
                retries: 3,
                backoff_factor: 0.5,
                timeout: Duration::from_secs(5),
                proxy: None,
                ignore_countries: vec!["china".to_string()],
                proxy_file: None,
            },
            local_ip: None,
            default_protocol: Protocol::Http,
        }
    }

    #[test]
    fn distinct_output_paths_are_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn colliding_output_paths_are_rejected() {
        let mut config = base_config();
        config.output.socks_path = config.output.http_path.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_max_concurrency_is_rejected() {
        let mut config = base_config();
        config.tester.max_concurrency = 0;
        assert!(validate(&config).is_err());
    }
}
