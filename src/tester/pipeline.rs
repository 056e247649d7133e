//! The four-stage per-proxy test pipeline (spec.md §4.5's stage table).
//! Each stage shares one fixed header set; stages 2 and 3 additionally
//! pin a `Host` header independent of the request URL, matching the
//! original tool's SSO-routed Niantic/PTC-login checks.
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use super::azenv;
use super::EngineConfig;
use crate::config::TesterConfig;
use crate::country::CountryLookup;
use crate::errors::FetchError;
use crate::http_client::{self, FetchConfig};
use crate::store::{Proxy, StageStatus};

pub const MOBILE_USER_AGENT: &str = "pokemongo/1 CFNetwork/811.4.18 Darwin/16.5.0";
const UNITY_VERSION: &str = "2017.1.2f1";
const SSO_HOST: &str = "sso.pokemon.com";
const NIANTIC_URL: &str = "https://pgorelease.nianticlabs.com/plfe/version";
const PTC_LOGIN_URL: &str = "https://sso.pokemon.com/sso/login?locale=en_US&service=https%3A%2F%2Fsso.pokemon.com%2Fsso%2Foauth2.0%2FcallbackAuthorize";
const PTC_SIGNUP_URL: &str = "https://club.pokemon.com/us/pokemon-trainer-club";
const PTC_SIGNUP_TITLE: &str = "Pokémon Trainer Club";

const BANNED_STATUSES: [u16; 2] = [403, 409];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Anonymity,
    Niantic,
    PtcLogin,
    PtcSignup,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Anonymity => "anonymity",
            Stage::Niantic => "niantic",
            Stage::PtcLogin => "ptc_login",
            Stage::PtcSignup => "ptc_signup",
        }
    }

    fn host(self) -> Option<&'static str> {
        match self {
            Stage::Niantic | Stage::PtcLogin => Some(SSO_HOST),
            Stage::Anonymity | Stage::PtcSignup => None,
        }
    }
}

pub struct StageOutcome {
    pub status: StageStatus,
    pub body: String,
    pub elapsed: Duration,
}

/// The fixed header set shared by every stage (spec.md §4.5): closed
/// connections, a wildcard Accept, the configured mobile User-Agent, and
/// a pinned Unity version string.
pub fn fixed_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::CONNECTION, HeaderValue::from_static("close"));
    headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(reqwest::header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-us"));
    headers.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static("br, gzip, deflate"),
    );
    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(reqwest::header::USER_AGENT, ua);
    }
    headers.insert(
        HeaderName::from_static("x-unity-version"),
        HeaderValue::from_static(UNITY_VERSION),
    );
    headers
}

/// Runs one stage's request against `session`, deriving its status per
/// spec.md §4.5's rules (banned statuses, transport failures, empty body,
/// then the stage's own predicate).
pub async fn run_stage(
    session: &Client,
    stage: Stage,
    tester: &TesterConfig,
    fetch_config: &FetchConfig,
    local_ip: Option<IpAddr>,
) -> StageOutcome {
    let url = match stage {
        Stage::Anonymity => tester.judge_url.as_str(),
        Stage::Niantic => NIANTIC_URL,
        Stage::PtcLogin => PTC_LOGIN_URL,
        Stage::PtcSignup => PTC_SIGNUP_URL,
    };

    let mut headers = fixed_headers(&tester.mobile_user_agent);
    if let Some(host) = stage.host() {
        if let Ok(value) = HeaderValue::from_str(host) {
            headers.insert(reqwest::header::HOST, value);
        }
    }

    let start = Instant::now();
    let result = http_client::get(session, url, headers, fetch_config).await;

    match result {
        Err(FetchError::Timeout) => StageOutcome {
            status: StageStatus::Timeout,
            body: String::new(),
            elapsed: start.elapsed(),
        },
        Err(e) => {
            log::warn!("{}: transport error: {e}", stage.name());
            StageOutcome {
                status: StageStatus::Error,
                body: String::new(),
                elapsed: start.elapsed(),
            }
        }
        Ok(fetch_result) => {
            if BANNED_STATUSES.contains(&fetch_result.status.as_u16()) {
                return StageOutcome {
                    status: StageStatus::Banned,
                    body: fetch_result.body,
                    elapsed: fetch_result.elapsed,
                };
            }
            if fetch_result.body.is_empty() {
                return StageOutcome {
                    status: StageStatus::Error,
                    body: String::new(),
                    elapsed: fetch_result.elapsed,
                };
            }

            let passed = evaluate_predicate(stage, &fetch_result.body, tester, local_ip);
            StageOutcome {
                status: if passed { StageStatus::Ok } else { StageStatus::Error },
                body: fetch_result.body,
                elapsed: fetch_result.elapsed,
            }
        }
    }
}

fn evaluate_predicate(stage: Stage, body: &str, tester: &TesterConfig, local_ip: Option<IpAddr>) -> bool {
    match stage {
        Stage::Anonymity => {
            let vars = azenv::parse(body);
            let Some(remote_addr) = vars.remote_addr else {
                return false;
            };
            let Some(local_ip) = local_ip else {
                log::warn!("anonymity: no local IP known, cannot evaluate REMOTE_ADDR predicate");
                return false;
            };
            let remote_matches_local = remote_addr
                .parse::<Ipv4Addr>()
                .map(|ip| IpAddr::V4(ip) == local_ip)
                .unwrap_or(false);

            !remote_matches_local
                && vars.x_unity_version.as_deref() == Some(UNITY_VERSION)
                && vars.user_agent.as_deref() == Some(tester.mobile_user_agent.as_str())
        }
        Stage::Niantic => body.contains(&tester.pogo_version),
        Stage::PtcLogin => body.contains("execution"),
        Stage::PtcSignup => body.contains(PTC_SIGNUP_TITLE),
    }
}

/// Runs the full pipeline for one proxy, mutating its stage fields,
/// `fail_count`, `scan_date` and `latency` in place (spec.md §4.5 worker
/// loop, steps 2-5).
pub async fn test_one(
    proxy: &mut Proxy,
    config: &EngineConfig,
    country_lookup: &Arc<dyn CountryLookup>,
    local_ip: Option<IpAddr>,
) {
    proxy.anonymous = StageStatus::Unknown;
    proxy.niantic = StageStatus::Unknown;
    proxy.ptc_login = StageStatus::Unknown;
    proxy.ptc_signup = StageStatus::Unknown;

    let proxy_url = proxy.url_format();
    let session = match http_client::build_session(&config.fetch_config, Some(proxy_url.as_str())) {
        Ok(session) => session,
        Err(e) => {
            log::warn!("test engine: failed to build session for {proxy_url}: {e}");
            proxy.niantic = StageStatus::Error;
            proxy.fail_count += 1;
            proxy.scan_date = Some(chrono::Utc::now());
            return;
        }
    };

    let mut stage_elapsed = Vec::new();

    if !config.tester.disable_anonymity {
        let outcome = run_stage(&session, Stage::Anonymity, &config.tester, &config.fetch_config, local_ip).await;
        proxy.anonymous = outcome.status;
        if outcome.status != StageStatus::Ok {
            proxy.fail_count += 1;
            proxy.scan_date = Some(chrono::Utc::now());
            return;
        }
        stage_elapsed.push(outcome.elapsed);
    }

    let niantic = run_stage(&session, Stage::Niantic, &config.tester, &config.fetch_config, local_ip).await;
    proxy.niantic = niantic.status;
    if niantic.status != StageStatus::Ok {
        proxy.fail_count += 1;
        proxy.scan_date = Some(chrono::Utc::now());
        return;
    }
    stage_elapsed.push(niantic.elapsed);

    let ptc_login = run_stage(&session, Stage::PtcLogin, &config.tester, &config.fetch_config, local_ip).await;
    proxy.ptc_login = ptc_login.status;
    if ptc_login.status != StageStatus::Ok {
        proxy.fail_count += 1;
        proxy.scan_date = Some(chrono::Utc::now());
        return;
    }
    stage_elapsed.push(ptc_login.elapsed);

    let ptc_signup = run_stage(&session, Stage::PtcSignup, &config.tester, &config.fetch_config, local_ip).await;
    proxy.ptc_signup = ptc_signup.status;
    if ptc_signup.status != StageStatus::Ok {
        proxy.fail_count += 1;
        proxy.scan_date = Some(chrono::Utc::now());
        return;
    }
    stage_elapsed.push(ptc_signup.elapsed);

    proxy.scan_date = Some(chrono::Utc::now());
    proxy.latency = Some(mean_latency_ms(&stage_elapsed));

    let country = proxy
        .ip
        .parse::<Ipv4Addr>()
        .map(|ip| country_lookup.country_of(ip))
        .unwrap_or_else(|_| "n/a".to_string());

    if config.ignore_countries.iter().any(|c| c == &country) {
        log::info!("test engine: {} in ignored country {country}, invalidating", proxy.ip);
        proxy.fail_count += 1;
    } else {
        proxy.fail_count = 0;
    }
}

fn mean_latency_ms(elapsed: &[Duration]) -> i32 {
    if elapsed.is_empty() {
        return 0;
    }
    let total: f64 = elapsed.iter().map(Duration::as_secs_f64).sum();
    let mean_secs = total / elapsed.len() as f64;
    (mean_secs * 1000.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_latency_converts_to_rounded_milliseconds() {
        let elapsed = vec![Duration::from_millis(100), Duration::from_millis(200)];
        assert_eq!(mean_latency_ms(&elapsed), 150);
    }

    #[test]
    fn empty_elapsed_yields_zero() {
        assert_eq!(mean_latency_ms(&[]), 0);
    }

    #[test]
    fn anonymity_predicate_rejects_mismatched_remote_addr() {
        let tester = test_tester_config();
        let local_ip = IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9));
        let body = format!(
            "REMOTE_ADDR = 9.9.9.9\nX_UNITY_VERSION = {UNITY_VERSION}\nUSER_AGENT = {}",
            tester.mobile_user_agent
        );
        assert!(!evaluate_predicate(Stage::Anonymity, &body, &tester, Some(local_ip)));
    }

    #[test]
    fn anonymity_predicate_passes_when_remote_differs_and_headers_match() {
        let tester = test_tester_config();
        let local_ip = IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9));
        let body = format!(
            "REMOTE_ADDR = 1.2.3.4\nX_UNITY_VERSION = {UNITY_VERSION}\nUSER_AGENT = {}",
            tester.mobile_user_agent
        );
        assert!(evaluate_predicate(Stage::Anonymity, &body, &tester, Some(local_ip)));
    }

    #[test]
    fn niantic_predicate_checks_configured_version_string() {
        let tester = test_tester_config();
        assert!(evaluate_predicate(Stage::Niantic, "current version: 0.175.1", &tester, None));
        assert!(!evaluate_predicate(Stage::Niantic, "current version: 9.9.9", &tester, None));
    }

    #[test]
    fn ptc_login_predicate_checks_for_execution_token() {
        let tester = test_tester_config();
        assert!(evaluate_predicate(Stage::PtcLogin, "<input name=\"execution\" value=\"abc\">", &tester, None));
        assert!(!evaluate_predicate(Stage::PtcLogin, "<html></html>", &tester, None));
    }

    #[test]
    fn ptc_signup_predicate_checks_exact_title() {
        let tester = test_tester_config();
        assert!(evaluate_predicate(Stage::PtcSignup, "<title>Pokémon Trainer Club</title>", &tester, None));
        assert!(!evaluate_predicate(Stage::PtcSignup, "<title>Something Else</title>", &tester, None));
    }

    fn test_tester_config() -> TesterConfig {
        TesterConfig {
            retries: 3,
            backoff_factor: 0.5,
            timeout: Duration::from_secs(5),
            max_concurrency: 10,
            disable_anonymity: false,
            notice_interval: Duration::from_secs(120),
            pogo_version: "0.175.1".to_string(),
            judge_url: "http://pascal.hoez.free.fr/azenv.php".to_string(),
            scan_interval: Duration::from_secs(3600),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
        }
    }
}
