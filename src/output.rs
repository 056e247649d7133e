//! Output formatters (spec.md §6): the plain, ProxyChains, and KinanCity
//! writers consumed by the orchestrator's periodic output flush.
//!
//! Ground truth for the KinanCity trailing-comma behavior and the plain
//! protocol-stripping flag is `utils.py::get_args`'s Output argument group
//! (`-Onp`/`--output-no-protocol`, `-Okc`, `-Opc`).
use std::io::Write;
use std::path::Path;

use crate::store::Proxy;

/// Renders `proxy_url_format() -> ...` one per line, optionally stripped
/// of its protocol prefix.
pub fn render_plain(proxies: &[Proxy], include_protocol: bool) -> String {
    let mut out = String::new();
    for proxy in proxies {
        if include_protocol {
            out.push_str(&proxy.url_format());
        } else {
            out.push_str(&format!("{}:{}", proxy.ip, proxy.port));
        }
        out.push('\n');
    }
    out
}

/// Renders `proto ip port [user pass]`, space-separated, one per line.
pub fn render_proxychains(proxies: &[Proxy]) -> String {
    let mut out = String::new();
    for proxy in proxies {
        out.push_str(proxy.protocol.scheme());
        out.push(' ');
        out.push_str(&proxy.ip);
        out.push(' ');
        out.push_str(&proxy.port.to_string());
        if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
            out.push(' ');
            out.push_str(user);
            out.push(' ');
            out.push_str(pass);
        }
        out.push('\n');
    }
    out
}

/// Renders `[url1,url2,...]` on a single line; the final separator is
/// truncated rather than left dangling before the closing bracket.
pub fn render_kinancity(proxies: &[Proxy]) -> String {
    let joined = proxies
        .iter()
        .map(Proxy::url_format)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]\n")
}

/// Writes `content`, truncating any existing file, mirroring
/// `utils.py::export_file`.
pub fn export_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Protocol, StageStatus};
    use chrono::Utc;

    fn sample_proxy(with_creds: bool) -> Proxy {
        Proxy {
            ip: "1.2.3.4".into(),
            port: 8080,
            protocol: Protocol::Http,
            username: with_creds.then(|| "user".to_string()),
            password: with_creds.then(|| "pass".to_string()),
            hash: 0,
            insert_date: Utc::now(),
            scan_date: None,
            latency: Some(100),
            fail_count: 0,
            anonymous: StageStatus::Ok,
            niantic: StageStatus::Ok,
            ptc_login: StageStatus::Ok,
            ptc_signup: StageStatus::Ok,
        }
    }

    #[test]
    fn plain_strips_protocol_when_requested() {
        let proxies = vec![sample_proxy(false)];
        assert_eq!(render_plain(&proxies, true), "http://1.2.3.4:8080\n");
        assert_eq!(render_plain(&proxies, false), "1.2.3.4:8080\n");
    }

    #[test]
    fn proxychains_includes_credentials_when_present() {
        let proxies = vec![sample_proxy(true)];
        assert_eq!(render_proxychains(&proxies), "http 1.2.3.4 8080 user pass\n");
    }

    #[test]
    fn kinancity_has_no_trailing_comma() {
        let proxies = vec![sample_proxy(false), sample_proxy(false)];
        let rendered = render_kinancity(&proxies);
        assert_eq!(
            rendered,
            "[http://1.2.3.4:8080,http://1.2.3.4:8080]\n"
        );
        assert!(!rendered.contains(",]"));
    }

    #[test]
    fn kinancity_empty_list_is_empty_brackets() {
        assert_eq!(render_kinancity(&[]), "[]\n");
    }
}
