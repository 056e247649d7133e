//! Canonical proxy-string parsing and hash identity (spec.md §3, §4.3).
//!
//! Ported from `proxy_parser.py::ProxyParser`. Every scraper funnels its raw
//! strings through [`parse_proxy`] before they reach the store (C4).
use md5::{Digest, Md5};

use crate::store::Protocol;

/// The transient, parsed form of a raw proxy string: string ip/port, the
/// resolved protocol, optional credentials, and the precomputed hash that
/// the store uses as its dedup/join key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProxy {
    pub ip: String,
    pub port: u16,
    pub protocol: Protocol,
    pub username: Option<String>,
    pub password: Option<String>,
    pub hash: u32,
}

/// Computes the 32-bit join-key hash: MD5 of `ip + port + username +
/// password` (empty string for absent credentials), truncated to its top
/// eight hex digits. Mirrors `models.py::Proxy.db_format`'s hashing.
pub fn compute_hash(ip: &str, port: u16, username: Option<&str>, password: Option<&str>) -> u32 {
    let mut hasher = Md5::new();
    hasher.update(ip.as_bytes());
    hasher.update(port.to_string().as_bytes());
    hasher.update(username.unwrap_or("").as_bytes());
    hasher.update(password.unwrap_or("").as_bytes());
    let digest = hasher.finalize();

    let hex = format!("{digest:x}");
    u32::from_str_radix(&hex[..8], 16).expect("md5 hex digest is always valid hex")
}

fn protocol_of(scheme: &str) -> Option<Protocol> {
    match scheme {
        "http" => Some(Protocol::Http),
        "socks4" => Some(Protocol::Socks4),
        "socks5" => Some(Protocol::Socks5),
        _ => None,
    }
}

/// Validates a dotted-quad IPv4 string with each octet in 0..=255, usable
/// by scrapers that validate IPs ahead of the canonical parser (ground:
/// `utils.py::validate_ip`).
pub fn ip_is_valid(ip: &str) -> bool {
    valid_ipv4(ip)
}

fn valid_ipv4(ip: &str) -> bool {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    octets.iter().all(|o| match o.parse::<u16>() {
        Ok(n) => n <= 255,
        Err(_) => false,
    })
}

/// Parses one raw proxy line into a [`ParsedProxy`], applying `default_protocol`
/// when the line carries no `proto://` prefix. Mirrors
/// `proxy_parser.py::ProxyParser._ProxyParser__parse_proxylist`'s per-line
/// logic: strip, reject short lines, split scheme/credentials/host, validate
/// the IPv4 dotted-quad and port range.
pub fn parse_proxy(raw: &str, default_protocol: Protocol) -> Option<ParsedProxy> {
    let line = raw.trim();
    if line.len() < 9 {
        return None;
    }

    let (protocol, rest) = match line.split_once("://") {
        Some((scheme, rest)) => (protocol_of(scheme)?, rest),
        None => (default_protocol, line),
    };

    let (credentials, host_port) = match rest.rsplit_once('@') {
        Some((creds, hp)) => (Some(creds), hp),
        None => (None, rest),
    };

    let (username, password) = match credentials {
        Some(creds) => match creds.split_once(':') {
            Some((u, p)) => (Some(u.to_string()), Some(p.to_string())),
            None => (Some(creds.to_string()), None),
        },
        None => (None, None),
    };

    let (ip, port_str) = host_port.rsplit_once(':')?;
    if !valid_ipv4(ip) {
        return None;
    }

    let port: u16 = port_str.parse().ok()?;
    if port == 0 {
        return None;
    }

    let hash = compute_hash(ip, port, username.as_deref(), password.as_deref());

    Some(ParsedProxy {
        ip: ip.to_string(),
        port,
        protocol,
        username,
        password,
        hash,
    })
}

/// Parses every line of a scraper's raw output, deduping by hash within
/// this single load (spec.md §4.3 "Dedup by hash within a single load").
pub fn parse_all(raw_lines: impl IntoIterator<Item = String>, default_protocol: Protocol) -> Vec<ParsedProxy> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for line in raw_lines {
        if let Some(parsed) = parse_proxy(&line, default_protocol) {
            if seen.insert(parsed.hash) {
                out.push(parsed);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scenario_socks5_with_credentials() {
        let parsed = parse_proxy("socks5://user:pw@8.8.8.8:1080", Protocol::Http).unwrap();
        assert_eq!(parsed.protocol, Protocol::Socks5);
        assert_eq!(parsed.username.as_deref(), Some("user"));
        assert_eq!(parsed.password.as_deref(), Some("pw"));
        assert_eq!(parsed.ip, "8.8.8.8");
        assert_eq!(parsed.port, 1080);
        assert_eq!(
            parsed.hash,
            compute_hash("8.8.8.8", 1080, Some("user"), Some("pw"))
        );
    }

    #[test]
    fn bare_ip_port_uses_default_protocol() {
        let parsed = parse_proxy("1.2.3.4:8080", Protocol::Socks4).unwrap();
        assert_eq!(parsed.protocol, Protocol::Socks4);
        assert!(parsed.username.is_none());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(parse_proxy("ftp://1.2.3.4:21", Protocol::Http).is_none());
    }

    #[test]
    fn too_short_line_is_rejected() {
        assert!(parse_proxy("1.2.3.4", Protocol::Http).is_none());
    }

    #[test]
    fn port_zero_is_rejected_port_one_accepted() {
        assert!(parse_proxy("1.2.3.4:0", Protocol::Http).is_none());
        assert!(parse_proxy("1.2.3.4:1", Protocol::Http).is_some());
    }

    #[test]
    fn port_65535_accepted_65536_rejected() {
        assert!(parse_proxy("1.2.3.4:65535", Protocol::Http).is_some());
        assert!(parse_proxy("1.2.3.4:65536", Protocol::Http).is_none());
    }

    #[test]
    fn boundary_ipv4_octets() {
        assert!(parse_proxy("0.0.0.0:80", Protocol::Http).is_some());
        assert!(parse_proxy("255.255.255.255:80", Protocol::Http).is_some());
        assert!(parse_proxy("256.0.0.1:80", Protocol::Http).is_none());
    }

    #[test]
    fn zero_padded_octets_are_accepted() {
        assert!(parse_proxy("01.2.3.4:80", Protocol::Http).is_some());
        assert!(ip_is_valid("001.002.003.004"));
    }

    #[test]
    fn dedup_by_hash_within_a_load() {
        let lines = vec![
            "1.2.3.4:8080".to_string(),
            "1.2.3.4:8080".to_string(),
            "5.6.7.8:80".to_string(),
        ];
        let parsed = parse_all(lines, Protocol::Http);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn parser_is_idempotent_on_canonical_form() {
        let parsed = parse_proxy("http://1.2.3.4:8080", Protocol::Http).unwrap();
        let canonical = format!("{}://{}:{}", "http", parsed.ip, parsed.port);
        let reparsed = parse_proxy(&canonical, Protocol::Http).unwrap();
        assert_eq!(parsed.hash, reparsed.hash);
    }
}
