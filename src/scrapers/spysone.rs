//! Obfuscated-port extractor for spys.one (ground: `spysone.py`). The
//! port-decoding script is itself p.a.c.k.e.r.-packed before it yields the
//! crazy-XOR dictionary, so this site runs both C2 routines in sequence.
//! One implementation parameterised over the three site variants
//! (HTTP/HTTPS/SOCKS), matching `SpysHTTP`/`SpysHTTPS`/`SpysSOCKS`.
use regex::Regex;
use scraper::{Html, Selector};

use super::{BoxFuture, ScraperFramework};
use crate::deobfuscate::{self, UnpackResult, XorDict};
use crate::scrapers::Scraper;

enum Variant {
    Http,
    Https,
    Socks,
}

pub struct SpysOne {
    variant: Variant,
}

impl SpysOne {
    pub fn http() -> Self {
        SpysOne { variant: Variant::Http }
    }
    pub fn https() -> Self {
        SpysOne { variant: Variant::Https }
    }
    pub fn socks() -> Self {
        SpysOne { variant: Variant::Socks }
    }

    fn name(&self) -> &'static str {
        match self.variant {
            Variant::Http => "spys-one-http",
            Variant::Https => "spys-one-https",
            Variant::Socks => "spys-one-socks",
        }
    }

    fn urls(&self) -> [&'static str; 3] {
        match self.variant {
            Variant::Http => [
                "http://spys.one/en/anonymous-proxy-list/",
                "http://spys.one/en/anonymous-proxy-list/1",
                "http://spys.one/en/anonymous-proxy-list/2",
            ],
            Variant::Https => [
                "http://spys.one/en/https-ssl-proxy/",
                "http://spys.one/en/https-ssl-proxy/1",
                "http://spys.one/en/https-ssl-proxy/2",
            ],
            Variant::Socks => [
                "http://spys.one/en/socks-proxy-list/",
                "http://spys.one/en/socks-proxy-list/1",
                "http://spys.one/en/socks-proxy-list/2",
            ],
        }
    }
}

impl Scraper for SpysOne {
    fn name(&self) -> &'static str {
        SpysOne::name(self)
    }

    fn scrape<'a>(&'a self, framework: &'a ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut proxylist = Vec::new();
            for url in self.urls() {
                let Some(html) = framework.get(url, url).await else {
                    log::error!("{}: failed to download webpage: {url}", self.name());
                    continue;
                };
                proxylist.extend(parse_webpage(&html, self.name(), framework));
                framework.paginate_delay().await;
            }
            proxylist
        })
    }
}

fn find_xor_dict(document: &Html, name: &str) -> Option<XorDict> {
    let script_sel = Selector::parse("script").unwrap();
    for script in document.select(&script_sel) {
        let code: String = script.text().collect();
        for line in code.lines() {
            let mut line = line.trim().to_string();
            if line.contains('^') && line.contains(';') && line.contains('=') {
                log::info!("{name}: found crazy XOR decoding script");
                if let Ok(UnpackResult::Unpacked(unpacked)) = deobfuscate::deobfuscate(&line) {
                    line = unpacked;
                }
                return Some(XorDict::parse(&line));
            }
        }
    }
    None
}

/// Rows carry class `spy1x`/`spy1xx`; column 0 holds two `<font>`s, the
/// second containing the IP text plus a `<script>` with the port
/// obfuscation expression; column 2 is anonymity ("HIA" = high anonymity);
/// column 3 is `Country Name (city)`.
fn parse_webpage(html: &str, name: &str, framework: &ScraperFramework) -> Vec<String> {
    let document = Html::parse_document(html);

    let Some(encoding) = find_xor_dict(&document, name) else {
        log::error!("{name}: unable to find crazy XOR decoding script");
        framework.dump_debug_html(name, html);
        return Vec::new();
    };

    let row_sel = Selector::parse("tr.spy1x, tr.spy1xx").unwrap();
    let cell_sel = Selector::parse("td").unwrap();
    let font_sel = Selector::parse("font").unwrap();
    let script_sel = Selector::parse("script").unwrap();
    let port_part_re = Regex::new(r"\(([\w^]+)\)").unwrap();
    let country_re = Regex::new(r"^([\w\s]+) \(.*").unwrap();

    let mut proxylist = Vec::new();
    for row in document.select(&row_sel) {
        let columns: Vec<_> = row.select(&cell_sel).collect();
        if columns.len() != 10 {
            continue;
        }

        let fonts: Vec<_> = columns[0].select(&font_sel).collect();
        if fonts.len() != 2 {
            log::warn!("{name}: unknown format of proxy table cell");
            continue;
        }

        let Some(script) = fonts[1].select(&script_sel).next() else {
            log::warn!("{name}: unable to find port obfuscation script");
            continue;
        };
        let script_text: String = script.text().collect();

        let font_text: String = fonts[1].text().collect();
        let ip = font_text.replace(&script_text, "").trim().to_string();
        if !crate::parser::ip_is_valid(&ip) {
            log::warn!("{name}: invalid IP found: {ip}");
            continue;
        }

        let parts: Vec<&str> = port_part_re
            .captures_iter(&script_text)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        let mut port = String::new();
        let mut decode_failed = false;
        for part in parts {
            match encoding.eval(part) {
                Some(digit) => port.push_str(&digit),
                None => {
                    decode_failed = true;
                    break;
                }
            }
        }
        if decode_failed || port.is_empty() {
            continue;
        }

        let anonymous = columns[2].text().collect::<String>();
        if anonymous.trim() != "HIA" {
            continue;
        }

        let raw_country = columns[3].text().collect::<String>().trim().to_lowercase();
        let country = match country_re.captures(&raw_country) {
            Some(caps) => caps[1].to_string(),
            None => raw_country,
        };
        if !framework.accepted_country(&country) {
            continue;
        }

        proxylist.push(format!("{ip}:{port}"));
    }

    if proxylist.is_empty() {
        framework.dump_debug_html(name, html);
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
    fn decodes_port_and_filters_anonymity() {
        let html = r#"
            <script>a=1;b=2;c=3;d=4;</script>
            <tr class="spy1x">
                <td><font>1</font><font>1.2.3.4<script>document.write((a)+(b))</script></font></td>
                <td></td>
                <td>HIA</td>
                <td>canada (Toronto)</td>
                <td></td><td></td><td></td><td></td><td></td><td></td>
            </tr>
        "#;
        let proxies = parse_webpage(html, "spys-one-http", &test_framework());
        assert_eq!(proxies, vec!["1.2.3.4:12".to_string()]);
    }
}
