//! IP-to-country lookup (spec.md §6): a thin wrapper over a third-party
//! binary database, consumed by the test engine's post-pipeline country
//! filter (spec.md §4.5). Declared out of scope as a hand-built subsystem,
//! but the interface through which the core consumes it is part of this
//! crate.
use std::net::Ipv4Addr;

/// `country_of(ip) -> lowercase country name or "n/a"` (spec.md §6).
pub trait CountryLookup: Send + Sync {
    fn country_of(&self, ip: Ipv4Addr) -> String;
}

/// A `CountryLookup` that always reports `"n/a"`; used when no database
/// path is configured, so the country filter becomes a no-op rather than
/// a startup failure.
#[derive(Debug, Default)]
pub struct NullCountryLookup;

impl CountryLookup for NullCountryLookup {
    fn country_of(&self, _ip: Ipv4Addr) -> String {
        "n/a".to_string()
    }
}

/// A `CountryLookup` backed by a small in-memory table of CIDR-less exact
/// IP matches, loaded from the configuration file. Real deployments would
/// point this at a MaxMind GeoLite2 database; this stub carries the
/// interface and a deterministic fallback so the engine and its tests
/// don't depend on a binary database being present.
#[derive(Debug, Default)]
pub struct StaticCountryLookup {
    table: std::collections::HashMap<Ipv4Addr, String>,
}

impl StaticCountryLookup {
    pub fn new(table: std::collections::HashMap<Ipv4Addr, String>) -> Self {
        StaticCountryLookup { table }
    }
}

impl CountryLookup for StaticCountryLookup {
    fn country_of(&self, ip: Ipv4Addr) -> String {
        self.table
            .get(&ip)
            .cloned()
            .unwrap_or_else(|| "n/a".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_lookup_always_reports_na() {
        let lookup = NullCountryLookup;
        assert_eq!(lookup.country_of(Ipv4Addr::new(8, 8, 8, 8)), "n/a");
    }

    #[test]
    fn static_lookup_falls_back_to_na() {
        let mut table = std::collections::HashMap::new();
        table.insert(Ipv4Addr::new(1, 1, 1, 1), "australia".to_string());
        let lookup = StaticCountryLookup::new(table);
        assert_eq!(lookup.country_of(Ipv4Addr::new(1, 1, 1, 1)), "australia");
        assert_eq!(lookup.country_of(Ipv4Addr::new(2, 2, 2, 2)), "n/a");
    }
}
