//! Proxy Store (C4): the durable proxy record, its hash identity, and the
//! scheduling queries the test engine drives against it (spec.md §3, §4.4).
//!
//! Grounded on the sqlx `Proxy`/`FromRow` style from the proxy-tracking
//! reference crate in the example pack, adapted to the schema in
//! `models.py::Proxy` (peewee) — in particular the four independent stage
//! statuses and the `hash` join key.
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::errors::StoreError;
use crate::parser::ParsedProxy;

/// The schema version this build understands. Bump alongside a migration
/// in [`run_migrations`].
pub const SUPPORTED_SCHEMA_VERSION: i16 = 2;

/// Transport protocol a proxy speaks. Mirrors `models.py::ProxyProtocol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "int2")]
#[repr(i16)]
pub enum Protocol {
    Http = 0,
    Socks4 = 1,
    Socks5 = 2,
}

impl Protocol {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(Protocol::Http),
            1 => Some(Protocol::Socks4),
            2 => Some(Protocol::Socks5),
            _ => None,
        }
    }

    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        }
    }
}

/// Outcome of the latest run of one pipeline stage. Mirrors
/// `models.py::ProxyStatus`; stored as the integer per spec.md §9 for wire
/// compatibility with the existing schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "int2")]
#[repr(i16)]
pub enum StageStatus {
    Ok = 0,
    Unknown = 1,
    Error = 2,
    Timeout = 3,
    Banned = 4,
}

impl StageStatus {
    pub fn from_i16(v: i16) -> Self {
        match v {
            0 => StageStatus::Ok,
            2 => StageStatus::Error,
            3 => StageStatus::Timeout,
            4 => StageStatus::Banned,
            _ => StageStatus::Unknown,
        }
    }
}

/// A persisted proxy record (spec.md §3). Identity is the pair (ip, port);
/// `hash` is the compact 32-bit join key used by dedup and scheduling
/// queries, but (ip, port) remains authoritative on collision.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub ip: String,
    pub port: u16,
    pub protocol: Protocol,
    pub username: Option<String>,
    pub password: Option<String>,
    pub hash: u32,
    pub insert_date: DateTime<Utc>,
    pub scan_date: Option<DateTime<Utc>>,
    pub latency: Option<i32>,
    pub fail_count: i32,
    pub anonymous: StageStatus,
    pub niantic: StageStatus,
    pub ptc_login: StageStatus,
    pub ptc_signup: StageStatus,
}

impl Proxy {
    /// The canonical proxy URL, `proto://[user:pass@]ip:port`.
    pub fn url_format(&self) -> String {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{}://{}:{}@{}:{}", self.protocol.scheme(), u, p, self.ip, self.port),
            _ => format!("{}://{}:{}", self.protocol.scheme(), self.ip, self.port),
        }
    }

    /// All four stages passing is the "valid" predicate (spec.md §3).
    pub fn is_valid(&self) -> bool {
        self.niantic == StageStatus::Ok
            && self.ptc_login == StageStatus::Ok
            && self.ptc_signup == StageStatus::Ok
            && self.fail_count == 0
    }
}

/// Thin wrapper over a connection pool implementing the C4 operations.
pub struct ProxyStore {
    pool: PgPool,
}

impl ProxyStore {
    pub fn new(pool: PgPool) -> Self {
        ProxyStore { pool }
    }

    /// Reads `(key='schema_version', val=N)`, refusing to run against a
    /// version newer than this build supports.
    pub async fn check_schema_version(&self) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT val FROM version WHERE key = 'schema_version'")
            .fetch_optional(&self.pool)
            .await?;

        let found: i16 = match row {
            Some(row) => row.try_get("val")?,
            None => return Ok(()), // fresh database, migrations below will seed it
        };

        if found > SUPPORTED_SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found,
                supported: SUPPORTED_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Inserts only the rows of `batch` whose hash isn't already present,
    /// chunked to at most 250 rows per transaction (spec.md §4.4, §8
    /// scenario 6). Duplicate-key errors are caught per chunk and logged;
    /// they never abort the refresh.
    pub async fn insert_new(&self, batch: &[ParsedProxy]) -> Result<u64, StoreError> {
        let mut inserted = 0u64;
        for chunk in batch.chunks(250) {
            inserted += self.insert_new_chunk(chunk).await;
        }
        Ok(inserted)
    }

    async fn insert_new_chunk(&self, chunk: &[ParsedProxy]) -> u64 {
        let hashes: Vec<i64> = chunk.iter().map(|p| p.hash as i64).collect();

        let existing: Vec<i64> = match sqlx::query("SELECT hash FROM proxy WHERE hash = ANY($1)")
            .bind(&hashes)
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows.iter().map(|r| r.get::<i64, _>("hash")).collect(),
            Err(e) => {
                log::error!("insert_new: failed to read existing hashes: {e}");
                return 0;
            }
        };

        let to_insert: Vec<&ParsedProxy> = chunk
            .iter()
            .filter(|p| !existing.contains(&(p.hash as i64)))
            .collect();

        if to_insert.is_empty() {
            return 0;
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                log::error!("insert_new: failed to open transaction: {e}");
                return 0;
            }
        };

        let mut count = 0u64;
        for p in &to_insert {
            let result = sqlx::query(
                "INSERT INTO proxy (ip, port, protocol, username, password, hash, insert_date, fail_count, \
                 anonymous, niantic, ptc_login, ptc_signup) \
                 VALUES ($1, $2, $3, $4, $5, $6, now(), 0, 1, 1, 1, 1) \
                 ON CONFLICT (ip, port) DO NOTHING",
            )
            .bind(&p.ip)
            .bind(p.port as i32)
            .bind(p.protocol as i16)
            .bind(&p.username)
            .bind(&p.password)
            .bind(p.hash as i64)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(r) => count += r.rows_affected(),
                Err(e) => log::warn!("insert_new: skipping duplicate/invalid row {}:{}: {e}", p.ip, p.port),
            }
        }

        if let Err(e) = tx.commit().await {
            log::error!("insert_new: chunk transaction failed to commit: {e}");
            return 0;
        }

        count
    }

    /// Rows eligible for (re-)scanning: never-tested, or stale and not yet
    /// garbage, excluding anything already in flight. Ordered to prioritise
    /// never-tested then oldest-tested rows (spec.md §4.4).
    pub async fn get_scan(
        &self,
        limit: u32,
        exclude_hashes: &[u32],
        age_secs: i64,
        protocol: Option<Protocol>,
    ) -> Result<Vec<Proxy>, StoreError> {
        let exclude: Vec<i64> = exclude_hashes.iter().map(|&h| h as i64).collect();
        let rows = sqlx::query(
            "SELECT ip, port, protocol, username, password, hash, insert_date, scan_date, latency, \
             fail_count, anonymous, niantic, ptc_login, ptc_signup \
             FROM proxy \
             WHERE (scan_date IS NULL OR (scan_date < now() - make_interval(secs => $1) AND fail_count < 5)) \
               AND NOT (hash = ANY($2)) \
               AND ($3::int2 IS NULL OR protocol = $3) \
             ORDER BY scan_date ASC NULLS FIRST, insert_date ASC \
             LIMIT $4",
        )
        .bind(age_secs as f64)
        .bind(&exclude)
        .bind(protocol.map(|p| p as i16))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_proxy).collect())
    }

    /// Currently healthy rows, optionally requiring the anonymity stage to
    /// have passed, ordered by latency (spec.md §4.4, §8 scenario 5).
    pub async fn get_valid(
        &self,
        limit: u32,
        require_anonymous: bool,
        age_secs: i64,
        protocol: Option<Protocol>,
    ) -> Result<Vec<Proxy>, StoreError> {
        let rows = sqlx::query(
            "SELECT ip, port, protocol, username, password, hash, insert_date, scan_date, latency, \
             fail_count, anonymous, niantic, ptc_login, ptc_signup \
             FROM proxy \
             WHERE scan_date > now() - make_interval(secs => $1) \
               AND fail_count = 0 \
               AND niantic = 0 AND ptc_login = 0 AND ptc_signup = 0 \
               AND ($2 = false OR anonymous = 0) \
               AND ($3::int2 IS NULL OR protocol = $3) \
             ORDER BY latency ASC \
             LIMIT $4",
        )
        .bind(age_secs as f64)
        .bind(require_anonymous)
        .bind(protocol.map(|p| p as i16))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_proxy).collect())
    }

    /// Replace-on-conflict upsert of the test engine's batched writer
    /// (spec.md §4.5 manager step 2), single transaction for the whole
    /// batch since writer convergence requires all-or-nothing visibility.
    pub async fn upsert_many(&self, rows: &[Proxy]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "UPDATE proxy SET scan_date = $1, latency = $2, fail_count = $3, \
                 anonymous = $4, niantic = $5, ptc_login = $6, ptc_signup = $7 \
                 WHERE ip = $8 AND port = $9",
            )
            .bind(row.scan_date)
            .bind(row.latency)
            .bind(row.fail_count)
            .bind(row.anonymous as i16)
            .bind(row.niantic as i16)
            .bind(row.ptc_login as i16)
            .bind(row.ptc_signup as i16)
            .bind(&row.ip)
            .bind(row.port as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes rows with `fail_count >= 5` (spec.md §8 "failure reaping").
    pub async fn clean_failed(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM proxy WHERE fail_count >= 5")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Recomputes `hash` for every row; used by the v1->v2 migration when
    /// the hash formula widened to include credentials.
    pub async fn rehash_all(&self) -> Result<u64, StoreError> {
        let rows = sqlx::query("SELECT ip, port, username, password FROM proxy")
            .fetch_all(&self.pool)
            .await?;

        let mut updated = 0u64;
        for row in &rows {
            let ip: String = row.try_get("ip")?;
            let port: i32 = row.try_get("port")?;
            let username: Option<String> = row.try_get("username")?;
            let password: Option<String> = row.try_get("password")?;
            let hash = crate::parser::compute_hash(&ip, port as u16, username.as_deref(), password.as_deref());

            sqlx::query("UPDATE proxy SET hash = $1 WHERE ip = $2 AND port = $3")
                .bind(hash as i64)
                .bind(&ip)
                .bind(port)
                .execute(&self.pool)
                .await?;
            updated += 1;
        }
        Ok(updated)
    }
}

fn row_to_proxy(row: &sqlx::postgres::PgRow) -> Proxy {
    Proxy {
        ip: row.get("ip"),
        port: row.get::<i32, _>("port") as u16,
        protocol: Protocol::from_i16(row.get("protocol")).unwrap_or(Protocol::Http),
        username: row.get("username"),
        password: row.get("password"),
        hash: row.get::<i64, _>("hash") as u32,
        insert_date: row.get("insert_date"),
        scan_date: row.get("scan_date"),
        latency: row.get("latency"),
        fail_count: row.get("fail_count"),
        anonymous: StageStatus::from_i16(row.get("anonymous")),
        niantic: StageStatus::from_i16(row.get("niantic")),
        ptc_login: StageStatus::from_i16(row.get("ptc_login")),
        ptc_signup: StageStatus::from_i16(row.get("ptc_signup")),
    }
}

/// Runs forward schema migrations up to [`SUPPORTED_SCHEMA_VERSION`],
/// creating the tables on a fresh database (spec.md §4.4, §9).
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS proxy ( \
            ip TEXT NOT NULL, \
            port INTEGER NOT NULL, \
            protocol SMALLINT NOT NULL, \
            username TEXT, \
            password TEXT, \
            hash BIGINT NOT NULL, \
            insert_date TIMESTAMPTZ NOT NULL DEFAULT now(), \
            scan_date TIMESTAMPTZ, \
            latency INTEGER, \
            fail_count INTEGER NOT NULL DEFAULT 0, \
            anonymous SMALLINT NOT NULL DEFAULT 1, \
            niantic SMALLINT NOT NULL DEFAULT 1, \
            ptc_login SMALLINT NOT NULL DEFAULT 1, \
            ptc_signup SMALLINT NOT NULL DEFAULT 1, \
            PRIMARY KEY (ip, port) \
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS proxy_hash_idx ON proxy (hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS proxy_protocol_idx ON proxy (protocol)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS version (key TEXT PRIMARY KEY, val SMALLINT NOT NULL)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO version (key, val) VALUES ('schema_version', $1) \
         ON CONFLICT (key) DO NOTHING",
    )
    .bind(SUPPORTED_SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn is_valid_requires_all_three_core_stages_ok() {
        let base = Proxy {
            ip: "1.2.3.4".into(),
            port: 8080,
            protocol: Protocol::Http,
            username: None,
            password: None,
            hash: 0,
            insert_date: Utc::now(),
            scan_date: Some(Utc::now()),
            latency: Some(100),
            fail_count: 0,
            anonymous: StageStatus::Unknown,
            niantic: StageStatus::Ok,
            ptc_login: StageStatus::Ok,
            ptc_signup: StageStatus::Ok,
        };
        assert!(base.is_valid());

        let mut banned = base.clone();
        banned.niantic = StageStatus::Banned;
        assert!(!banned.is_valid());
    }

    #[test]
    fn url_format_includes_credentials_when_present() {
        let mut proxy = Proxy {
            ip: "1.2.3.4".into(),
            port: 1080,
            protocol: Protocol::Socks5,
            username: Some("user".into()),
            password: Some("pw".into()),
            hash: 0,
            insert_date: Utc::now(),
            scan_date: None,
            latency: None,
            fail_count: 0,
            anonymous: StageStatus::Unknown,
            niantic: StageStatus::Unknown,
            ptc_login: StageStatus::Unknown,
            ptc_signup: StageStatus::Unknown,
        };
        assert_eq!(proxy.url_format(), "socks5://user:pw@1.2.3.4:1080");

        proxy.username = None;
        proxy.password = None;
        assert_eq!(proxy.url_format(), "socks5://1.2.3.4:1080");
    }
}
