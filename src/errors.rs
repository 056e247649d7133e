//! Error taxonomy (spec.md §7).
//!
//! Only `FetchError` kinds and `StoreError` influence persisted proxy state;
//! the rest are logged at the call site and handled locally, matching the
//! original Python tool's "never let one bad proxy/scrape/row abort the run"
//! behavior.
use std::fmt;

/// Errors raised while performing a single HTTP request (C1).
#[derive(Debug)]
pub enum FetchError {
    Timeout,
    ConnectFailure(String),
    HttpError(u16),
    Other(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::ConnectFailure(e) => write!(f, "connect failure: {e}"),
            FetchError::HttpError(status) => write!(f, "unexpected HTTP status {status}"),
            FetchError::Other(e) => write!(f, "transport error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::ConnectFailure(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpError(status.as_u16())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

/// Errors raised by the deobfuscator (C2): malformed packer/XOR input.
#[derive(Debug)]
pub struct UnpackingError(pub String);

impl fmt::Display for UnpackingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unpacking error: {}", self.0)
    }
}

impl std::error::Error for UnpackingError {}

/// A site's HTML layout no longer matches the selectors a scraper expects.
#[derive(Debug)]
pub struct ScrapeParseError {
    pub scraper: String,
    pub reason: String,
}

impl fmt::Display for ScrapeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "scraper {} failed to parse its target page: {}",
            self.scraper, self.reason
        )
    }
}

impl std::error::Error for ScrapeParseError {}

/// Errors raised by the persistence layer (C4). `Transient` operations are
/// caught and logged around each batch without aborting the refresh cycle;
/// `SchemaTooNew` is fatal at startup.
#[derive(Debug)]
pub enum StoreError {
    Transient(sqlx::Error),
    SchemaTooNew { found: i16, supported: i16 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Transient(e) => write!(f, "database operation failed: {e}"),
            StoreError::SchemaTooNew { found, supported } => write!(
                f,
                "database schema version {found} is newer than this build supports ({supported})"
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Transient(err)
    }
}

/// The test engine's startup self-test failed, or it was asked to run
/// with a configuration it can't satisfy (spec.md §4.5, §6 exit codes).
#[derive(Debug)]
pub struct TestEngineError(pub String);

impl fmt::Display for TestEngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "test engine startup self-test failed: {}", self.0)
    }
}

impl std::error::Error for TestEngineError {}

/// Fatal configuration problems, reported at startup only.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError(format!("cannot read configuration: {err}"))
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError(format!("cannot parse configuration: {err}"))
    }
}

/// Top-level error composing every subsystem's error type, so `main` has a
/// single `Result` to match on for exit codes (spec.md §6).
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Store(StoreError),
    TestEngine(TestEngineError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "{e}"),
            AppError::Store(e) => write!(f, "{e}"),
            AppError::TestEngine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<TestEngineError> for AppError {
    fn from(err: TestEngineError) -> Self {
        AppError::TestEngine(err)
    }
}
