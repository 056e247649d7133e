use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use pogo_proxies::config::{Cli, Config};
use pogo_proxies::country::NullCountryLookup;
use pogo_proxies::store::ProxyStore;
use pogo_proxies::{errors::AppError, orchestrator};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .expect("failed to initialize logger");

    std::process::exit(match run(cli).await {
        Ok(()) => exitcode::OK,
        Err(AppError::Config(e)) => {
            log::error!("{e}");
            exitcode::CONFIG
        }
        Err(AppError::Store(e)) => {
            log::error!("{e}");
            exitcode::SOFTWARE
        }
        Err(AppError::TestEngine(e)) => {
            log::error!("{e}");
            exitcode::SOFTWARE
        }
    });
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(&cli)?;

    std::fs::create_dir_all(&config.download_path)
        .map_err(|e| pogo_proxies::errors::ConfigError(format!("cannot create download_path: {e}")))?;
    std::fs::create_dir_all(&config.log_path)
        .map_err(|e| pogo_proxies::errors::ConfigError(format!("cannot create log_path: {e}")))?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.tester.max_concurrency.max(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| pogo_proxies::errors::StoreError::Transient(e))?;

    let store = Arc::new(ProxyStore::new(pool.clone()));
    store.check_schema_version().await?;
    pogo_proxies::store::run_migrations(&pool).await?;

    let country_lookup = Arc::new(NullCountryLookup);

    orchestrator::run(config, store, country_lookup).await?;
    Ok(())
}
