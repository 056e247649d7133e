//! Orchestrator (spec.md §2, §5): wires the Scraper Framework (C3),
//! Proxy Store (C4) and Test Engine (C5) together behind one shutdown
//! signal, and drives the two periodic cycles that sit outside the test
//! engine's own manager loop — proxy refresh and output flush.
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::country::CountryLookup;
use crate::errors::TestEngineError;
use crate::http_client::FetchConfig;
use crate::output;
use crate::parser;
use crate::scrapers::{self, ScraperFramework};
use crate::store::{Protocol, ProxyStore};
use crate::tester::{self, EngineConfig};

/// Runs the refresh loop, the output loop and the test engine concurrently
/// until `shutdown` fires, then waits for all three to drain.
pub async fn run(
    config: Config,
    store: Arc<ProxyStore>,
    country_lookup: Arc<dyn CountryLookup>,
) -> Result<(), TestEngineError> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_signal(shutdown_tx));

    let scraper_framework = Arc::new(ScraperFramework::new(
        &config.scrapper,
        config.download_path.clone(),
        config.debug,
    ));

    let refresh = tokio::spawn(refresh_loop(
        Arc::clone(&scraper_framework),
        Arc::clone(&store),
        config.default_protocol,
        config.proxy_refresh_interval,
        shutdown_rx.clone(),
    ));

    let output = tokio::spawn(output_loop(
        Arc::clone(&store),
        config.output.clone(),
        shutdown_rx.clone(),
    ));

    let engine_config = EngineConfig {
        tester: config.tester.clone(),
        fetch_config: FetchConfig {
            max_retries: config.tester.retries,
            backoff_factor: config.tester.backoff_factor,
            connect_timeout: config.tester.timeout,
            read_timeout: config.tester.timeout,
        },
        ignore_countries: config.scrapper.ignore_countries.clone(),
        local_ip: config.local_ip,
        download_path: config.download_path.clone(),
        debug: config.debug,
    };

    let test_engine_result = tester::run(engine_config, Arc::clone(&store), country_lookup, shutdown_rx).await;

    let _ = refresh.await;
    let _ = output.await;
    test_engine_result
}

/// Resolves once SIGINT/SIGTERM is received, flipping the shared shutdown
/// flag so every loop drains on its next tick (spec.md §5, §6).
async fn wait_for_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                log::warn!("orchestrator: failed to install SIGTERM handler: {e}");
                return;
            }
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    log::info!("orchestrator: shutdown signal received");
    let _ = shutdown_tx.send(true);
}

/// Periodically re-runs C3 (scrape) then C4 (parse + insert-new), matching
/// the original tool's refresh scheduler (spec.md §2, §4.3, §4.4).
async fn refresh_loop(
    framework: Arc<ScraperFramework>,
    store: Arc<ProxyStore>,
    default_protocol: Protocol,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    refresh_once(&framework, &store, default_protocol).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; already refreshed above

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                refresh_once(&framework, &store, default_protocol).await;
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    log::info!("orchestrator: refresh loop shutting down");
                    break;
                }
            }
        }
    }
}

async fn refresh_once(framework: &ScraperFramework, store: &ProxyStore, default_protocol: Protocol) {
    let raw = scrapers::scrape_all(framework).await;
    let parsed = parser::parse_all(raw, default_protocol);
    log::info!("orchestrator: scraped {} unique candidate proxies", parsed.len());

    match store.insert_new(&parsed).await {
        Ok(inserted) => log::info!("orchestrator: inserted {inserted} new proxies"),
        Err(e) => log::error!("orchestrator: failed to insert scraped proxies: {e}"),
    }

    match store.clean_failed().await {
        Ok(removed) if removed > 0 => log::info!("orchestrator: reaped {removed} chronically failing proxies"),
        Ok(_) => {}
        Err(e) => log::error!("orchestrator: failed to reap failing proxies: {e}"),
    }
}

/// Periodically reads the currently valid proxies and writes every
/// configured output file (spec.md §2, §6).
async fn output_loop(store: Arc<ProxyStore>, config: crate::config::OutputConfig, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_outputs(&store, &config).await;
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    log::info!("orchestrator: output loop shutting down");
                    break;
                }
            }
        }
    }
}

async fn flush_outputs(store: &ProxyStore, config: &crate::config::OutputConfig) {
    if let Some(path) = &config.http_path {
        write_protocol_output(store, config, Protocol::Http, path).await;
    }
    if let Some(path) = &config.socks_path {
        write_protocol_output(store, config, Protocol::Socks5, path).await;
    }
    if let Some(path) = &config.kinancity_path {
        match store.get_valid(config.limit, false, 3600 * 24, None).await {
            Ok(proxies) => {
                if let Err(e) = output::export_file(path, &output::render_kinancity(&proxies)) {
                    log::error!("orchestrator: failed to write kinancity output {}: {e}", path.display());
                }
            }
            Err(e) => log::error!("orchestrator: failed to read valid proxies for kinancity output: {e}"),
        }
    }
    if let Some(path) = &config.proxychains_path {
        match store.get_valid(config.limit, false, 3600 * 24, None).await {
            Ok(proxies) => {
                if let Err(e) = output::export_file(path, &output::render_proxychains(&proxies)) {
                    log::error!("orchestrator: failed to write proxychains output {}: {e}", path.display());
                }
            }
            Err(e) => log::error!("orchestrator: failed to read valid proxies for proxychains output: {e}"),
        }
    }
}

async fn write_protocol_output(
    store: &ProxyStore,
    config: &crate::config::OutputConfig,
    protocol: Protocol,
    path: &std::path::Path,
) {
    match store.get_valid(config.limit, false, 3600 * 24, Some(protocol)).await {
        Ok(proxies) => {
            let rendered = output::render_plain(&proxies, config.include_protocol);
            if let Err(e) = output::export_file(path, &rendered) {
                log::error!("orchestrator: failed to write output {}: {e}", path.display());
            }
        }
        Err(e) => log::error!("orchestrator: failed to read valid proxies for output {}: {e}", path.display()),
    }
}
