// =============================================================================
// quotescribe — Main Entry Point
// =============================================================================
//
// Level-one quote snapshot logger: one feed-listener task publishes decoded
// batches into a single-slot holder; the sampling loop reconciles them into
// the quote cache at a fixed cadence and appends a drift-corrected row
// whenever anything actually changed.
// =============================================================================

mod clock;
mod config;
mod error;
mod feed;
mod quote;
mod reconcile;
mod sampler;
mod snapshot;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::{DriftClock, HttpTimeSource};
use crate::config::RuntimeConfig;
use crate::feed::LatestBatch;
use crate::quote::QuoteCache;
use crate::snapshot::CsvSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = "quotescribe.json";
    let mut config = RuntimeConfig::load(config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // First run: write the defaults out as an editable template. Done before
    // any env override so a one-off QUOTESCRIBE_SYMBOLS run never leaks into
    // the file and changes later runs.
    if !std::path::Path::new(config_path).exists() {
        if let Err(e) = config.save(config_path) {
            warn!(error = %e, "Failed to write default config template");
        }
    }

    // Override the roster from env if available.
    if let Ok(syms) = std::env::var("QUOTESCRIBE_SYMBOLS") {
        config.symbol_group = config::SymbolGroup::Custom;
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(url) = std::env::var("QUOTESCRIBE_FEED_URL") {
        config.feed_url = url;
    }

    let symbols = config.resolved_symbols();
    if symbols.is_empty() {
        anyhow::bail!("no symbols configured; set symbol_group or QUOTESCRIBE_SYMBOLS");
    }

    info!(
        symbol_group = %config.symbol_group,
        symbols = ?symbols,
        interval_ms = config.sample_interval_ms,
        output_key = %config.output_key,
        "Configured observation run"
    );

    // ── 2. Drift clock (the only fatal startup dependency) ───────────────
    let time_source = HttpTimeSource::new(&config.time_url);
    let drift_clock = match DriftClock::initialize(&time_source).await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Cannot establish a time reference; aborting startup");
            return Err(e.into());
        }
    };

    // ── 3. Feed listener task ────────────────────────────────────────────
    let slot = LatestBatch::new();

    let feed_slot = slot.clone();
    let feed_url = config.feed_url.clone();
    let feed_symbols = symbols.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = feed::run_feed_stream(&feed_url, &feed_symbols, &feed_slot).await {
                error!(error = %e, "Quote stream error; reconnecting in 5s");
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        }
    });

    // ── 4. Sampling loop ─────────────────────────────────────────────────
    let cache = QuoteCache::new(&symbols);
    let sink = CsvSink::new(&config.output_key, &symbols);
    info!(path = %sink.path().display(), "snapshot destination");

    let interval_ms = config.sample_interval_ms;
    tokio::spawn(async move {
        sampler::run_sampling_loop(cache, slot, drift_clock, sink, interval_ms).await;
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received; stopping");

    info!("quotescribe shut down complete.");
    Ok(())
}
