// =============================================================================
// keylevels — Main Entry Point
// =============================================================================
//
// Commands:
//   keylevels [serve]                    REST API (default)
//   keylevels analyze <bars.json> [SYM]  analyse a local file, print report
//   keylevels fetch <SYMBOL> [interval]  fetch from the provider, print report
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keylevels::api;
use keylevels::app_state::AppState;
use keylevels::provider::FmpClient;
use keylevels::report::format_analysis;
use keylevels::{Bar, PriceSeries, RuntimeConfig, SupportResistanceEngine};

const DEFAULT_CONFIG_PATH: &str = "keylevels_config.json";

const USAGE: &str = "usage:
  keylevels [serve]
  keylevels analyze <bars.json> [symbol]
  keylevels fetch <SYMBOL> [interval]";

/// Accepted shapes of a local bars file.
#[derive(Deserialize)]
#[serde(untagged)]
enum BarsFile {
    Wrapped {
        #[serde(default)]
        symbol: Option<String>,
        bars: Vec<Bar>,
    },
    Plain(Vec<Bar>),
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = PathBuf::from(
        std::env::var("KEYLEVELS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into()),
    );
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides(|name| std::env::var(name).ok());

    // ── 2. Dispatch ──────────────────────────────────────────────────────
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve(config, config_path).await,
        Some("analyze") => {
            let file = args.get(1).context(USAGE)?;
            analyze_file(&config, Path::new(file), args.get(2).map(String::as_str))
        }
        Some("fetch") => {
            let symbol = args.get(1).context(USAGE)?;
            fetch(&config, symbol, args.get(2).map(String::as_str)).await
        }
        Some("help" | "-h" | "--help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn serve(config: RuntimeConfig, config_path: PathBuf) -> Result<()> {
    let provider = build_provider(&config);
    let bind_addr = config.bind_addr.clone();

    info!(
        bind_addr = %bind_addr,
        provider = provider.is_some(),
        min_bars = config.analyzer.min_bars,
        "keylevels server starting"
    );

    let state = Arc::new(AppState::new(config, Some(config_path.clone()), provider));
    let app = api::rest::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            warn!("shutdown signal received, stopping gracefully");
        })
        .await
        .context("API server failed")?;

    if let Err(e) = state.runtime_config.read().save(&config_path) {
        warn!(error = %e, "failed to save runtime config on shutdown");
    }
    info!("keylevels shut down complete");
    Ok(())
}

fn analyze_file(config: &RuntimeConfig, path: &Path, symbol: Option<&str>) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bars from {}", path.display()))?;
    let parsed: BarsFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse bars from {}", path.display()))?;

    let (file_symbol, bars) = match parsed {
        BarsFile::Wrapped { symbol, bars } => (symbol, bars),
        BarsFile::Plain(bars) => (None, bars),
    };
    let series = PriceSeries::new(bars)
        .with_context(|| format!("invalid bar series in {}", path.display()))?;
    let symbol = symbol.map(str::to_string).or(file_symbol);

    let engine = SupportResistanceEngine::new(config.analyzer.clone());
    let analysis = engine.run_all_analysis(&series, symbol.as_deref());
    print!("{}", format_analysis(&analysis));
    Ok(())
}

async fn fetch(config: &RuntimeConfig, symbol: &str, interval: Option<&str>) -> Result<()> {
    let client = FmpClient::new(&config.provider).context("cannot build provider client")?;
    let series = client
        .historical_chart(symbol, interval)
        .await
        .with_context(|| format!("failed to fetch bars for {symbol}"))?;

    let engine = SupportResistanceEngine::new(config.analyzer.clone());
    let analysis = engine.run_all_analysis(&series, Some(&symbol.to_uppercase()));
    print!("{}", format_analysis(&analysis));
    Ok(())
}

fn build_provider(config: &RuntimeConfig) -> Option<Arc<FmpClient>> {
    if !config.provider.has_api_key() {
        warn!("FMP_KEY not set, /api/v1/levels is disabled");
        return None;
    }
    match FmpClient::new(&config.provider) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "failed to build provider client");
            None
        }
    }
}
