// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`:
//
//   GET  /health            liveness + state version
//   GET  /status            uptime, stored analyses, provider rate limit
//   POST /analyze           analyse bars supplied in the body
//   GET  /levels/:symbol    fetch bars from the provider and analyse them
//   GET  /analyses          most recent analyses, oldest first
//   GET  /config            current analyzer config
//   POST /config            replace the analyzer config
//
// The engine is CPU-bound and runs on the blocking pool.
//
// CORS is configured permissively for development.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::engine::Analysis;
use crate::market_data::{Bar, PriceSeries};
use crate::provider::ProviderError;
use crate::runtime_config::AnalyzerConfig;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/analyze", axum::routing::post(analyze))
        .route("/api/v1/levels/:symbol", get(levels_for_symbol))
        .route("/api/v1/analyses", get(analyses))
        .route("/api/v1/config", get(get_config).post(set_config))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health / status
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status())
}

// =============================================================================
// Analysis
// =============================================================================

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    symbol: Option<String>,
    bars: Vec<Bar>,
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Analysis>, ApiError> {
    let series = PriceSeries::new(req.bars).map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e))?;
    let analysis = run_and_store(&state, series, req.symbol).await?;
    Ok(Json(analysis))
}

async fn levels_for_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Analysis>, ApiError> {
    let Some(provider) = state.provider.clone() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            ProviderError::MissingApiKey,
        ));
    };

    let interval = params.get("interval").map(String::as_str);
    let series = provider
        .historical_chart(&symbol, interval)
        .await
        .map_err(|e| {
            warn!(symbol = %symbol, error = %e, "provider fetch failed");
            let code = match e {
                ProviderError::InvalidSymbol(_) | ProviderError::UnsupportedInterval(_) => StatusCode::BAD_REQUEST,
                ProviderError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            api_error(code, e)
        })?;

    let analysis = run_and_store(&state, series, Some(symbol.to_uppercase())).await?;
    Ok(Json(analysis))
}

/// Run the engine on the blocking pool and remember complete results.
async fn run_and_store(
    state: &Arc<AppState>,
    series: PriceSeries,
    symbol: Option<String>,
) -> Result<Analysis, ApiError> {
    let engine = state.engine();
    let analysis = tokio::task::spawn_blocking(move || engine.run_all_analysis(&series, symbol.as_deref()))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("analysis task failed: {e}")))?;

    if let Analysis::Complete(result) = &analysis {
        state.push_analysis(result.clone());
    }
    Ok(analysis)
}

async fn analyses(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.recent_analyses())
}

// =============================================================================
// Configuration
// =============================================================================

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runtime_config.read().analyzer.clone())
}

async fn set_config(
    State(state): State<Arc<AppState>>,
    Json(analyzer): Json<AnalyzerConfig>,
) -> impl IntoResponse {
    let config_clone = {
        let mut config = state.runtime_config.write();
        config.analyzer = analyzer;
        config.clone()
    };

    // Best-effort persistence; the in-memory config is authoritative.
    if let Some(path) = &state.config_path {
        if let Err(e) = config_clone.save(path) {
            warn!(error = %e, "failed to persist analyzer config");
        }
    }

    state.increment_version();
    info!(min_bars = config_clone.analyzer.min_bars, "analyzer config updated via API");
    Json(config_clone.analyzer)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(RuntimeConfig::default(), None, None));
        (state.clone(), router(state))
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn bars_json(closes: &[f64]) -> serde_json::Value {
        let bars: Vec<serde_json::Value> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                serde_json::json!({
                    "timestamp": i as i64 * 60_000,
                    "open": c, "high": c + 0.1, "low": c - 0.1, "close": c, "volume": 1000.0
                })
            })
            .collect();
        serde_json::Value::Array(bars)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_, router) = app();
        let (status, json) = send(router, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["state_version"].as_u64().is_some());
    }

    #[tokio::test]
    async fn analyze_stores_complete_results() {
        let (state, router) = app();
        let closes: Vec<f64> = (0..40).map(|i| 10.0 + ((i % 8) as f64 - 4.0).abs() * 0.25).collect();
        let body = serde_json::json!({ "symbol": "DEMO", "bars": bars_json(&closes) });

        let (status, json) = send(router.clone(), post_json("/api/v1/analyze", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "complete");
        assert_eq!(json["symbol"], "DEMO");
        assert_eq!(json["detectors"].as_array().unwrap().len(), 7);

        let (_, recent) = send(router, get("/api/v1/analyses")).await;
        assert_eq!(recent.as_array().unwrap().len(), 1);
        assert_eq!(state.recent_analyses().len(), 1);
    }

    #[tokio::test]
    async fn analyze_short_series_is_insufficient() {
        let (state, router) = app();
        let body = serde_json::json!({ "bars": bars_json(&[1.0, 1.1]) });
        let (status, json) = send(router, post_json("/api/v1/analyze", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "insufficient_data");
        assert!(state.recent_analyses().is_empty());
    }

    #[tokio::test]
    async fn analyze_rejects_invalid_bars() {
        let (_, router) = app();
        let body = serde_json::json!({
            "bars": [{ "timestamp": 0, "open": 1.0, "high": 0.5, "low": 0.9, "close": 1.0, "volume": 1.0 }]
        });
        let (status, json) = send(router, post_json("/api/v1/analyze", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().unwrap().contains("bar 0"));
    }

    #[tokio::test]
    async fn levels_without_provider_is_unavailable() {
        let (_, router) = app();
        let (status, json) = send(router, get("/api/v1/levels/AAPL?interval=5min")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"].as_str().unwrap().contains("FMP_KEY"));
    }

    #[tokio::test]
    async fn config_round_trips_through_api() {
        let (state, router) = app();
        let mut cfg = AnalyzerConfig::default();
        cfg.pivots.window = 14;
        let before = state.current_state_version();

        let (status, json) = send(
            router.clone(),
            post_json("/api/v1/config", serde_json::to_value(&cfg).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pivots"]["window"], 14);
        assert_eq!(state.current_state_version(), before + 1);

        let (_, json) = send(router, get("/api/v1/config")).await;
        assert_eq!(json["pivots"]["window"], 14);
        assert_eq!(state.runtime_config.read().analyzer.pivots.window, 14);
    }
}
