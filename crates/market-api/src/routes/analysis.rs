//! AI 분석 endpoint.
//!
//! - `POST /api/ai/analyze`: 즉시 분석 후 새 전략 레코드 반환
//! - `GET /api/ai-strategies`: 저장된 전략 레코드 조회

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use market_core::StrategyRecord;

use crate::error::{market_error_response, ApiErrorResponse, ApiResult};
use crate::state::AppState;

/// 분석 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 3, max = 20, message = "심볼은 3-20자여야 합니다"))]
    pub symbol: String,

    /// 분석 시간 프레임 (기본 "1h")
    #[serde(default = "default_timeframe")]
    #[validate(length(min = 1, max = 8, message = "timeframe은 1-8자여야 합니다"))]
    pub timeframe: String,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

/// 전략 조회 쿼리.
#[derive(Debug, Deserialize)]
pub struct StrategyListQuery {
    /// `true`면 활성 레코드만 (기본 `true`)
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn validation_error(errors: validator::ValidationErrors) -> (StatusCode, Json<ApiErrorResponse>) {
    let message = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: 유효하지 않은 값", field))
            })
        })
        .collect::<Vec<_>>()
        .join("; ");
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("VALIDATION_ERROR", message)),
    )
}

/// 심볼 하나를 즉시 분석합니다.
///
/// POST /api/ai/analyze
pub async fn analyze_symbol(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<StrategyRecord>> {
    request.validate().map_err(validation_error)?;

    info!(symbol = %request.symbol, timeframe = %request.timeframe, "On-demand analysis requested");

    let record = state
        .analysis
        .analyze_symbol(&request.symbol)
        .await
        .map_err(market_error_response)?;
    Ok(Json(record))
}

/// 저장된 전략 레코드 (최근 생성 순).
///
/// GET /api/ai-strategies?active=true
pub async fn list_strategies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StrategyListQuery>,
) -> ApiResult<Json<Vec<StrategyRecord>>> {
    let records = state
        .strategies
        .list_strategy_records(query.active)
        .await
        .map_err(market_error_response)?;
    Ok(Json(records))
}

pub fn analysis_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ai/analyze", post(analyze_symbol))
        .route("/api/ai-strategies", get(list_strategies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn app() -> Router {
        analysis_router().with_state(Arc::new(AppState::in_memory()))
    }

    fn analyze_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ai/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_without_provider_returns_neutral_record() {
        let app = app();
        let response = app
            .clone()
            .oneshot(analyze_request(r#"{"symbol": "btcusdt"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let record: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(record["symbol"], "BTCUSDT");
        assert_eq!(record["signal"], "HOLD");
        assert_eq!(record["isActive"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/ai-strategies")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_rejects_short_symbol() {
        let response = app()
            .oneshot(analyze_request(r#"{"symbol": "X"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ApiErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "VALIDATION_ERROR");
    }
}
