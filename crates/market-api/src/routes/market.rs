//! 시세 조회 endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use market_core::{normalize_symbol, MarketSnapshot};

use crate::error::{market_error_response, ApiErrorResponse, ApiResult};
use crate::state::AppState;

/// 모든 심볼의 최신 시세 (최근 갱신 순).
///
/// GET /api/market-data
pub async fn list_market_data(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<MarketSnapshot>>> {
    let rows = state
        .store
        .get_market_data()
        .await
        .map_err(market_error_response)?;
    Ok(Json(rows))
}

/// 심볼 하나의 시세.
///
/// GET /api/market-data/{symbol}
pub async fn get_market_data(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<MarketSnapshot>> {
    let symbol = normalize_symbol(&symbol);
    let snapshot = state
        .store
        .get_market_data_by_symbol(&symbol)
        .await
        .map_err(market_error_response)?;

    snapshot.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiErrorResponse::new(
                "NOT_FOUND",
                format!("No market data for symbol: {}", symbol),
            )),
        )
    })
}

pub fn market_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_market_data))
        .route("/{symbol}", get(get_market_data))
}

// ==================== 테스트 ====================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use market_core::MarketDataUpdate;
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    async fn app_with_btc() -> Router {
        let state = AppState::in_memory();
        state
            .store
            .upsert_market_data(MarketDataUpdate {
                symbol: "BTCUSDT".to_string(),
                price: dec!(65247.50),
                change_percent: dec!(2.45),
                volume: dec!(100),
                high_24h: dec!(66000),
                low_24h: dec!(64000),
            })
            .await
            .unwrap();
        Router::new()
            .nest("/api/market-data", market_router())
            .with_state(Arc::new(state))
    }

    #[tokio::test]
    async fn test_get_by_symbol_is_case_insensitive() {
        let response = app_with_btc()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/market-data/btcusdt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["price"], "65247.50");
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_404() {
        let response = app_with_btc()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/market-data/XRPUSDT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: ApiErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "NOT_FOUND");
    }
}
