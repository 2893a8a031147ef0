//! REST API 라우트.
//!
//! # 엔드포인트
//!
//! - `/health` - 헬스 체크
//! - `/api/market-data` - 심볼별 최신 시세
//! - `/api/ai/analyze`, `/api/ai-strategies` - AI 분석 및 전략 신호

pub mod analysis;
pub mod health;
pub mod market;

pub use analysis::analysis_router;
pub use health::{health_router, ComponentStatus, HealthResponse};
pub use market::market_router;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/market-data", market_router())
        .merge(analysis_router())
}
