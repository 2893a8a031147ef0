//! 헬스 체크 endpoint.
//!
//! `/health`는 liveness, `/health/ready`는 파이프라인 구성요소 상태를 보고합니다.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use market_feed::FeedStatus;

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 시세 저장소
    pub store: ComponentStatus,

    /// 업스트림 WebSocket 피드
    pub feed: ComponentStatus,

    /// REST 폴링 갱신기
    pub poller: ComponentStatus,

    /// 실시간 허브
    pub hub: ComponentStatus,

    /// AI 분석
    pub analysis: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "not_configured")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }

    pub fn up_with_info(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_down(&self) -> bool {
        self.status == "down"
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn feed_component(status: FeedStatus) -> ComponentStatus {
    match status {
        FeedStatus::Connected => ComponentStatus::up(),
        FeedStatus::Idle | FeedStatus::Connecting => ComponentStatus::up_with_info("connecting"),
        FeedStatus::Reconnecting { attempt } => {
            ComponentStatus::down(format!("reconnecting (attempt {})", attempt))
        }
        FeedStatus::Failed => ComponentStatus::down("reconnect limit exceeded"),
        FeedStatus::Stopped => ComponentStatus::down("stopped"),
    }
}

/// 상세 헬스 체크 (readiness probe용).
///
/// 저장소 장애만 503으로 보고합니다. 피드 장애는 폴러가 보완하므로 degraded.
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut overall_status = "healthy";
    let mut status_code = StatusCode::OK;

    let store_status = if state.db_pool.is_some() {
        if state.is_db_healthy().await {
            ComponentStatus::up_with_info(state.store.backend())
        } else {
            overall_status = "unhealthy";
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            ComponentStatus::down("연결 실패")
        }
    } else {
        ComponentStatus::up_with_info(state.store.backend())
    };

    let feed_status = match &state.feed {
        Some(feed) => feed_component(feed.status()),
        None => ComponentStatus::not_configured(),
    };

    let poller_status = match &state.poller {
        Some(poller) if poller.is_running() => ComponentStatus::up(),
        Some(_) => ComponentStatus::down("stopped"),
        None => ComponentStatus::not_configured(),
    };

    if (feed_status.is_down() || poller_status.is_down()) && overall_status == "healthy" {
        overall_status = "degraded";
    }

    let hub_status = ComponentStatus::up_with_info(format!(
        "{} subscribers",
        state.hub.subscriber_count()
    ));

    let analysis_status = match (state.analysis.provider_name(), &state.scheduler) {
        (Some(provider), Some(scheduler)) if scheduler.is_running() => {
            ComponentStatus::up_with_info(format!("{}, scheduled", provider))
        }
        (Some(provider), _) => ComponentStatus::up_with_info(provider),
        (None, _) => ComponentStatus::not_configured(),
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            store: store_status,
            feed: feed_status,
            poller: poller_status,
            hub: hub_status,
            analysis: analysis_status,
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let app = Router::new().route("/health", get(health_check));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_reports_components() {
        let state = Arc::new(AppState::in_memory());
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.store.message.as_deref(), Some("memory"));
        assert_eq!(health.components.feed.status, "not_configured");
        assert_eq!(health.components.analysis.status, "not_configured");
    }

    #[test]
    fn test_feed_component_mapping() {
        assert_eq!(feed_component(FeedStatus::Connected).status, "up");
        assert!(feed_component(FeedStatus::Failed).is_down());
        assert!(feed_component(FeedStatus::Reconnecting { attempt: 2 })
            .message
            .unwrap()
            .contains('2'));
    }
}
