//! 통합 API 에러 응답 타입.
//!
//! 모든 REST 엔드포인트는 같은 JSON 에러 형식을 사용합니다.
//!
//! ```json
//! {
//!   "code": "NOT_FOUND",
//!   "message": "No market data for symbol: XRPUSDT",
//!   "timestamp": 1738300800
//! }
//! ```

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use market_core::MarketError;

/// 통합 API 에러 응답.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "STORAGE_ERROR", "INVALID_INPUT", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }
}

/// API 핸들러 Result 타입.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 도메인 에러를 HTTP 상태와 응답 본문으로 변환합니다.
pub fn market_error_response(err: MarketError) -> (StatusCode, Json<ApiErrorResponse>) {
    let status = match &err {
        MarketError::NotFound(_) => StatusCode::NOT_FOUND,
        MarketError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MarketError::Network(_) | MarketError::Analysis(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiErrorResponse::new(err.code(), err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let (status, body) = market_error_response(MarketError::NotFound("XRPUSDT".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "NOT_FOUND");
        assert!(body.timestamp.is_some());

        let (status, _) = market_error_response(MarketError::Storage("pool closed".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_details_serialized_only_when_present() {
        let plain = serde_json::to_value(ApiErrorResponse::new("X", "y")).unwrap();
        assert!(plain.get("details").is_none());

        let detailed = ApiErrorResponse::with_details("X", "y", serde_json::json!({"field": "symbol"}));
        assert_eq!(serde_json::to_value(detailed).unwrap()["details"]["field"], "symbol");
    }
}
