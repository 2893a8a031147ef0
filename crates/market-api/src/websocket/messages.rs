//! WebSocket 메시지 타입.
//!
//! 서버 → 브라우저 단방향 메시지만 정의합니다.

use serde::Serialize;

use market_core::{MarketSnapshot, NormalizedTick};

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("직렬화 실패: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("연결이 이미 닫힘")]
    Closed,
    #[error("연결이 이미 열림")]
    AlreadyOpen,
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 브라우저로 보내는 메시지.
///
/// ```json
/// {"type": "market_data", "data": [{"symbol": "BTCUSDT", "price": "65247.50", ...}]}
/// {"type": "market_update", "data": {"symbol": "BTCUSDT", "price": 65247.5, ...}}
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 연결 직후 1회 전송되는 전체 스냅샷
    MarketData(Vec<MarketSnapshot>),
    /// 실시간 틱
    MarketUpdate(NormalizedTick),
}

impl ServerMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::from)
    }
}
