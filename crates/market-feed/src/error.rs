//! 피드/폴링 에러 타입.

use thiserror::Error;

use market_core::MarketError;

/// 업스트림 피드 관련 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// WebSocket 프로토콜 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// HTTP 비정상 응답
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 저장소 쓰기 실패
    #[error("Store error: {0}")]
    Store(#[from] MarketError),

    /// 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),
}

/// 피드 작업을 위한 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Network(_)
            | FeedError::WebSocket(_)
            | FeedError::Timeout(_)
            | FeedError::Disconnected(_) => true,
            FeedError::Http { status, .. } => *status == 429 || *status >= 500,
            FeedError::Store(e) => e.is_retryable(),
            FeedError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::Parse(err.to_string())
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                FeedError::Disconnected(err.to_string())
            }
            WsError::Io(_) => FeedError::Network(err.to_string()),
            other => FeedError::WebSocket(other.to_string()),
        }
    }
}
