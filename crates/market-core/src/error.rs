//! 시세 파이프라인의 에러 타입.
//!
//! 이 모듈은 크레이트 경계를 넘나드는 공용 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 파이프라인 에러.
#[derive(Debug, Error)]
pub enum MarketError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 저장소 에러
    #[error("저장소 에러: {0}")]
    Storage(String),

    /// 분석 에러
    #[error("분석 에러: {0}")]
    Analysis(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 파이프라인 작업을 위한 Result 타입.
pub type MarketResult<T> = Result<T, MarketError>;

impl MarketError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MarketError::Network(_) | MarketError::Storage(_))
    }

    /// 에러 코드 문자열 (API 응답용).
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Config(_) => "CONFIG_ERROR",
            MarketError::Network(_) => "NETWORK_ERROR",
            MarketError::Parse(_) => "PARSE_ERROR",
            MarketError::Storage(_) => "STORAGE_ERROR",
            MarketError::Analysis(_) => "ANALYSIS_ERROR",
            MarketError::NotFound(_) => "NOT_FOUND",
            MarketError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::Parse(err.to_string())
    }
}

impl From<config::ConfigError> for MarketError {
    fn from(err: config::ConfigError) -> Self {
        MarketError::Config(err.to_string())
    }
}
