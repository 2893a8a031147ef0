//! 설정 관리.
//!
//! 기본값 → `config/default.toml`(선택) → 환경 변수(`MARKET__SECTION__KEY`) 순으로
//! 병합하여 [`AppConfig`]를 구성합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 업스트림 WebSocket 피드 설정
    pub feed: FeedConfig,
    /// REST 폴링 설정
    pub polling: PollingConfig,
    /// AI 분석 설정
    pub analysis: AnalysisConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 전역 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 허용 CORS origin 목록 (비어 있으면 모두 허용)
    pub cors_origins: Vec<String>,
    /// 연결당 송신 큐 크기
    pub client_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 30,
            cors_origins: Vec::new(),
            client_queue_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// `host:port` 형식의 바인딩 주소.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL 연결 URL (없으면 인메모리 저장소 사용)
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 획득 타임아웃 (초)
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// 업스트림 WebSocket 피드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// 피드 활성화 여부
    pub enabled: bool,
    /// WebSocket 기본 URL (combined stream 경로는 자동으로 붙음)
    pub ws_base_url: String,
    /// 구독할 심볼 목록
    pub symbols: Vec<String>,
    /// 재연결 기본 간격 (밀리초). n번째 시도는 n × 이 값만큼 대기
    pub reconnect_interval_ms: u64,
    /// 최대 재연결 시도 횟수
    pub max_reconnect_attempts: u32,
    /// Ping 전송 주기 (초)
    pub ping_interval_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_base_url: "wss://stream.binance.com:9443".to_string(),
            symbols: [
                "BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "DOGEUSDT", "DOTUSDT", "AVAXUSDT",
                "SOLUSDT", "LUNAUSDT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            reconnect_interval_ms: 5000,
            max_reconnect_attempts: 5,
            ping_interval_secs: 20,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// 연결 핸드셰이크 제한 시간 (재연결 간격의 2배).
    pub fn connect_timeout(&self) -> Duration {
        self.reconnect_interval().saturating_mul(2)
    }
}

/// REST 폴링 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// 폴링 활성화 여부
    pub enabled: bool,
    /// REST API 기본 URL
    pub rest_base_url: String,
    /// 폴링할 심볼 목록
    pub symbols: Vec<String>,
    /// 폴링 주기 (초)
    pub interval_secs: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rest_base_url: "https://api.binance.com".to_string(),
            symbols: ["BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "DOGEUSDT", "DOTUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// AI 분석 설정.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 주기적 분석 활성화 여부
    pub enabled: bool,
    /// chat-completions API 기본 URL
    pub base_url: String,
    /// API 키 (직렬화하지 않음)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// 모델 이름
    pub model: String,
    /// 주기적으로 분석할 심볼 목록
    pub symbols: Vec<String>,
    /// 분석 주기 (초)
    pub interval_secs: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 샘플링 온도
    pub temperature: f32,
    /// 최대 생성 토큰 수
    pub max_tokens: u32,
    /// `HTTP-Referer` 헤더 값
    pub referer: String,
    /// `X-Title` 헤더 값
    pub title: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "anthropic/claude-3.5-sonnet".to_string(),
            symbols: ["BTCUSDT", "ETHUSDT", "BNBUSDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interval_secs: 300,
            request_timeout_secs: 30,
            temperature: 0.3,
            max_tokens: 1000,
            referer: "https://aprendiendo-trading.com".to_string(),
            title: "Aprendiendo Trading - AI Analysis".to_string(),
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("symbols", &self.symbols)
            .field("interval_secs", &self.interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl AnalysisConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,market_api=debug,tower_http=info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 건너뜁니다. `DATABASE_URL`, `OPENROUTER_API_KEY`는
    /// 접두사 없이도 인식합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("MARKET")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("feed.symbols")
                    .with_list_parse_key("polling.symbols")
                    .with_list_parse_key("analysis.symbols")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("analysis.api_key", std::env::var("OPENROUTER_API_KEY").ok())?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// 주기 값 검증. 0 주기는 타이머를 만들 수 없으므로 거부합니다.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let intervals = [
            ("feed.reconnect_interval_ms", self.feed.reconnect_interval_ms),
            ("feed.ping_interval_secs", self.feed.ping_interval_secs),
            ("polling.interval_secs", self.polling.interval_secs),
            ("analysis.interval_secs", self.analysis.interval_secs),
        ];

        for (key, value) in intervals {
            if value == 0 {
                return Err(config::ConfigError::Message(format!(
                    "{} must be greater than zero",
                    key
                )));
            }
        }
        Ok(())
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    /// 심볼을 대문자로 정규화하고 빈 항목을 제거합니다.
    fn normalized(mut self) -> Self {
        for symbols in [
            &mut self.feed.symbols,
            &mut self.polling.symbols,
            &mut self.analysis.symbols,
        ] {
            *symbols = symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_cadence() {
        let config = AppConfig::default();

        assert_eq!(config.feed.reconnect_interval(), Duration::from_millis(5000));
        assert_eq!(config.feed.max_reconnect_attempts, 5);
        assert_eq!(config.feed.ping_interval(), Duration::from_secs(20));
        assert_eq!(config.feed.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.polling.interval(), Duration::from_secs(30));
        assert_eq!(config.analysis.interval(), Duration::from_secs(300));
        assert_eq!(config.analysis.symbols, vec!["BTCUSDT", "ETHUSDT", "BNBUSDT"]);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.feed.symbols.len(), 9);
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        assert!(AppConfig::default().validate().is_ok());

        let mut config = AppConfig::default();
        config.polling.interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("polling.interval_secs"));

        let mut config = AppConfig::default();
        config.feed.ping_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.feed.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analysis.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_zero_interval_from_file() {
        let path = std::env::temp_dir().join(format!(
            "market-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "[polling]\ninterval_secs = 0\n").unwrap();

        let result = AppConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_normalized_symbols() {
        let mut config = AppConfig::default();
        config.feed.symbols = vec![" btcusdt".into(), "".into(), "EthUsdt".into()];

        let config = config.normalized();
        assert_eq!(config.feed.symbols, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_analysis_debug_redacts_key() {
        let config = AnalysisConfig {
            api_key: Some("sk-or-secret".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-or-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
