//! AI 시장 분석 서비스.
//!
//! 외부 chat-completions API에 현재 시세를 보내 정성적 분석을 받고,
//! 그 결과를 추가 전용 전략 레코드로 저장합니다.
//!
//! 응답이 JSON이 아니면 키워드 기반 저하 결과를, 호출 자체가 실패하면
//! 중립(HOLD, 50) 결과를 사용하므로 분석 경로는 항상 레코드를 남깁니다.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use market_core::{
    normalize_symbol, AnalysisConfig, MarketAnalysis, MarketError, MarketResult, MarketSnapshot,
    NewStrategyRecord, PriceTargets, SharedMarketStore, SharedStrategyStore, Signal,
    StrategyRecord, TechnicalIndicators,
};
use market_feed::TickerClient;

use crate::metrics::record_analysis_run;

const SYSTEM_PROMPT: &str = "You are a professional cryptocurrency trading analyst with expertise \
in technical analysis. Provide accurate, data-driven trading insights.";

/// 저하 결과 요약에 남길 원문 최대 길이 (문자 수).
const DEGRADED_SUMMARY_CHARS: usize = 200;

/// 키워드 분류 결과의 신뢰도.
const DEGRADED_CONFIDENCE: f64 = 40.0;

// ==================== 에러 ====================

/// 분석 API 호출 에러.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("분석 API 키가 설정되지 않음")]
    MissingApiKey,

    #[error("네트워크 에러: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("응답 본문이 비어 있음")]
    EmptyResponse,

    #[error("응답 파싱 실패: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AnalysisError::Parse(err.to_string())
        } else {
            AnalysisError::Network(err.to_string())
        }
    }
}

// ==================== 응답 파싱 ====================

/// 분석 응답 파싱 품질.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseQuality {
    /// JSON 객체에서 읽음
    Structured,
    /// JSON을 찾지 못해 키워드로 분류함
    Degraded,
}

impl ParseQuality {
    fn metric_label(self) -> &'static str {
        match self {
            ParseQuality::Structured => "ok",
            ParseQuality::Degraded => "degraded",
        }
    }
}

/// 모델 응답 텍스트를 분석 결과로 변환합니다.
///
/// 코드 펜스를 벗기고 가장 바깥의 `{...}` 블록을 읽습니다.
/// 누락된 필드는 중립 기본값으로 채웁니다.
pub fn parse_analysis(raw: &str) -> (MarketAnalysis, ParseQuality) {
    match extract_json_object(raw) {
        Some(object) => (analysis_from_value(&object), ParseQuality::Structured),
        None => (keyword_analysis(raw), ParseQuality::Degraded),
    }
}

fn extract_json_object(raw: &str) -> Option<Value> {
    let text = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```");

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// 숫자 또는 숫자 문자열 필드.
fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    }
}

fn label_field(value: &Value, key: &str, allowed: &[&str], default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| allowed.contains(&s.as_str()))
        .unwrap_or_else(|| default.to_string())
}

fn analysis_from_value(value: &Value) -> MarketAnalysis {
    let signal = value
        .get("signal")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Signal>().ok())
        .unwrap_or(Signal::Hold);

    let technical_indicators = match value.get("technicalIndicators") {
        Some(ti) => TechnicalIndicators {
            rsi: number_field(ti, "rsi").unwrap_or(50.0),
            macd: label_field(ti, "macd", &["bullish", "bearish", "neutral"], "neutral"),
            trend: label_field(ti, "trend", &["uptrend", "downtrend", "sideways"], "sideways"),
        },
        None => TechnicalIndicators::default(),
    };

    let price_targets = match value.get("priceTargets") {
        Some(pt) => PriceTargets {
            support: number_field(pt, "support").unwrap_or(0.0),
            resistance: number_field(pt, "resistance").unwrap_or(0.0),
        },
        None => PriceTargets::default(),
    };

    MarketAnalysis {
        signal,
        confidence: number_field(value, "confidence").unwrap_or(50.0),
        summary: value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        technical_indicators,
        price_targets,
        timestamp: Utc::now().timestamp_millis(),
    }
}

/// JSON이 아닌 응답을 매수/매도 키워드 수로 분류합니다.
fn keyword_analysis(raw: &str) -> MarketAnalysis {
    let lowered = raw.to_lowercase();
    let (mut buy, mut sell) = (0usize, 0usize);
    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        match word {
            "buy" | "bullish" | "long" => buy += 1,
            "sell" | "bearish" | "short" => sell += 1,
            _ => {}
        }
    }

    let signal = match buy.cmp(&sell) {
        std::cmp::Ordering::Greater => Signal::Buy,
        std::cmp::Ordering::Less => Signal::Sell,
        std::cmp::Ordering::Equal => Signal::Hold,
    };

    MarketAnalysis {
        signal,
        confidence: DEGRADED_CONFIDENCE,
        summary: raw.trim().chars().take(DEGRADED_SUMMARY_CHARS).collect(),
        technical_indicators: TechnicalIndicators::default(),
        price_targets: PriceTargets::default(),
        timestamp: Utc::now().timestamp_millis(),
    }
}

// ==================== Provider ====================

/// 분석 제공자.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// 시세 컨텍스트로 분석을 수행합니다. 응답이 JSON이 아니어도 `Ok`.
    async fn analyze(
        &self,
        symbol: &str,
        context: &MarketSnapshot,
    ) -> Result<(MarketAnalysis, ParseQuality), AnalysisError>;

    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// 분석 요청 프롬프트.
pub fn build_prompt(symbol: &str, context: &MarketSnapshot) -> String {
    format!(
        "Analyze the current market conditions for {symbol}:\n\
         \n\
         Current Price: ${price}\n\
         24h Change: {change}%\n\
         24h High: ${high}\n\
         24h Low: ${low}\n\
         Volume: {volume}\n\
         \n\
         Please provide a comprehensive trading analysis including:\n\
         1. Signal (BUY/SELL/HOLD)\n\
         2. Confidence level (0-100)\n\
         3. Technical analysis summary\n\
         4. Key support and resistance levels\n\
         5. RSI estimation\n\
         6. MACD trend analysis\n\
         \n\
         Format your response as JSON with the following structure:\n\
         {{\n  \"signal\": \"BUY|SELL|HOLD\",\n  \"confidence\": 0-100,\n  \
         \"summary\": \"Brief analysis summary\",\n  \
         \"technicalIndicators\": {{\n    \"rsi\": 0-100,\n    \
         \"macd\": \"bullish|bearish|neutral\",\n    \
         \"trend\": \"uptrend|downtrend|sideways\"\n  }},\n  \
         \"priceTargets\": {{\n    \"support\": price_level,\n    \
         \"resistance\": price_level\n  }}\n}}",
        symbol = symbol,
        price = context.price,
        change = context.change_percent,
        high = context.high_24h,
        low = context.low_24h,
        volume = context.volume,
    )
}

/// OpenRouter chat-completions 클라이언트.
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    max_tokens: u32,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// 설정에서 클라이언트를 생성합니다. API 키가 없으면 에러.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AnalysisError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(key.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl AnalysisProvider for OpenRouterClient {
    async fn analyze(
        &self,
        symbol: &str,
        context: &MarketSnapshot,
    ) -> Result<(MarketAnalysis, ParseQuality), AnalysisError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(symbol, context),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AnalysisError::EmptyResponse)?;

        debug!(symbol, chars = content.len(), "Analysis response received");
        Ok(parse_analysis(&content))
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

// ==================== 서비스 ====================

/// 심볼 분석 후 전략 레코드를 남기는 서비스.
///
/// 주기 스케줄러와 `POST /api/ai/analyze`가 같은 경로를 사용합니다.
pub struct AnalysisService {
    provider: Option<Arc<dyn AnalysisProvider>>,
    store: SharedMarketStore,
    strategies: SharedStrategyStore,
    ticker: Option<TickerClient>,
}

impl AnalysisService {
    pub fn new(
        provider: Option<Arc<dyn AnalysisProvider>>,
        store: SharedMarketStore,
        strategies: SharedStrategyStore,
    ) -> Self {
        Self {
            provider,
            store,
            strategies,
            ticker: None,
        }
    }

    /// 저장소에 시세가 없을 때 사용할 REST 티커 클라이언트.
    pub fn with_ticker(mut self, ticker: TickerClient) -> Self {
        self.ticker = Some(ticker);
        self
    }

    /// 분석 제공자 설정 여부.
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.name())
    }

    /// 분석용 시세 컨텍스트. 저장소 우선, 없으면 REST 티커.
    async fn market_context(&self, symbol: &str) -> Option<MarketSnapshot> {
        match self.store.get_market_data_by_symbol(symbol).await {
            Ok(Some(snapshot)) => return Some(snapshot),
            Ok(None) => {}
            Err(e) => warn!(symbol, error = %e, "Store read failed, trying REST ticker"),
        }

        let ticker = self.ticker.as_ref()?;
        match ticker.fetch_24h_ticker(symbol).await {
            Ok(update) => Some(update.into_snapshot(Utc::now())),
            Err(e) => {
                warn!(symbol, error = %e, "REST ticker fallback failed");
                None
            }
        }
    }

    /// 외부 분석 실패를 흡수하여 항상 결과를 반환합니다.
    pub async fn analyze(&self, symbol: &str) -> MarketAnalysis {
        let Some(provider) = self.provider.as_ref() else {
            record_analysis_run("fallback");
            return MarketAnalysis::neutral();
        };

        let Some(context) = self.market_context(symbol).await else {
            warn!(symbol, "No market context available, using neutral analysis");
            record_analysis_run("fallback");
            return MarketAnalysis::neutral();
        };

        match provider.analyze(symbol, &context).await {
            Ok((analysis, quality)) => {
                if quality == ParseQuality::Degraded {
                    warn!(symbol, "Analysis response was not JSON, classified by keywords");
                }
                record_analysis_run(quality.metric_label());
                analysis
            }
            Err(e) => {
                warn!(symbol, provider = provider.name(), error = %e, "Analysis request failed");
                record_analysis_run("fallback");
                MarketAnalysis::neutral()
            }
        }
    }

    /// 심볼을 분석하고 새 전략 레코드를 추가합니다.
    ///
    /// 저장 실패만 에러로 반환됩니다.
    pub async fn analyze_symbol(&self, symbol: &str) -> MarketResult<StrategyRecord> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(MarketError::InvalidInput("symbol is empty".to_string()));
        }

        let analysis = self.analyze(&symbol).await;
        let record = self
            .strategies
            .create_strategy_record(NewStrategyRecord::from_analysis(&symbol, &analysis))
            .await
            .inspect_err(|_| record_analysis_run("error"))?;

        info!(
            symbol = %record.symbol,
            signal = %record.signal,
            confidence = %record.confidence,
            "Strategy record created"
        );
        Ok(record)
    }
}
