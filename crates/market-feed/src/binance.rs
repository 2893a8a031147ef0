//! Binance 공개 시세 API 연동.
//!
//! - combined stream WebSocket 프레임(`{stream, data}`) 파싱
//! - REST 24시간 티커 조회 (`GET /api/v3/ticker/24hr?symbol=X`)

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use market_core::{normalize_symbol, MarketDataUpdate, NormalizedTick};

use crate::error::{FeedError, FeedResult};

// ============================================================================
// WebSocket 메시지 타입
// ============================================================================

/// combined stream 봉투.
#[derive(Debug, Deserialize)]
struct CombinedStreamFrame {
    #[serde(default)]
    stream: Option<String>,
    data: WsTicker,
}

/// 24시간 롤링 티커 이벤트 (`<symbol>@ticker`).
#[derive(Debug, Deserialize)]
struct WsTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "P")]
    price_change_percent: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "E", default)]
    event_time: Option<i64>,
}

/// 심볼 목록으로 combined stream URL을 만듭니다.
///
/// `wss://stream.binance.com:9443` + `["BTCUSDT"]` →
/// `wss://stream.binance.com:9443/stream?streams=btcusdt@ticker`
pub fn combined_stream_url(ws_base_url: &str, symbols: &[String]) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@ticker", s.trim().to_lowercase()))
        .collect();
    format!(
        "{}/stream?streams={}",
        ws_base_url.trim_end_matches('/'),
        streams.join("/")
    )
}

/// 숫자 문자열을 Decimal로 파싱합니다. 실패하면 해당 필드 이름과 함께 에러.
fn parse_decimal(field: &str, value: &str) -> FeedResult<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|e| FeedError::Parse(format!("field {} is not numeric ({:?}): {}", field, value, e)))
}

/// combined stream 텍스트 프레임을 정규화된 틱으로 변환합니다.
///
/// 숫자 필드 중 하나라도 파싱되지 않으면 프레임 전체가 잘못된 것으로 처리됩니다.
pub fn parse_combined_frame(text: &str) -> FeedResult<NormalizedTick> {
    let frame: CombinedStreamFrame = serde_json::from_str(text)?;
    let t = frame.data;

    let symbol = normalize_symbol(&t.symbol);
    if symbol.is_empty() {
        return Err(FeedError::Parse("empty symbol".to_string()));
    }

    if let Some(stream) = frame.stream.as_deref() {
        debug!(stream, symbol = %symbol, "Ticker frame received");
    }

    Ok(NormalizedTick {
        symbol,
        price: parse_decimal("c", &t.close)?,
        change_percent: parse_decimal("P", &t.price_change_percent)?,
        volume: parse_decimal("v", &t.volume)?,
        high_24h: parse_decimal("h", &t.high)?,
        low_24h: parse_decimal("l", &t.low)?,
        timestamp: t.event_time.unwrap_or_else(|| Utc::now().timestamp_millis()),
    })
}

// ============================================================================
// REST 24시간 티커
// ============================================================================

/// REST 24시간 티커 응답.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestTicker24h {
    symbol: String,
    last_price: String,
    price_change_percent: String,
    volume: String,
    high_price: String,
    low_price: String,
}

impl TryFrom<RestTicker24h> for MarketDataUpdate {
    type Error = FeedError;

    fn try_from(t: RestTicker24h) -> Result<Self, Self::Error> {
        Ok(MarketDataUpdate {
            symbol: normalize_symbol(&t.symbol),
            price: parse_decimal("lastPrice", &t.last_price)?,
            change_percent: parse_decimal("priceChangePercent", &t.price_change_percent)?,
            volume: parse_decimal("volume", &t.volume)?,
            high_24h: parse_decimal("highPrice", &t.high_price)?,
            low_24h: parse_decimal("lowPrice", &t.low_price)?,
        })
    }
}

/// Binance REST 티커 클라이언트.
#[derive(Debug, Clone)]
pub struct TickerClient {
    client: reqwest::Client,
    base_url: String,
}

impl TickerClient {
    /// 요청 타임아웃이 설정된 클라이언트를 생성합니다.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 심볼 하나의 24시간 티커를 조회합니다.
    pub async fn fetch_24h_ticker(&self, symbol: &str) -> FeedResult<MarketDataUpdate> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let symbol = normalize_symbol(symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let ticker: RestTicker24h = response.json().await?;
        MarketDataUpdate::try_from(ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FRAME: &str = r#"{
        "stream": "btcusdt@ticker",
        "data": {"e":"24hrTicker","E":1700000000123,"s":"BTCUSDT","p":"1560.00","P":"2.45",
                 "c":"65247.50","v":"100","h":"66000","l":"64000"}
    }"#;

    #[test]
    fn test_combined_stream_url() {
        let url = combined_stream_url(
            "wss://stream.binance.com:9443/",
            &["BTCUSDT".to_string(), "ethusdt".to_string()],
        );
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@ticker/ethusdt@ticker"
        );
    }

    #[test]
    fn test_parse_combined_frame() {
        let tick = parse_combined_frame(FRAME).unwrap();

        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, dec!(65247.50));
        assert_eq!(tick.change_percent, dec!(2.45));
        assert_eq!(tick.high_24h, dec!(66000));
        assert_eq!(tick.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn test_missing_event_time_uses_now() {
        let before = Utc::now().timestamp_millis();
        let tick = parse_combined_frame(
            r#"{"data":{"s":"ethusdt","c":"3000","P":"-1.2","v":"5","h":"3100","l":"2900"}}"#,
        )
        .unwrap();

        assert_eq!(tick.symbol, "ETHUSDT");
        assert_eq!(tick.change_percent, dec!(-1.2));
        assert!(tick.timestamp >= before);
    }

    #[test]
    fn test_malformed_frames_rejected() {
        // 숫자가 아닌 가격
        assert!(parse_combined_frame(
            r#"{"data":{"s":"BTCUSDT","c":"abc","P":"1","v":"1","h":"1","l":"1"}}"#
        )
        .is_err());
        // 필드 누락
        assert!(parse_combined_frame(r#"{"data":{"s":"BTCUSDT","c":"1"}}"#).is_err());
        // JSON 아님
        assert!(parse_combined_frame("not json").is_err());
        // 구독 응답 (data 없음)
        assert!(parse_combined_frame(r#"{"result":null,"id":1}"#).is_err());
    }

    #[test]
    fn test_rest_ticker_conversion() {
        let ticker: RestTicker24h = serde_json::from_str(
            r#"{"symbol":"BNBUSDT","priceChange":"1.0","priceChangePercent":"0.31",
                "lastPrice":"320.10000000","volume":"12345.6","highPrice":"325.0","lowPrice":"310.5",
                "openPrice":"319.1","count":1000}"#,
        )
        .unwrap();
        let update = MarketDataUpdate::try_from(ticker).unwrap();

        assert_eq!(update.symbol, "BNBUSDT");
        assert_eq!(update.price, dec!(320.1));
        assert_eq!(update.low_24h, dec!(310.5));
    }
}
