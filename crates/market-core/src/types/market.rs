//! 시세 데이터 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 심볼별 최신 시세 스냅샷.
///
/// 심볼당 정확히 한 행만 존재하며, 쓰기는 항상 전체 교체(upsert)입니다.
/// 소수 필드는 정밀도 손실을 막기 위해 JSON 문자열로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// 대문자 심볼 (예: "BTCUSDT")
    pub symbol: String,
    /// 현재가
    pub price: Decimal,
    /// 24시간 변동률 (%)
    pub change_percent: Decimal,
    /// 24시간 거래량
    pub volume: Decimal,
    /// 24시간 고가
    pub high_24h: Decimal,
    /// 24시간 저가
    pub low_24h: Decimal,
    /// 마지막 갱신 시각 (저장소가 기록)
    pub last_update: DateTime<Utc>,
}

/// 저장소 upsert 입력.
///
/// `last_update`는 저장소가 쓰기 시점에 채웁니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataUpdate {
    pub symbol: String,
    pub price: Decimal,
    pub change_percent: Decimal,
    pub volume: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
}

impl MarketDataUpdate {
    /// 심볼을 대문자로 정규화합니다.
    pub fn normalized(mut self) -> Self {
        self.symbol = normalize_symbol(&self.symbol);
        self
    }

    /// 주어진 시각으로 스냅샷을 만듭니다.
    pub fn into_snapshot(self, last_update: DateTime<Utc>) -> MarketSnapshot {
        MarketSnapshot {
            symbol: normalize_symbol(&self.symbol),
            price: self.price,
            change_percent: self.change_percent,
            volume: self.volume,
            high_24h: self.high_24h,
            low_24h: self.low_24h,
            last_update,
        }
    }
}

impl From<&NormalizedTick> for MarketDataUpdate {
    fn from(tick: &NormalizedTick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            price: tick.price,
            change_percent: tick.change_percent,
            volume: tick.volume,
            high_24h: tick.high_24h,
            low_24h: tick.low_24h,
        }
    }
}

/// 업스트림 프레임에서 정규화된 틱.
///
/// 저장되지 않고 허브를 통해 브라우저로만 전달됩니다.
/// 브라우저 호환을 위해 소수 필드는 JSON 숫자로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTick {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub change_percent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high_24h: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub low_24h: Decimal,
    /// 이벤트 시각 (epoch 밀리초)
    pub timestamp: i64,
}

/// 거래소 심볼 표기를 내부 키로 변환합니다.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_tick() -> NormalizedTick {
        NormalizedTick {
            symbol: "BTCUSDT".to_string(),
            price: dec!(65247.50),
            change_percent: dec!(2.45),
            volume: dec!(100),
            high_24h: dec!(66000),
            low_24h: dec!(64000),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_snapshot_serializes_decimals_as_strings() {
        let snapshot = MarketDataUpdate::from(&sample_tick())
            .into_snapshot(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap());
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["price"], "65247.50");
        assert_eq!(json["changePercent"], "2.45");
        assert_eq!(json["high24h"], "66000");
        assert!(json.get("lastUpdate").is_some());
    }

    #[test]
    fn test_tick_serializes_decimals_as_numbers() {
        let json = serde_json::to_value(sample_tick()).unwrap();

        assert_eq!(json["price"].as_f64(), Some(65247.5));
        assert_eq!(json["low24h"].as_f64(), Some(64000.0));
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_update_normalizes_symbol() {
        let update = MarketDataUpdate {
            symbol: " ethusdt ".to_string(),
            ..MarketDataUpdate::from(&sample_tick())
        }
        .normalized();
        assert_eq!(update.symbol, "ETHUSDT");
    }
}
