//! AI 분석 결과 및 전략 레코드 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 매매 신호.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Signal::Buy),
            "SELL" => Ok(Signal::Sell),
            "HOLD" => Ok(Signal::Hold),
            other => Err(format!("Unknown signal: {}", other)),
        }
    }
}

/// 기술 지표 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub rsi: f64,
    pub macd: String,
    pub trend: String,
}

impl Default for TechnicalIndicators {
    fn default() -> Self {
        Self {
            rsi: 50.0,
            macd: "neutral".to_string(),
            trend: "sideways".to_string(),
        }
    }
}

/// 지지/저항 가격 목표.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTargets {
    pub support: f64,
    pub resistance: f64,
}

/// 심볼 하나에 대한 정성적 분석 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub signal: Signal,
    /// 신뢰도 (0~100)
    pub confidence: f64,
    pub summary: String,
    pub technical_indicators: TechnicalIndicators,
    pub price_targets: PriceTargets,
    /// 분석 시각 (epoch 밀리초)
    pub timestamp: i64,
}

impl MarketAnalysis {
    /// 외부 분석이 완전히 실패했을 때의 중립 결과.
    pub fn neutral() -> Self {
        Self {
            signal: Signal::Hold,
            confidence: 50.0,
            summary: "Unable to perform AI analysis at this time. Please try again later.".to_string(),
            technical_indicators: TechnicalIndicators::default(),
            price_targets: PriceTargets::default(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 0~100 범위로 제한된 신뢰도를 소수 둘째 자리로 반환합니다.
    pub fn confidence_decimal(&self) -> Decimal {
        let clamped = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 100.0)
        } else {
            50.0
        };
        Decimal::from_f64_retain(clamped)
            .unwrap_or(Decimal::from(50))
            .round_dp(2)
    }
}

/// 분석 결과에서 생성되는 추가 전용 전략 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub symbol: String,
    pub signal: Signal,
    pub confidence: Decimal,
    /// 구조화된 분석 원문 (JSON)
    pub analysis: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 전략 레코드 생성 입력.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStrategyRecord {
    pub name: String,
    pub description: Option<String>,
    pub symbol: String,
    pub signal: Signal,
    pub confidence: Decimal,
    pub analysis: serde_json::Value,
}

impl NewStrategyRecord {
    /// 자동 분석 결과에서 레코드 입력을 만듭니다.
    pub fn from_analysis(symbol: &str, analysis: &MarketAnalysis) -> Self {
        Self {
            name: format!("Auto Analysis {}", symbol),
            description: Some(analysis.summary.clone()),
            symbol: symbol.to_string(),
            signal: analysis.signal,
            confidence: analysis.confidence_decimal(),
            analysis: serde_json::to_value(analysis).unwrap_or(serde_json::Value::Null),
        }
    }

    /// 새 ID와 현재 시각으로 레코드를 확정합니다.
    pub fn into_record(self) -> StrategyRecord {
        let now = Utc::now();
        StrategyRecord {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            symbol: self.symbol,
            signal: self.signal,
            confidence: self.confidence,
            analysis: self.analysis,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
