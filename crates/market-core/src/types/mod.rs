//! 도메인 타입.

pub mod analysis;
pub mod market;

pub use analysis::{
    MarketAnalysis, NewStrategyRecord, PriceTargets, Signal, StrategyRecord, TechnicalIndicators,
};
pub use market::{normalize_symbol, MarketDataUpdate, MarketSnapshot, NormalizedTick};
