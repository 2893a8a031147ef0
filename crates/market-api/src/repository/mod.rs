//! Repository pattern for database operations.
//!
//! PostgreSQL 연산을 static methods 패턴으로 제공하고,
//! 그 위에 `market-core` 저장소 trait 구현을 얹습니다.

pub mod market_data;
pub mod strategies;

pub use market_data::{MarketDataRepository, MarketDataRow, PgMarketStore};
pub use strategies::{PgStrategyStore, StrategyRecordRepository, StrategyRow};

use market_core::MarketError;
use tracing::error;

/// sqlx 에러를 저장소 에러로 변환합니다.
pub(crate) fn storage_error(err: sqlx::Error) -> MarketError {
    error!(error = %err, "Database operation failed");
    MarketError::Storage(err.to_string())
}
