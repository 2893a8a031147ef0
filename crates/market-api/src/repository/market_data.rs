//! Market Data Repository
//!
//! `market_data` 테이블에 대한 심볼별 최신 시세 연산.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use market_core::{MarketDataUpdate, MarketResult, MarketSnapshot, MarketStore};

use super::storage_error;

// ================================================================================================
// Types
// ================================================================================================

/// `market_data` 행
#[derive(Debug, Clone, FromRow)]
pub struct MarketDataRow {
    pub symbol: String,
    pub price: Decimal,
    pub change_percent: Decimal,
    pub volume: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub last_update: DateTime<Utc>,
}

impl From<MarketDataRow> for MarketSnapshot {
    fn from(row: MarketDataRow) -> Self {
        Self {
            symbol: row.symbol,
            price: row.price,
            change_percent: row.change_percent,
            volume: row.volume,
            high_24h: row.high_24h,
            low_24h: row.low_24h,
            last_update: row.last_update,
        }
    }
}

// ================================================================================================
// Repository
// ================================================================================================

/// Market Data Repository
pub struct MarketDataRepository;

impl MarketDataRepository {
    /// 모든 심볼의 최신 시세 (최근 갱신 순)
    pub async fn get_all(pool: &PgPool) -> Result<Vec<MarketDataRow>, sqlx::Error> {
        sqlx::query_as::<_, MarketDataRow>(
            r#"
            SELECT symbol, price, change_percent, volume, high_24h, low_24h, last_update
            FROM market_data
            ORDER BY last_update DESC, symbol
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// 심볼 하나의 시세
    pub async fn get_by_symbol(
        pool: &PgPool,
        symbol: &str,
    ) -> Result<Option<MarketDataRow>, sqlx::Error> {
        sqlx::query_as::<_, MarketDataRow>(
            r#"
            SELECT symbol, price, change_percent, volume, high_24h, low_24h, last_update
            FROM market_data
            WHERE symbol = $1
            "#,
        )
        .bind(symbol)
        .fetch_optional(pool)
        .await
    }

    /// 심볼 키 upsert. 모든 필드와 `last_update`를 교체합니다.
    pub async fn upsert(
        pool: &PgPool,
        update: &MarketDataUpdate,
    ) -> Result<MarketDataRow, sqlx::Error> {
        sqlx::query_as::<_, MarketDataRow>(
            r#"
            INSERT INTO market_data (symbol, price, change_percent, volume, high_24h, low_24h, last_update)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (symbol) DO UPDATE SET
                price = EXCLUDED.price,
                change_percent = EXCLUDED.change_percent,
                volume = EXCLUDED.volume,
                high_24h = EXCLUDED.high_24h,
                low_24h = EXCLUDED.low_24h,
                last_update = NOW()
            RETURNING symbol, price, change_percent, volume, high_24h, low_24h, last_update
            "#,
        )
        .bind(&update.symbol)
        .bind(update.price)
        .bind(update.change_percent)
        .bind(update.volume)
        .bind(update.high_24h)
        .bind(update.low_24h)
        .fetch_one(pool)
        .await
    }
}

// ================================================================================================
// MarketStore 구현
// ================================================================================================

/// PostgreSQL 기반 [`MarketStore`].
#[derive(Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn get_market_data(&self) -> MarketResult<Vec<MarketSnapshot>> {
        let rows = MarketDataRepository::get_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(MarketSnapshot::from).collect())
    }

    async fn get_market_data_by_symbol(&self, symbol: &str) -> MarketResult<Option<MarketSnapshot>> {
        let symbol = market_core::normalize_symbol(symbol);
        let row = MarketDataRepository::get_by_symbol(&self.pool, &symbol)
            .await
            .map_err(storage_error)?;
        Ok(row.map(MarketSnapshot::from))
    }

    async fn upsert_market_data(&self, update: MarketDataUpdate) -> MarketResult<MarketSnapshot> {
        let update = update.normalized();
        if update.symbol.is_empty() {
            return Err(market_core::MarketError::InvalidInput(
                "symbol is empty".to_string(),
            ));
        }
        let row = MarketDataRepository::upsert(&self.pool, &update)
            .await
            .map_err(storage_error)?;
        Ok(row.into())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
