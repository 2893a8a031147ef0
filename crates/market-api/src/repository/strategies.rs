//! AI Strategy Repository
//!
//! `ai_strategies` 테이블은 추가 전용입니다. 분석 한 번마다 새 행이 생깁니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use market_core::{MarketResult, NewStrategyRecord, Signal, StrategyRecord, StrategyStore};

use super::storage_error;

// ================================================================================================
// Types
// ================================================================================================

/// `ai_strategies` 행
#[derive(Debug, Clone, FromRow)]
pub struct StrategyRow {
    pub id: Uuid,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    pub symbol: String,
    pub signal: String,
    pub confidence: Decimal,
    pub analysis: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StrategyRow> for StrategyRecord {
    fn from(row: StrategyRow) -> Self {
        let signal = row.signal.parse().unwrap_or_else(|e| {
            warn!(id = %row.id, error = %e, "Unknown signal in ai_strategies, treating as HOLD");
            Signal::Hold
        });
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            symbol: row.symbol,
            signal,
            confidence: row.confidence,
            analysis: row.analysis,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ================================================================================================
// Repository
// ================================================================================================

/// AI Strategy Repository
pub struct StrategyRecordRepository;

impl StrategyRecordRepository {
    /// 새 레코드 추가
    pub async fn create(pool: &PgPool, record: &StrategyRecord) -> Result<StrategyRow, sqlx::Error> {
        sqlx::query_as::<_, StrategyRow>(
            r#"
            INSERT INTO ai_strategies
                (id, name, description, symbol, signal, confidence, analysis, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, name, description, symbol, signal, confidence, analysis,
                      is_active, created_at, updated_at
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.symbol)
        .bind(record.signal.as_str())
        .bind(record.confidence)
        .bind(&record.analysis)
        .bind(record.is_active)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(pool)
        .await
    }

    /// 레코드 조회 (최근 생성 순)
    pub async fn list(pool: &PgPool, active_only: bool) -> Result<Vec<StrategyRow>, sqlx::Error> {
        sqlx::query_as::<_, StrategyRow>(
            r#"
            SELECT id, name, description, symbol, signal, confidence, analysis,
                   is_active, created_at, updated_at
            FROM ai_strategies
            WHERE ($1 = FALSE OR is_active = TRUE)
            ORDER BY created_at DESC
            "#,
        )
        .bind(active_only)
        .fetch_all(pool)
        .await
    }
}

// ================================================================================================
// StrategyStore 구현
// ================================================================================================

/// PostgreSQL 기반 [`StrategyStore`].
#[derive(Clone)]
pub struct PgStrategyStore {
    pool: PgPool,
}

impl PgStrategyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StrategyStore for PgStrategyStore {
    async fn create_strategy_record(&self, record: NewStrategyRecord) -> MarketResult<StrategyRecord> {
        let record = record.into_record();
        let row = StrategyRecordRepository::create(&self.pool, &record)
            .await
            .map_err(storage_error)?;
        Ok(row.into())
    }

    async fn list_strategy_records(&self, active_only: bool) -> MarketResult<Vec<StrategyRecord>> {
        let rows = StrategyRecordRepository::list(&self.pool, active_only)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(StrategyRecord::from).collect())
    }
}
