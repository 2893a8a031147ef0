//! 인메모리 저장소 구현.
//!
//! `DATABASE_URL`이 없을 때와 테스트에서 사용합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{MarketStore, StrategyStore};
use crate::error::{MarketError, MarketResult};
use crate::types::{
    normalize_symbol, MarketDataUpdate, MarketSnapshot, NewStrategyRecord, StrategyRecord,
};

/// 심볼을 키로 하는 인메모리 시세 테이블.
#[derive(Debug, Default)]
pub struct InMemoryMarketStore {
    rows: RwLock<HashMap<String, MarketSnapshot>>,
}

impl InMemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 심볼 수.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn get_market_data(&self) -> MarketResult<Vec<MarketSnapshot>> {
        let rows = self.rows.read().await;
        let mut snapshots: Vec<MarketSnapshot> = rows.values().cloned().collect();
        snapshots.sort_by(|a, b| {
            b.last_update
                .cmp(&a.last_update)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        Ok(snapshots)
    }

    async fn get_market_data_by_symbol(&self, symbol: &str) -> MarketResult<Option<MarketSnapshot>> {
        let key = normalize_symbol(symbol);
        Ok(self.rows.read().await.get(&key).cloned())
    }

    async fn upsert_market_data(&self, update: MarketDataUpdate) -> MarketResult<MarketSnapshot> {
        let update = update.normalized();
        if update.symbol.is_empty() {
            return Err(MarketError::InvalidInput("empty symbol".to_string()));
        }

        let snapshot = update.into_snapshot(Utc::now());
        self.rows
            .write()
            .await
            .insert(snapshot.symbol.clone(), snapshot.clone());
        Ok(snapshot)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// 인메모리 전략 레코드 로그.
#[derive(Debug, Default)]
pub struct InMemoryStrategyStore {
    records: RwLock<Vec<StrategyRecord>>,
}

impl InMemoryStrategyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StrategyStore for InMemoryStrategyStore {
    async fn create_strategy_record(&self, record: NewStrategyRecord) -> MarketResult<StrategyRecord> {
        let record = record.into_record();
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_strategy_records(&self, active_only: bool) -> MarketResult<Vec<StrategyRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| !active_only || r.is_active)
            .cloned()
            .collect())
    }
}
