//! 시세/전략 저장소 추상화.
//!
//! 피드와 폴러는 같은 upsert 계약으로 [`MarketStore`]에 씁니다.
//! 두 쓰기 경로 사이에는 우선순위가 없으며 마지막으로 도착한 쓰기가 남습니다.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MarketResult;
use crate::types::{MarketDataUpdate, MarketSnapshot, NewStrategyRecord, StrategyRecord};

pub use memory::{InMemoryMarketStore, InMemoryStrategyStore};

/// 심볼별 최신 시세 저장소.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// 모든 스냅샷 (최근 갱신 순).
    async fn get_market_data(&self) -> MarketResult<Vec<MarketSnapshot>>;

    /// 심볼 하나의 스냅샷.
    async fn get_market_data_by_symbol(&self, symbol: &str) -> MarketResult<Option<MarketSnapshot>>;

    /// 심볼 키로 전체 교체 upsert 후 저장된 스냅샷을 반환합니다.
    async fn upsert_market_data(&self, update: MarketDataUpdate) -> MarketResult<MarketSnapshot>;

    /// 여러 건을 순서대로 upsert합니다.
    async fn upsert_many(&self, updates: Vec<MarketDataUpdate>) -> MarketResult<usize> {
        let mut written = 0;
        for update in updates {
            self.upsert_market_data(update).await?;
            written += 1;
        }
        Ok(written)
    }

    /// 저장소 백엔드 이름 (헬스 체크용).
    fn backend(&self) -> &'static str;
}

/// 추가 전용 전략 레코드 저장소.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn create_strategy_record(&self, record: NewStrategyRecord) -> MarketResult<StrategyRecord>;

    /// 최근 생성 순으로 레코드를 반환합니다.
    async fn list_strategy_records(&self, active_only: bool) -> MarketResult<Vec<StrategyRecord>>;
}

pub type SharedMarketStore = Arc<dyn MarketStore>;
pub type SharedStrategyStore = Arc<dyn StrategyStore>;
