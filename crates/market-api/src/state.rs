//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! 파이프라인 구성요소는 `main`에서 한 번 만들어져 Arc 핸들로 공유됩니다.

use std::sync::Arc;

use market_core::{
    FanoutHub, InMemoryMarketStore, InMemoryStrategyStore, SharedFanoutHub, SharedMarketStore,
    SharedStrategyStore,
};
use market_feed::{PollingRefresher, UpstreamFeedClient};

use crate::services::{AnalysisScheduler, AnalysisService};

/// 연결당 송신 큐 기본 크기.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 심볼별 최신 시세 저장소
    pub store: SharedMarketStore,

    /// 전략 레코드 저장소
    pub strategies: SharedStrategyStore,

    /// 실시간 틱 허브
    pub hub: SharedFanoutHub,

    /// 분석 서비스 (스케줄러와 on-demand 요청이 공유)
    pub analysis: Arc<AnalysisService>,

    /// 업스트림 WebSocket 피드
    pub feed: Option<Arc<UpstreamFeedClient>>,

    /// REST 폴링 갱신기
    pub poller: Option<Arc<PollingRefresher>>,

    /// 주기 분석 스케줄러
    pub scheduler: Option<Arc<AnalysisScheduler>>,

    /// 데이터베이스 연결 풀 (PostgreSQL)
    pub db_pool: Option<sqlx::PgPool>,

    /// 브라우저 연결당 송신 큐 크기
    pub client_queue_capacity: usize,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    pub fn new(
        store: SharedMarketStore,
        strategies: SharedStrategyStore,
        hub: SharedFanoutHub,
        analysis: Arc<AnalysisService>,
    ) -> Self {
        Self {
            store,
            strategies,
            hub,
            analysis,
            feed: None,
            poller: None,
            scheduler: None,
            db_pool: None,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 메모리 저장소와 미설정 분석 서비스로 상태를 생성합니다.
    pub fn in_memory() -> Self {
        let store: SharedMarketStore = Arc::new(InMemoryMarketStore::new());
        let strategies: SharedStrategyStore = Arc::new(InMemoryStrategyStore::new());
        let analysis = Arc::new(AnalysisService::new(None, store.clone(), strategies.clone()));
        Self::new(store, strategies, FanoutHub::shared(), analysis)
    }

    pub fn with_feed(mut self, feed: Arc<UpstreamFeedClient>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_poller(mut self, poller: Arc<PollingRefresher>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<AnalysisScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// 데이터베이스 연결 풀 설정.
    pub fn with_db_pool(mut self, pool: sqlx::PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn with_client_queue_capacity(mut self, capacity: usize) -> Self {
        self.client_queue_capacity = capacity.max(1);
        self
    }

    /// 서버 업타임(초) 반환.
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    /// 데이터베이스 연결 상태 확인.
    pub async fn is_db_healthy(&self) -> bool {
        if let Some(pool) = &self.db_pool {
            sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
        } else {
            false
        }
    }

    /// 파이프라인 구성요소의 종료를 요청하고 태스크가 끝날 때까지 기다립니다.
    pub async fn shutdown_components(&self) {
        if let Some(feed) = &self.feed {
            feed.stop();
        }
        if let Some(poller) = &self.poller {
            poller.stop();
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }

        if let Some(feed) = &self.feed {
            feed.join().await;
        }
        if let Some(poller) = &self.poller {
            poller.join().await;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.join().await;
        }
    }
}
