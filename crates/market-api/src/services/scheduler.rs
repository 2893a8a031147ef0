//! 주기적 AI 분석 스케줄러.
//!
//! 고정된 심볼 집합을 주기마다 동시에 분석하여 전략 레코드를 남깁니다.
//! 첫 실행은 시작 후 한 주기가 지난 뒤입니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use market_core::normalize_symbol;

use super::analysis::AnalysisService;

/// 분석 주기 실행기.
pub struct AnalysisScheduler {
    service: Arc<AnalysisService>,
    symbols: Vec<String>,
    period: Duration,
    started: AtomicBool,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisScheduler {
    pub fn new(service: Arc<AnalysisService>, symbols: Vec<String>, period: Duration) -> Self {
        Self {
            service,
            symbols: symbols
                .iter()
                .map(|s| normalize_symbol(s))
                .filter(|s| !s.is_empty())
                .collect(),
            period,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// 상위 종료 토큰에 연결합니다.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// 타이머를 시작합니다. 이미 시작되었거나 중단되었으면 `false`.
    pub fn initialize(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::AcqRel) || self.shutdown.is_cancelled() {
            return false;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_timer().await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            symbols = ?self.symbols,
            interval_secs = self.period.as_secs(),
            "Analysis scheduler started"
        );
        true
    }

    /// 타이머를 멈춥니다. 진행 중인 주기는 끝까지 실행됩니다.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        info!("Analysis scheduler stop requested");
    }

    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Analysis scheduler task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }

    async fn run_timer(self: Arc<Self>) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Analysis scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// 모든 심볼을 동시에 분석합니다. 반환값은 레코드가 저장된 심볼 수.
    pub async fn run_cycle(&self) -> usize {
        let results = join_all(
            self.symbols
                .iter()
                .map(|symbol| self.service.analyze_symbol(symbol)),
        )
        .await;

        let mut recorded = 0;
        for (symbol, result) in self.symbols.iter().zip(results) {
            match result {
                Ok(record) => {
                    recorded += 1;
                    debug!(symbol = %symbol, signal = %record.signal, "Scheduled analysis recorded");
                }
                Err(e) => error!(symbol = %symbol, error = %e, "Scheduled analysis failed"),
            }
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{InMemoryMarketStore, InMemoryStrategyStore, StrategyStore};

    fn scheduler(strategies: Arc<InMemoryStrategyStore>, period: Duration) -> Arc<AnalysisScheduler> {
        let service = AnalysisService::new(None, Arc::new(InMemoryMarketStore::new()), strategies);
        Arc::new(AnalysisScheduler::new(
            Arc::new(service),
            vec!["btcusdt".into(), "ETHUSDT".into(), " ".into(), "BNBUSDT".into()],
            period,
        ))
    }

    #[tokio::test]
    async fn test_cycle_records_every_symbol() {
        let strategies = Arc::new(InMemoryStrategyStore::new());
        let scheduler = scheduler(strategies.clone(), Duration::from_secs(300));
        assert_eq!(scheduler.symbols(), ["BTCUSDT", "ETHUSDT", "BNBUSDT"]);

        assert_eq!(scheduler.run_cycle().await, 3);
        assert_eq!(strategies.list_strategy_records(true).await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_after_one_period() {
        let strategies = Arc::new(InMemoryStrategyStore::new());
        let scheduler = scheduler(strategies.clone(), Duration::from_secs(300));
        assert!(scheduler.initialize());
        assert!(!scheduler.initialize());

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(strategies.list_strategy_records(true).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(strategies.list_strategy_records(true).await.unwrap().len(), 3);

        scheduler.stop();
        scheduler.stop();
        scheduler.join().await;
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_stop_without_start() {
        let strategies = Arc::new(InMemoryStrategyStore::new());
        let scheduler = scheduler(strategies, Duration::from_secs(1));
        scheduler.stop();
        assert!(!scheduler.initialize());
    }
}
