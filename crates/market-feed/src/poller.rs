//! REST 폴링 기반 보조 시세 갱신.
//!
//! WebSocket 피드와 별개로 주기마다 심볼별 24시간 티커를 조회하여
//! 저장소에 upsert합니다. 심볼 하나의 실패는 다른 심볼에 영향을 주지 않습니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use market_core::{PollingConfig, SharedMarketStore};

use crate::binance::TickerClient;
use crate::error::FeedResult;

/// 한 번의 갱신 주기 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// 주기적 REST 갱신기.
pub struct PollingRefresher {
    config: PollingConfig,
    client: TickerClient,
    store: SharedMarketStore,
    started: AtomicBool,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollingRefresher {
    /// 설정으로부터 갱신기를 생성합니다.
    pub fn new(config: PollingConfig, store: SharedMarketStore) -> FeedResult<Self> {
        let client = TickerClient::new(config.rest_base_url.clone(), config.request_timeout())?;
        Ok(Self::with_client(config, client, store))
    }

    pub fn with_client(config: PollingConfig, client: TickerClient, store: SharedMarketStore) -> Self {
        Self {
            config,
            client,
            store,
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

    /// 즉시 한 주기를 실행한 뒤 반복 타이머를 시작합니다.
    ///
    /// 이미 시작되었거나 중단된 경우 `None`.
    pub async fn initialize(self: &Arc<Self>) -> Option<RefreshStats> {
        if self.started.swap(true, Ordering::AcqRel) || self.shutdown.is_cancelled() {
            return None;
        }

        let stats = self.refresh_all().await;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_timer().await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            symbols = self.config.symbols.len(),
            interval_secs = self.config.interval_secs,
            "Polling refresher started"
        );
        Some(stats)
    }

    /// 타이머를 멈춥니다. 진행 중인 주기는 끝까지 실행되고, 새 주기는 시작하지 않습니다.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        info!("Polling refresher stop requested");
    }

    /// 타이머 태스크가 끝날 때까지 기다립니다.
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Polling task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }

    async fn run_timer(self: Arc<Self>) {
        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Polling refresher stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.refresh_all().await;
                }
            }
        }
    }

    /// 모든 심볼을 동시에 조회하여 저장합니다.
    pub async fn refresh_all(&self) -> RefreshStats {
        let results = join_all(
            self.config
                .symbols
                .iter()
                .map(|symbol| self.refresh_symbol(symbol)),
        )
        .await;

        let mut stats = RefreshStats::default();
        for (symbol, result) in self.config.symbols.iter().zip(results) {
            match result {
                Ok(()) => {
                    stats.succeeded += 1;
                    counter!("poller_fetch_total", "result" => "ok").increment(1);
                }
                Err(e) => {
                    stats.failed += 1;
                    counter!("poller_fetch_total", "result" => "error").increment(1);
                    warn!(symbol = %symbol, error = %e, "Failed to refresh ticker");
                }
            }
        }

        debug!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Polling cycle completed"
        );
        stats
    }

    async fn refresh_symbol(&self, symbol: &str) -> FeedResult<()> {
        let update = self.client.fetch_24h_ticker(symbol).await?;
        self.store.upsert_market_data(update).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{InMemoryMarketStore, MarketStore};
    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn ticker_body(symbol: &str, price: &str) -> String {
        format!(
            r#"{{"symbol":"{symbol}","lastPrice":"{price}","priceChangePercent":"1.25","volume":"1000","highPrice":"{price}","lowPrice":"{price}"}}"#
        )
    }

    fn refresher(base_url: String, symbols: &[&str], store: Arc<InMemoryMarketStore>) -> Arc<PollingRefresher> {
        let config = PollingConfig {
            rest_base_url: base_url,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            interval_secs: 3600,
            request_timeout_secs: 5,
            ..Default::default()
        };
        Arc::new(PollingRefresher::new(config, store).unwrap())
    }

    #[tokio::test]
    async fn test_one_failing_symbol_does_not_block_others() {
        let mut server = mockito::Server::new_async().await;
        let _btc = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(ticker_body("BTCUSDT", "65000.10"))
            .create_async()
            .await;
        let _eth = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(Matcher::UrlEncoded("symbol".into(), "ETHUSDT".into()))
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let store = Arc::new(InMemoryMarketStore::new());
        let poller = refresher(server.url(), &["BTCUSDT", "ETHUSDT"], store.clone());

        let stats = poller.refresh_all().await;

        assert_eq!(stats, RefreshStats { succeeded: 1, failed: 1 });
        let btc = store.get_market_data_by_symbol("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(btc.price, dec!(65000.10));
        assert!(store.get_market_data_by_symbol("ETHUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_runs_immediate_cycle_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/24hr")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BNBUSDT".into()))
            .with_status(200)
            .with_body(ticker_body("BNBUSDT", "320.5"))
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(InMemoryMarketStore::new());
        let poller = refresher(server.url(), &["BNBUSDT"], store.clone());

        let stats = poller.initialize().await;
        assert_eq!(stats, Some(RefreshStats { succeeded: 1, failed: 0 }));
        assert!(poller.is_running());

        // 두 번째 초기화는 무시됨
        assert_eq!(poller.initialize().await, None);

        poller.stop();
        poller.stop();
        tokio::time::timeout(Duration::from_secs(2), poller.join())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let store = Arc::new(InMemoryMarketStore::new());
        let poller = refresher("http://127.0.0.1:9".to_string(), &["BTCUSDT"], store);

        poller.stop();
        poller.join().await;
        assert!(!poller.is_running());
        assert_eq!(poller.initialize().await, None);
    }
}
