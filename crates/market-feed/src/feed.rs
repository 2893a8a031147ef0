//! 업스트림 거래소 WebSocket 피드 클라이언트.
//!
//! combined ticker stream 하나에 연결하여 프레임마다
//! 1) 저장소 upsert를 별도 태스크로 던지고 (완료를 기다리지 않음)
//! 2) fan-out 허브로 발행합니다.
//!
//! 연결이 끊기면 선형 백오프로 재연결하며, 한도를 넘으면 에러 로그를 남기고
//! 피드만 중단됩니다 (프로세스는 계속 동작).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use market_core::{
    FeedConfig, MarketDataUpdate, NormalizedTick, SharedFanoutHub, SharedMarketStore,
};

use crate::backoff::ReconnectPolicy;
use crate::binance::{combined_stream_url, parse_combined_frame};
use crate::error::{FeedError, FeedResult};

/// 피드 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    /// 아직 시작되지 않음
    Idle,
    Connecting,
    Connected,
    /// 재연결 대기 중
    Reconnecting { attempt: u32 },
    /// 재연결 한도 초과로 영구 중단
    Failed,
    /// stop()으로 정상 종료
    Stopped,
}

impl FeedStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, FeedStatus::Connected)
    }
}

/// 한 번의 연결 세션이 끝난 이유.
enum SessionEnd {
    /// 서버 종료 또는 스트림 끝
    Closed,
    /// 종료 토큰 취소
    Shutdown,
}

/// 업스트림 WebSocket 피드 클라이언트.
pub struct UpstreamFeedClient {
    config: FeedConfig,
    store: SharedMarketStore,
    hub: SharedFanoutHub,
    started: AtomicBool,
    shutdown: CancellationToken,
    status: watch::Sender<FeedStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UpstreamFeedClient {
    /// 새 피드 클라이언트 생성.
    pub fn new(config: FeedConfig, store: SharedMarketStore, hub: SharedFanoutHub) -> Self {
        let (status, _) = watch::channel(FeedStatus::Idle);
        Self {
            config,
            store,
            hub,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            status,
            task: Mutex::new(None),
        }
    }

    /// 상위 종료 토큰에 연결합니다. 상위가 취소되면 피드도 멈춥니다.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    /// 연결 태스크를 시작합니다. 두 번째 호출부터는 아무 일도 하지 않고 `false`.
    pub fn initialize(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("Upstream feed already initialized");
            return false;
        }
        if self.shutdown.is_cancelled() {
            warn!("Upstream feed stopped before initialization");
            return false;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// 피드를 중단합니다. 여러 번 호출해도 안전하며, 시작 전에도 호출할 수 있습니다.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        if !self.started.load(Ordering::Acquire) {
            self.status.send_replace(FeedStatus::Stopped);
        }
        info!("Upstream feed stop requested");
    }

    /// 연결 태스크가 끝날 때까지 기다립니다.
    pub async fn join(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Upstream feed task ended abnormally");
            }
        }
    }

    pub fn status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    /// 상태 변화를 구독합니다.
    pub fn watch_status(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    pub fn stream_url(&self) -> String {
        combined_stream_url(&self.config.ws_base_url, &self.config.symbols)
    }

    /// 텍스트 프레임 하나를 처리합니다.
    ///
    /// 잘못된 프레임은 로그를 남기고 버립니다 (연결은 유지).
    /// 저장은 기다리지 않으며, 저장 실패와 무관하게 틱은 발행됩니다.
    pub fn ingest_frame(&self, text: &str) -> Option<NormalizedTick> {
        let tick = match parse_combined_frame(text) {
            Ok(tick) => tick,
            Err(e) => {
                counter!("market_ticks_dropped_total", "reason" => "malformed").increment(1);
                warn!(error = %e, "Dropping malformed upstream frame");
                return None;
            }
        };

        counter!("market_ticks_total", "source" => "feed").increment(1);

        let store = Arc::clone(&self.store);
        let update = MarketDataUpdate::from(&tick);
        tokio::spawn(async move {
            let symbol = update.symbol.clone();
            if let Err(e) = store.upsert_market_data(update).await {
                warn!(symbol = %symbol, error = %e, "Failed to persist tick");
            }
        });

        let delivered = self.hub.publish(&tick);
        debug!(symbol = %tick.symbol, delivered, "Tick published");
        Some(tick)
    }

    fn set_status(&self, status: FeedStatus) {
        self.status.send_replace(status);
    }

    /// 메인 루프: 연결 → 수신 → 끊기면 백오프 후 재연결.
    async fn run(self: Arc<Self>) {
        let url = self.stream_url();
        let mut policy = ReconnectPolicy::new(
            self.config.reconnect_interval(),
            self.config.max_reconnect_attempts,
        );

        info!(
            symbols = self.config.symbols.len(),
            url = %url,
            "Upstream feed starting"
        );

        loop {
            self.set_status(FeedStatus::Connecting);

            match self.connect_and_listen(&url, &mut policy).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => info!("Upstream feed connection closed"),
                Err(e) => warn!(error = %e, "Upstream feed connection failed"),
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            let Some(delay) = policy.next_delay() else {
                error!(
                    attempts = policy.max_attempts(),
                    "Max reconnect attempts exceeded, upstream feed permanently down"
                );
                self.set_status(FeedStatus::Failed);
                return;
            };

            let attempt = policy.attempts();
            counter!("feed_reconnects_total").increment(1);
            self.set_status(FeedStatus::Reconnecting { attempt });
            warn!(
                attempt,
                max_attempts = policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting upstream feed"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_status(FeedStatus::Stopped);
        info!("Upstream feed stopped");
    }

    /// 연결 하나를 열고 끊길 때까지 프레임을 처리합니다.
    async fn connect_and_listen(
        &self,
        url: &str,
        policy: &mut ReconnectPolicy,
    ) -> FeedResult<SessionEnd> {
        let connect_timeout = self.config.connect_timeout();
        let (ws_stream, _) = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            result = tokio::time::timeout(connect_timeout, connect_async(url)) => match result {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(FeedError::Timeout(format!(
                        "connect timed out after {}ms",
                        connect_timeout.as_millis()
                    )))
                }
            },
        };

        policy.reset();
        self.set_status(FeedStatus::Connected);
        info!("Upstream feed connected");

        let (mut write, mut read) = ws_stream.split();

        let ping_every = self.config.ping_interval();
        let mut ping_interval = interval_at(Instant::now() + ping_every, ping_every);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    return Ok(SessionEnd::Shutdown);
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.ingest_frame(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Ping received, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!(?frame, "Upstream closed the connection");
                            return Ok(SessionEnd::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(SessionEnd::Closed),
                    }
                }
                _ = ping_interval.tick() => {
                    debug!("Ping sent");
                    write.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{FanoutHub, InMemoryMarketStore, MarketStore};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn client(store: Arc<InMemoryMarketStore>, hub: SharedFanoutHub) -> Arc<UpstreamFeedClient> {
        let config = FeedConfig {
            symbols: vec!["BTCUSDT".to_string()],
            ..Default::default()
        };
        Arc::new(UpstreamFeedClient::new(config, store, hub))
    }

    async fn wait_for_row(store: &InMemoryMarketStore, symbol: &str) -> Option<market_core::MarketSnapshot> {
        for _ in 0..50 {
            if let Some(row) = store.get_market_data_by_symbol(symbol).await.unwrap() {
                return Some(row);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_ingest_frame_persists_and_publishes() {
        let store = Arc::new(InMemoryMarketStore::new());
        let hub = FanoutHub::shared();
        let feed = client(store.clone(), hub.clone());

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let _sub = hub.subscribe(move |tick| sink.lock().unwrap().push(tick.clone()));

        let tick = feed
            .ingest_frame(
                r#"{"stream":"btcusdt@ticker","data":{"s":"BTCUSDT","c":"65247.50","P":"2.45","v":"100","h":"66000","l":"64000"}}"#,
            )
            .unwrap();
        assert_eq!(tick.price, dec!(65247.50));

        let row = wait_for_row(&store, "BTCUSDT").await.unwrap();
        assert_eq!(row.price.to_string(), "65247.50");

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].price, dec!(65247.50));
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped() {
        let store = Arc::new(InMemoryMarketStore::new());
        let hub = FanoutHub::shared();
        let feed = client(store.clone(), hub.clone());
        let received = Arc::new(Mutex::new(0usize));
        let sink = received.clone();
        let _sub = hub.subscribe(move |_| *sink.lock().unwrap() += 1);

        assert!(feed
            .ingest_frame(r#"{"data":{"s":"BTCUSDT","c":"oops","P":"1","v":"1","h":"1","l":"1"}}"#)
            .is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.is_empty().await);
        assert_eq!(*received.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_initialize_is_safe() {
        let feed = client(Arc::new(InMemoryMarketStore::new()), FanoutHub::shared());
        feed.stop();
        feed.stop();

        assert_eq!(feed.status(), FeedStatus::Stopped);
        assert!(!feed.initialize());
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // 연결은 받지만 핸드셰이크에 응답하지 않는 서버
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = FeedConfig {
            ws_base_url: format!("ws://{}", addr),
            symbols: vec!["BTCUSDT".to_string()],
            reconnect_interval_ms: 50,
            max_reconnect_attempts: 0,
            ..Default::default()
        };
        let feed = Arc::new(UpstreamFeedClient::new(
            config,
            Arc::new(InMemoryMarketStore::new()),
            FanoutHub::shared(),
        ));
        assert!(feed.initialize());

        let mut status = feed.watch_status();
        let failed = tokio::time::timeout(Duration::from_secs(2), async {
            while *status.borrow_and_update() != FeedStatus::Failed {
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        assert!(failed.is_ok(), "feed stuck in handshake");
        assert_eq!(feed.status(), FeedStatus::Failed);
        feed.stop();
        server.abort();
    }

    #[tokio::test]
    async fn test_stream_url_from_config() {
        let feed = client(Arc::new(InMemoryMarketStore::new()), FanoutHub::shared());
        assert_eq!(
            feed.stream_url(),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@ticker"
        );
    }
}
