//! 브라우저 연결 하나의 생명주기.
//!
//! `Connecting → Open → Closed` 순으로만 전이하며 `Closed`는 종료 상태입니다.
//!
//! 열릴 때 저장소 스냅샷을 정확히 한 번 큐에 넣은 뒤 허브를 구독하므로,
//! 스냅샷이 항상 첫 메시지입니다. 닫힐 때는 구독을 정확히 한 번 해제합니다.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use market_core::{FanoutHub, MarketStore, Subscription};

use super::messages::{ServerMessage, WsError};
use crate::metrics::record_slow_client_drop;

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

struct Inner {
    state: ConnectionState,
    subscription: Option<Subscription>,
}

/// 브라우저 연결 관리자.
///
/// 송신은 bounded 큐를 거쳐 소켓 writer 태스크로 전달됩니다.
/// 큐가 가득 차면 해당 연결의 틱만 버려 느린 브라우저가 발행자를 막지 않게 합니다.
pub struct ClientConnection {
    id: Uuid,
    inner: Mutex<Inner>,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ClientConnection {
    /// 새 연결과 송신 큐의 수신 측을 생성합니다.
    pub fn new(queue_capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let connection = Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                subscription: None,
            }),
            outbound: tx,
        };
        (connection, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 스냅샷을 큐에 넣고 허브를 구독합니다.
    ///
    /// 스냅샷 조회가 실패하면 빈 목록을 보냅니다. 반환값은 스냅샷 행 수.
    pub async fn open(&self, store: &dyn MarketStore, hub: &FanoutHub) -> Result<usize, WsError> {
        match self.state() {
            ConnectionState::Connecting => {}
            ConnectionState::Open => return Err(WsError::AlreadyOpen),
            ConnectionState::Closed => return Err(WsError::Closed),
        }

        let snapshot = match store.get_market_data().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "Snapshot read failed, sending empty list");
                Vec::new()
            }
        };
        let rows = snapshot.len();

        self.outbound
            .send(ServerMessage::MarketData(snapshot))
            .await
            .map_err(|_| WsError::Closed)?;

        let tx = self.outbound.clone();
        let connection_id = self.id;
        let subscription = hub.subscribe(move |tick| {
            match tx.try_send(ServerMessage::MarketUpdate(tick.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    record_slow_client_drop();
                    debug!(connection_id = %connection_id, symbol = %tick.symbol, "Client queue full, tick dropped");
                }
                // 연결이 이미 사라짐
                Err(TrySendError::Closed(_)) => {}
            }
        });

        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            // 스냅샷 전송 도중 닫힘
            subscription.unsubscribe();
            return Err(WsError::Closed);
        }
        inner.subscription = Some(subscription);
        inner.state = ConnectionState::Open;
        debug!(connection_id = %self.id, rows, "Client connection open");
        Ok(rows)
    }

    /// 연결을 닫고 구독을 해제합니다. 이번 호출에서 닫혔으면 `true`.
    pub fn close(&self) -> bool {
        let subscription = {
            let mut inner = self.lock();
            if inner.state == ConnectionState::Closed {
                return false;
            }
            inner.state = ConnectionState::Closed;
            inner.subscription.take()
        };

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        debug!(connection_id = %self.id, "Client connection closed");
        true
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{InMemoryMarketStore, MarketDataUpdate, NormalizedTick};
    use rust_decimal_macros::dec;

    fn tick(symbol: &str) -> NormalizedTick {
        NormalizedTick {
            symbol: symbol.to_string(),
            price: dec!(65247.50),
            change_percent: dec!(2.45),
            volume: dec!(100),
            high_24h: dec!(66000),
            low_24h: dec!(64000),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_snapshot_then_stream() {
        let store = InMemoryMarketStore::new();
        store
            .upsert_market_data(MarketDataUpdate::from(&tick("BTCUSDT")))
            .await
            .unwrap();
        let hub = FanoutHub::new();

        let (connection, mut rx) = ClientConnection::new(16);
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(connection.open(&store, &hub).await.unwrap(), 1);
        assert_eq!(connection.state(), ConnectionState::Open);

        hub.publish(&tick("ETHUSDT"));

        match rx.recv().await.unwrap() {
            ServerMessage::MarketData(rows) => assert_eq!(rows[0].symbol, "BTCUSDT"),
            other => panic!("expected snapshot first, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ServerMessage::MarketUpdate(t) => assert_eq!(t.symbol, "ETHUSDT"),
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_unsubscribes_exactly_once() {
        let store = InMemoryMarketStore::new();
        let hub = FanoutHub::new();
        let (connection, mut rx) = ClientConnection::new(4);
        connection.open(&store, &hub).await.unwrap();
        assert_eq!(hub.subscriber_count(), 1);

        assert!(connection.close());
        assert!(!connection.close());
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(connection.state(), ConnectionState::Closed);

        // 닫힌 뒤 발행된 틱은 전달되지 않음
        assert_eq!(hub.publish(&tick("BTCUSDT")), 0);
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::MarketData(_))));
        assert!(rx.try_recv().is_err());
        assert!(matches!(connection.open(&store, &hub).await, Err(WsError::Closed)));
    }

    #[tokio::test]
    async fn test_full_queue_drops_ticks_without_blocking() {
        let store = InMemoryMarketStore::new();
        let hub = FanoutHub::new();
        let (connection, mut rx) = ClientConnection::new(2);
        connection.open(&store, &hub).await.unwrap();

        // 스냅샷 1개 + 틱 1개로 큐가 가득 참
        for _ in 0..5 {
            hub.publish(&tick("BTCUSDT"));
        }

        assert!(matches!(rx.recv().await, Some(ServerMessage::MarketData(_))));
        assert!(matches!(rx.recv().await, Some(ServerMessage::MarketUpdate(_))));
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_makes_publish_noop() {
        let store = InMemoryMarketStore::new();
        let hub = FanoutHub::new();
        let (connection, rx) = ClientConnection::new(4);
        connection.open(&store, &hub).await.unwrap();
        drop(rx);

        // 연결이 사라져도 발행은 성공 (콜백은 no-op)
        assert_eq!(hub.publish(&tick("BTCUSDT")), 1);
        drop(connection);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
