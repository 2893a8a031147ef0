//! WebSocket 연결 handler.
//!
//! 연결당 스냅샷 1회 전송 후 허브 틱을 그대로 중계합니다.
//! 브라우저가 보내는 메시지는 연결 종료 감지 외에는 무시합니다.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use market_core::{SharedFanoutHub, SharedMarketStore};

use super::connection::ClientConnection;
use crate::metrics::{decrement_websocket_connections, increment_websocket_connections};
use crate::state::AppState;

/// WebSocket 상태.
#[derive(Clone)]
pub struct WsState {
    /// 스냅샷 조회용 저장소
    pub store: SharedMarketStore,
    /// 실시간 틱 허브
    pub hub: SharedFanoutHub,
    /// 연결당 송신 큐 크기
    pub queue_capacity: usize,
}

impl WsState {
    pub fn new(store: SharedMarketStore, hub: SharedFanoutHub, queue_capacity: usize) -> Self {
        Self {
            store,
            hub,
            queue_capacity,
        }
    }
}

impl From<&AppState> for WsState {
    fn from(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.hub.clone(), state.client_queue_capacity)
    }
}

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let (connection, mut outbound_rx) = ClientConnection::new(state.queue_capacity);
    let connection_id = connection.id();
    info!("WebSocket connected: {}", connection_id);

    increment_websocket_connections();

    let (mut sender, mut receiver) = socket.split();

    // 송신 태스크를 먼저 띄워야 스냅샷이 큐에서 빠져나감
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            match msg.to_json() {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to serialize server message: {}", e),
            }
        }
        let _ = sender.close().await;
    });

    if let Err(e) = connection.open(state.store.as_ref(), &state.hub).await {
        warn!("WebSocket {} failed to open: {}", connection_id, e);
    }

    let receive_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Close message received from {}", connection_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = receive_task => {
            debug!("Receive task ended for connection: {}", connection_id);
        }
        _ = send_task => {
            debug!("Send task ended for connection: {}", connection_id);
        }
    }

    // 구독 해제 후 송신 큐의 Sender가 drop되면 남은 태스크도 종료됨
    connection.close();
    drop(connection);

    decrement_websocket_connections();

    info!("WebSocket disconnected: {}", connection_id);
}

/// WebSocket 라우터 생성.
///
/// 자체 `WsState`를 가지므로 어떤 상위 라우터에도 nest할 수 있습니다.
pub fn websocket_router<S>(ws_state: WsState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(websocket_handler))
        .with_state(ws_state)
}
