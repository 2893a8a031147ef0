//! 브라우저용 실시간 시세 WebSocket 서버.
//!
//! # 메시지 형식
//!
//! 서버 → 클라이언트 단방향입니다.
//!
//! ```json
//! {"type": "market_data", "data": [...]}
//! {"type": "market_update", "data": {...}}
//! ```
//!
//! 연결 직후 `market_data` 스냅샷이 정확히 한 번 전송되고,
//! 이후 허브에 발행되는 틱마다 `market_update`가 전송됩니다.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{ClientConnection, ConnectionState};
pub use handler::{websocket_handler, websocket_router, WsState};
pub use messages::{ServerMessage, WsError};
