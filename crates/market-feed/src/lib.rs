//! # Market Feed
//!
//! 거래소 시세 수집 계층.
//!
//! - [`UpstreamFeedClient`]: combined ticker stream WebSocket 하나를 유지하며
//!   프레임을 저장소와 허브로 전달
//! - [`PollingRefresher`]: 주기적 REST 24시간 티커 조회 (보조 경로)
//! - [`TickerClient`]: 단건 REST 티커 조회 (분석 시 시세 보강에도 사용)

pub mod backoff;
pub mod binance;
pub mod error;
pub mod feed;
pub mod poller;

pub use backoff::ReconnectPolicy;
pub use binance::{combined_stream_url, parse_combined_frame, TickerClient};
pub use error::{FeedError, FeedResult};
pub use feed::{FeedStatus, UpstreamFeedClient};
pub use poller::{PollingRefresher, RefreshStats};
