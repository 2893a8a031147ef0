//! # Market Core
//!
//! 실시간 시세 파이프라인의 핵심 도메인 모델 및 공용 인프라를 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 구성요소를 제공합니다:
//! - 시세 스냅샷, 정규화된 틱, 분석/전략 레코드 타입
//! - 심볼별 최신 시세 저장소 및 전략 레코드 저장소 (트레이트 + 인메모리 구현)
//! - 콜백 기반 fan-out 허브
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod store;
pub mod types;

pub use config::*;
pub use error::*;
pub use hub::{FanoutHub, SharedFanoutHub, Subscription, TickCallback};
pub use logging::*;
pub use store::{
    InMemoryMarketStore, InMemoryStrategyStore, MarketStore, SharedMarketStore,
    SharedStrategyStore, StrategyStore,
};
pub use types::*;
