//! # Market API
//!
//! 시세 파이프라인의 외부 표면.
//!
//! - `/ws`: 브라우저 WebSocket (스냅샷 1회 후 실시간 틱 스트림)
//! - `/api/*`: 시세 조회, AI 분석 요청, 전략 신호 조회
//! - `/health`, `/metrics`: 운영용 엔드포인트
//!
//! 주기적 AI 분석 스케줄러와 PostgreSQL 저장소 구현도 이 크레이트에 있습니다.

pub mod error;
pub mod metrics;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;

pub use state::AppState;
