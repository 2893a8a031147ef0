//! 백그라운드 서비스 모듈.
//!
//! AI 분석 서비스와 주기 스케줄러를 제공합니다.

pub mod analysis;
pub mod scheduler;

pub use analysis::{
    build_prompt, parse_analysis, AnalysisError, AnalysisProvider, AnalysisService,
    OpenRouterClient, ParseQuality,
};
pub use scheduler::AnalysisScheduler;
