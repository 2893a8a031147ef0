//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! 파이프라인 카운터(`market_ticks_total`, `feed_reconnects_total`,
//! `poller_fetch_total` 등)는 각 크레이트에서 `metrics` 매크로로 기록되고,
//! 여기서 설치한 레코더를 통해 `/metrics`로 노출됩니다.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설치하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

// ============================================================================
// WebSocket 메트릭
// ============================================================================

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections() {
    gauge!("websocket_connections_active").increment(1.0);
    counter!("websocket_connections_total").increment(1);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections() {
    gauge!("websocket_connections_active").decrement(1.0);
}

/// 느린 클라이언트로 인해 버려진 틱.
pub fn record_slow_client_drop() {
    counter!("market_ticks_dropped_total", "reason" => "slow_client").increment(1);
}

// ============================================================================
// 분석 메트릭
// ============================================================================

/// 분석 실행 결과 기록 ("ok" | "degraded" | "fallback" | "error").
pub fn record_analysis_run(result: &'static str) {
    counter!("analysis_runs_total", "result" => result).increment(1);
}
