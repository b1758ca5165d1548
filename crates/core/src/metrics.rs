//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `signpost_`
//! - 모듈명: `listener_`, `router_`, `dispatch_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 토픽 레이블 키
pub const LABEL_TOPIC: &str = "topic";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Listener 메트릭 ───────────────────────────────────────────────

/// Listener: 수락한 전체 연결 수 (counter)
pub const LISTENER_CONNECTIONS_TOTAL: &str = "signpost_listener_connections_total";

/// Listener: 현재 활성 연결 수 (gauge)
pub const LISTENER_CONNECTIONS_ACTIVE: &str = "signpost_listener_connections_active";

/// Listener: 수신한 전체 라인 수 (counter)
pub const LISTENER_LINES_TOTAL: &str = "signpost_listener_lines_total";

// ─── Router 메트릭 ─────────────────────────────────────────────────

/// Router: 평가를 거친 전체 레코드 수 (counter)
pub const ROUTER_RECORDS_TOTAL: &str = "signpost_router_records_total";

/// Router: syslog 파싱에 실패하여 msg-only로 강등된 레코드 수 (counter)
pub const ROUTER_PARSE_FALLBACKS_TOTAL: &str = "signpost_router_parse_fallbacks_total";

/// Router: 규칙 매칭 수 (counter)
pub const ROUTER_RULE_MATCHES_TOTAL: &str = "signpost_router_rule_matches_total";

/// Router: 레코드 한 건의 평가 소요 시간 (histogram, 초)
pub const ROUTER_EVALUATE_DURATION_SECONDS: &str = "signpost_router_evaluate_duration_seconds";

// ─── Dispatcher 메트릭 ─────────────────────────────────────────────

/// Dispatcher: 수락된 제출 수 (counter)
pub const DISPATCH_SUBMITTED_TOTAL: &str = "signpost_dispatch_submitted_total";

/// Dispatcher: 종료 이후 거부된 제출 수 (counter)
pub const DISPATCH_REJECTED_TOTAL: &str = "signpost_dispatch_rejected_total";

/// Dispatcher: 현재 버퍼에 있는 envelope 수 (gauge)
pub const DISPATCH_QUEUE_DEPTH: &str = "signpost_dispatch_queue_depth";

/// Dispatcher: 싱크로 전달 완료된 envelope 수 (counter, label: topic)
pub const DISPATCH_DELIVERED_TOTAL: &str = "signpost_dispatch_delivered_total";

/// Dispatcher: 전달 재시도 수 (counter)
pub const DISPATCH_RETRIES_TOTAL: &str = "signpost_dispatch_retries_total";

/// Dispatcher: 복구 불가로 유실 처리된 envelope 수 (counter)
pub const DISPATCH_FAILED_TOTAL: &str = "signpost_dispatch_failed_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "signpost_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "signpost_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 규칙 평가 지연 시간 히스토그램 버킷 (초)
///
/// 10us ~ 1s 범위, 로그 단위 분포
pub const EVALUATE_DURATION_BUCKETS: [f64; 9] = [
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1, 1.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다. 일반적으로
/// `signpost-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Listener
    describe_counter!(
        LISTENER_CONNECTIONS_TOTAL,
        "Total number of accepted listener connections"
    );
    describe_gauge!(
        LISTENER_CONNECTIONS_ACTIVE,
        "Number of currently active listener connections"
    );
    describe_counter!(
        LISTENER_LINES_TOTAL,
        "Total number of log lines received across all connections"
    );

    // Router
    describe_counter!(
        ROUTER_RECORDS_TOTAL,
        "Total number of records evaluated against the rule set"
    );
    describe_counter!(
        ROUTER_PARSE_FALLBACKS_TOTAL,
        "Total number of lines that failed syslog parsing and were demoted to msg-only records"
    );
    describe_counter!(
        ROUTER_RULE_MATCHES_TOTAL,
        "Total number of rule matches"
    );
    describe_histogram!(
        ROUTER_EVALUATE_DURATION_SECONDS,
        "Time to evaluate a single record against the rule set in seconds"
    );

    // Dispatcher
    describe_counter!(
        DISPATCH_SUBMITTED_TOTAL,
        "Total number of envelopes admitted to the dispatch buffer"
    );
    describe_counter!(
        DISPATCH_REJECTED_TOTAL,
        "Total number of submissions rejected after shutdown was signaled"
    );
    describe_gauge!(
        DISPATCH_QUEUE_DEPTH,
        "Current number of envelopes held by the dispatcher"
    );
    describe_counter!(
        DISPATCH_DELIVERED_TOTAL,
        "Total number of envelopes delivered to the sink"
    );
    describe_counter!(
        DISPATCH_RETRIES_TOTAL,
        "Total number of sink delivery retries"
    );
    describe_counter!(
        DISPATCH_FAILED_TOTAL,
        "Total number of envelopes abandoned after exhausting delivery retries"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Signpost daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
