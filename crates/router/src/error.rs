//! 라우터 파이프라인 에러 타입
//!
//! [`RouterError`]는 규칙 컴파일, 파싱, 리스너, 디스패처 등 파이프라인
//! 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<RouterError> for SignpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use signpost_core::error::{PipelineError, SignpostError};

/// 라우터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// 매처 표현식 컴파일 실패
    #[error("invalid {kind} expression '{expression}': {reason}")]
    InvalidExpression {
        /// 표현식 종류 (jmespath, regex)
        kind: String,
        /// 문제가 된 표현식
        expression: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rules[{rule}]: {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 인덱스 (설정 순서 기준)
        rule: usize,
        /// 검증 실패 사유
        reason: String,
    },

    /// 로그 파싱 실패
    #[error("parse error: {format} at offset {offset}: {reason}")]
    Parse {
        /// 파서 형식 (syslog 등)
        format: String,
        /// 실패 위치 (바이트 오프셋)
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 리스너 에러 (바인드 실패, TLS 자료 로딩 실패 등)
    #[error("listener error: {reason}")]
    Listener {
        /// 에러 사유
        reason: String,
    },

    /// 디스패처 에러
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 디스패처 제출 에러
///
/// `submit` 호출자가 보는 유일한 에러 표면입니다. 싱크/연결 수준의
/// 에러는 드레인 태스크 내부에서 복구되며 여기로 노출되지 않습니다.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    /// 종료 신호 이후의 제출 시도
    #[error("submission rejected: shutdown in progress")]
    ShutdownInProgress,

    /// 큐가 닫힘 (드레인 태스크 소멸)
    #[error("dispatch queue closed")]
    Closed,
}

/// 싱크 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 클라이언트 생성/설정 실패
    #[error("sink config error: {reason}")]
    Config {
        /// 실패 사유
        reason: String,
    },

    /// 전달 실패 (브로커 일시 장애 포함)
    #[error("delivery to '{topic}' failed: {reason}")]
    Delivery {
        /// 목적지 토픽
        topic: String,
        /// 실패 사유
        reason: String,
    },
}

impl From<RouterError> for SignpostError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::Dispatch(DispatchError::ShutdownInProgress) => {
                SignpostError::Pipeline(PipelineError::ShutdownInProgress)
            }
            other => SignpostError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
