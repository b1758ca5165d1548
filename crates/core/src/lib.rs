#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, PipelineError, SignpostError};

// 설정
pub use config::Settings;

// 레코드
pub use record::{DispatchEnvelope, Record};

// trait 확장 포인트
pub use pipeline::{HealthStatus, RecordParser};
