//! 설정 관리 — signpost.yml 파싱 및 유효성 검증
//!
//! [`Settings`]는 데몬 전체의 설정을 담는 최상위 구조체입니다.
//! 설정 문서는 YAML이며, 규칙 목록은 문서에 나열된 순서 그대로
//! 평가 순서가 됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SIGNPOST_LISTEN_PORT=1514` 형식)
//! 3. 설정 파일 (`signpost.yml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), signpost_core::error::SignpostError> {
//! use signpost_core::config::Settings;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let settings = Settings::load("signpost.yml").await?;
//!
//! // YAML 문자열에서 직접 파싱
//! let settings = Settings::parse("global:\n  kafka:\n    topic: logs")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SignpostError};

/// Signpost 통합 설정
///
/// `signpost.yml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// 전역 설정
    #[serde(default)]
    pub global: GlobalConfig,
    /// 평가 순서대로 나열된 규칙 목록
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Settings {
    /// YAML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SignpostError> {
        let mut settings = Self::from_file(path).await?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// YAML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SignpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SignpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SignpostError::Io(e)
            }
        })?;
        let settings = Self::parse(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// YAML 문자열에서 설정을 파싱합니다.
    pub fn parse(yaml_str: &str) -> Result<Self, SignpostError> {
        serde_yaml::from_str(yaml_str).map_err(|e| {
            SignpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SIGNPOST_{SECTION}_{FIELD}`
    /// 예: `SIGNPOST_LISTEN_PORT=1514`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.global.log.level, "SIGNPOST_LOG_LEVEL");
        override_string(&mut self.global.log.format, "SIGNPOST_LOG_FORMAT");
        override_string(&mut self.global.listen.address, "SIGNPOST_LISTEN_ADDRESS");
        override_u16(&mut self.global.listen.port, "SIGNPOST_LISTEN_PORT");
        override_string(&mut self.global.kafka.topic, "SIGNPOST_KAFKA_TOPIC");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 규칙의 jmespath/regex 표현식 컴파일 검증은 규칙 로더가 수행하며,
    /// 여기서는 구조적인 제약만 확인합니다. 어느 쪽이든 실패는 기동
    /// 거부로 이어집니다.
    pub fn validate(&self) -> Result<(), SignpostError> {
        const MAX_BUFFER: usize = 10_000_000;
        const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;
        const MAX_TIMEOUT_MS: u64 = 300_000;

        // log 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.global.log.level.as_str()) {
            return Err(invalid_value(
                "global.log.level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.global.log.format.as_str()) {
            return Err(invalid_value(
                "global.log.format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // listen 검증
        if self.global.listen.address.is_empty() {
            return Err(invalid_value(
                "global.listen.address",
                "must not be empty",
            ));
        }
        if self.global.listen.max_connections == 0 {
            return Err(invalid_value(
                "global.listen.max_connections",
                "must be greater than 0",
            ));
        }
        if self.global.listen.max_line_bytes == 0
            || self.global.listen.max_line_bytes > MAX_LINE_BYTES
        {
            return Err(invalid_value(
                "global.listen.max_line_bytes",
                format!("must be 1-{MAX_LINE_BYTES}"),
            ));
        }
        if let Some(ref tls) = self.global.listen.tls {
            if tls.cert.is_empty() || tls.key.is_empty() {
                return Err(invalid_value(
                    "global.listen.tls",
                    "cert and key must both be set",
                ));
            }
        }

        // kafka 검증
        if self.global.kafka.buffer == 0 || self.global.kafka.buffer > MAX_BUFFER {
            return Err(invalid_value(
                "global.kafka.buffer",
                format!("must be 1-{MAX_BUFFER}"),
            ));
        }
        if self.global.kafka.topic.is_empty() {
            return Err(invalid_value("global.kafka.topic", "must not be empty"));
        }
        if !self.global.kafka.conf.contains_key("bootstrap.servers") {
            return Err(invalid_value(
                "global.kafka.conf",
                "must contain 'bootstrap.servers'",
            ));
        }
        if self.global.kafka.timeout_ms == 0 || self.global.kafka.timeout_ms > MAX_TIMEOUT_MS {
            return Err(invalid_value(
                "global.kafka.timeout_ms",
                format!("must be 1-{MAX_TIMEOUT_MS}"),
            ));
        }

        // metrics 검증
        if let Some(ref statsd) = self.global.metrics.statsd {
            if !statsd.contains(':') {
                return Err(invalid_value(
                    "global.metrics.statsd",
                    "expected 'host:port'",
                ));
            }
        }

        // rules 검증: 매처 키는 jmespath/regex 중 정확히 하나
        for (idx, rule) in self.rules.iter().enumerate() {
            match (&rule.jmespath, &rule.regex) {
                (Some(_), Some(_)) => {
                    return Err(invalid_value(
                        format!("rules[{idx}]"),
                        "'jmespath' and 'regex' are mutually exclusive",
                    ));
                }
                (None, None) => {
                    return Err(invalid_value(
                        format!("rules[{idx}]"),
                        "either 'jmespath' or 'regex' is required",
                    ));
                }
                _ => {}
            }

            if rule.field.is_empty() {
                return Err(invalid_value(
                    format!("rules[{idx}].field"),
                    "must not be empty",
                ));
            }

            if rule.actions.is_empty() {
                warn!(rule = idx, "rule has no actions; it will match and do nothing");
            }
        }

        Ok(())
    }
}

fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> SignpostError {
    SignpostError::Config(ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    })
}

/// 전역 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// 리스너 설정
    pub listen: ListenConfig,
    /// 상태 엔드포인트 설정
    pub status: StatusConfig,
    /// Kafka 싱크 설정
    pub kafka: KafkaConfig,
    /// 메트릭 설정
    pub metrics: MetricsConfig,
    /// 로깅 설정
    pub log: LogConfig,
}

/// 리스너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// 바인드 주소
    pub address: String,
    /// 바인드 포트
    pub port: u16,
    /// TLS 설정 (없으면 평문 수신)
    pub tls: Option<TlsConfig>,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 연결당 최대 라인 크기 (바이트)
    pub max_line_bytes: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_owned(),
            port: 1514,
            tls: None,
            max_connections: 256,
            max_line_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// TLS 인증서 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM 인증서 경로
    pub cert: String,
    /// PEM 개인키 경로
    pub key: String,
}

/// 상태 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// 바인드 주소
    pub address: String,
    /// 바인드 포트
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_owned(),
            port: 8585,
        }
    }
}

/// Kafka 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// 디스패처 최대 버퍼 envelope 수 (하드 캡)
    pub buffer: usize,
    /// 기본 토픽 (어떤 규칙도 토픽을 지정하지 않은 레코드의 목적지)
    pub topic: String,
    /// 클라이언트 설정 passthrough (rdkafka에 그대로 전달)
    pub conf: BTreeMap<String, String>,
    /// 전송당 딜리버리 타임아웃 (밀리초)
    pub timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        let mut conf = BTreeMap::new();
        conf.insert("bootstrap.servers".to_owned(), "localhost:9092".to_owned());
        Self {
            buffer: 1024,
            topic: "logs-unknown".to_owned(),
            conf,
            timeout_ms: 5000,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// StatsD 수집기 주소 (`host:port`). 없으면 메트릭 비활성화.
    pub statsd: Option<String>,
}

/// 로깅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub level: String,
    /// 로그 형식 (json, pretty)
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "json".to_owned(),
        }
    }
}

/// 규칙 설정 — 매처 하나와 액션 시퀀스 하나의 쌍
///
/// `jmespath`와 `regex` 중 정확히 하나를 지정해야 합니다.
///
/// # YAML 스키마
/// ```yaml
/// rules:
///   - jmespath: "meta.topic"
///     field: msg
///     actions:
///       - type: merge
///         json:
///           meta:
///             signpost:
///               version: "{{version}}"
///       - type: stop
///   - regex: ".*"
///     field: msg
///     actions:
///       - type: stop
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// 구조화 쿼리 매처 (JMESPath 경로)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jmespath: Option<String>,
    /// 패턴 매처 (정규식)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// 매처 입력이 되는 레코드 필드명
    #[serde(default = "default_rule_field")]
    pub field: String,
    /// 매칭 시 순서대로 적용되는 액션 목록
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

fn default_rule_field() -> String {
    crate::record::FIELD_MSG.to_owned()
}

/// 액션 설정 — 닫힌 태그드 배리언트
///
/// 알 수 없는 `type` 태그는 로드 시점에 즉시 거부됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionConfig {
    /// 템플릿 확장 후 구조화 뷰에 딥 머지
    Merge {
        /// 머지할 JSON 프래그먼트 (플레이스홀더 토큰 허용)
        json: serde_json::Value,
    },
    /// 이후 규칙 평가 중단
    Stop,
    /// 목적지 토픽 지정 (기본 토픽보다 우선)
    Topic {
        /// 토픽 이름
        topic: String,
    },
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}
