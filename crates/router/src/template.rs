//! 플레이스홀더 확장 — merge 프래그먼트의 런타임 값 치환
//!
//! merge 액션의 JSON 프래그먼트 안 문자열 값에서 플레이스홀더 토큰을
//! 치환합니다. 토큰 집합은 닫혀 있습니다:
//!
//! - `{{version}}`: 빌드 버전 문자열
//! - `{{timestamp}}`: 치환 시점의 UTC 시각 (RFC 3339)
//!
//! 치환은 액션이 실행되는 순간의 값으로 수행됩니다.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// 버전 플레이스홀더 토큰
pub const TOKEN_VERSION: &str = "{{version}}";

/// 타임스탬프 플레이스홀더 토큰
pub const TOKEN_TIMESTAMP: &str = "{{timestamp}}";

/// 플레이스홀더 확장 컨텍스트
///
/// 토큰별 치환 값을 담습니다. [`TemplateContext::now`]가 액션 실행
/// 시점의 컨텍스트를 만듭니다.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    /// `{{version}}` 치환 값
    version: String,
    /// `{{timestamp}}` 치환 값
    timestamp: String,
}

impl TemplateContext {
    /// 현재 시점의 컨텍스트를 생성합니다.
    pub fn now() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// 고정 값으로 컨텍스트를 생성합니다 (테스트 및 드라이런용).
    pub fn fixed(version: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            timestamp: timestamp.into(),
        }
    }

    /// 문자열 안의 모든 토큰을 치환합니다.
    pub fn expand_str(&self, input: &str) -> String {
        // 토큰이 없는 문자열이 대부분이므로 먼저 확인하여 할당을 피합니다
        if !input.contains("{{") {
            return input.to_owned();
        }
        input
            .replace(TOKEN_VERSION, &self.version)
            .replace(TOKEN_TIMESTAMP, &self.timestamp)
    }

    /// JSON 프래그먼트를 순회하며 문자열 값의 토큰을 치환한 사본을
    /// 반환합니다. 객체 키는 치환하지 않습니다.
    pub fn expand(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.expand_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.expand(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.expand(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
