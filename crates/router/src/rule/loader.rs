//! 규칙 로더 — 설정을 컴파일된 RuleSet으로 변환
//!
//! 자유 형식 키로 동작을 선택하는 설정을 로드 시점에 한 번만 닫힌
//! 배리언트로 해석합니다. 알 수 없는 태그와 유효하지 않은 표현식은
//! 즉시 거부되어 기동 실패로 이어지며, 핫패스에서는 태그를 다시
//! 해석하지 않습니다.

use signpost_core::config::{ActionConfig, RuleConfig, Settings};

use super::action::Action;
use super::matcher::Matcher;
use super::{Rule, RuleSet};
use crate::error::RouterError;

/// 규칙 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 전체 설정에서 RuleSet을 컴파일합니다.
    ///
    /// 기본 토픽은 `global.kafka.topic`입니다.
    pub fn from_settings(settings: &Settings) -> Result<RuleSet, RouterError> {
        Self::compile(&settings.rules, &settings.global.kafka.topic)
    }

    /// 규칙 설정 목록을 컴파일합니다.
    ///
    /// 설정에 나열된 순서가 곧 평가 순서입니다.
    pub fn compile(rules: &[RuleConfig], default_topic: &str) -> Result<RuleSet, RouterError> {
        let mut compiled = Vec::with_capacity(rules.len());

        for (idx, rule) in rules.iter().enumerate() {
            compiled.push(Self::compile_rule(idx, rule)?);
        }

        tracing::info!(
            rules = compiled.len(),
            default_topic,
            "rule set compiled"
        );
        Ok(RuleSet::new(compiled, default_topic))
    }

    /// 단일 규칙을 컴파일합니다.
    fn compile_rule(idx: usize, rule: &RuleConfig) -> Result<Rule, RouterError> {
        if rule.field.is_empty() {
            return Err(RouterError::RuleValidation {
                rule: idx,
                reason: "'field' must not be empty".to_owned(),
            });
        }

        let matcher = match (&rule.jmespath, &rule.regex) {
            (Some(path), None) => Matcher::query(path, &rule.field),
            (None, Some(pattern)) => Matcher::pattern(pattern, &rule.field),
            (Some(_), Some(_)) => {
                return Err(RouterError::RuleValidation {
                    rule: idx,
                    reason: "'jmespath' and 'regex' are mutually exclusive".to_owned(),
                });
            }
            (None, None) => {
                return Err(RouterError::RuleValidation {
                    rule: idx,
                    reason: "either 'jmespath' or 'regex' is required".to_owned(),
                });
            }
        }
        .map_err(|e| RouterError::RuleValidation {
            rule: idx,
            reason: e.to_string(),
        })?;

        let mut actions = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            actions.push(Self::compile_action(idx, action)?);
        }

        Ok(Rule::new(matcher, actions))
    }

    /// 액션 설정을 컴파일합니다.
    fn compile_action(idx: usize, action: &ActionConfig) -> Result<Action, RouterError> {
        match action {
            ActionConfig::Merge { json } => {
                if !json.is_object() {
                    return Err(RouterError::RuleValidation {
                        rule: idx,
                        reason: "merge 'json' fragment must be an object".to_owned(),
                    });
                }
                Ok(Action::Merge {
                    template: json.clone(),
                })
            }
            ActionConfig::Stop => Ok(Action::Stop),
            ActionConfig::Topic { topic } => {
                if topic.is_empty() {
                    return Err(RouterError::RuleValidation {
                        rule: idx,
                        reason: "topic action requires a non-empty topic".to_owned(),
                    });
                }
                Ok(Action::Topic {
                    topic: topic.clone(),
                })
            }
        }
    }
}
