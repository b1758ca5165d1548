//! 규칙 엔진 — 순서 보장 규칙 평가 루프
//!
//! 설정에 나열된 순서 그대로 규칙을 평가합니다. 각 규칙은 매처 하나와
//! 액션 시퀀스 하나의 쌍이며, 로드 이후 불변입니다.
//!
//! # 평가 시맨틱
//! - 레코드가 종료 상태면 즉시 평가를 끝냅니다.
//! - 매처가 no-match면 다음 규칙으로 넘어갑니다.
//! - 매칭 시 액션을 순서대로 적용하며, stop 액션이 내부 루프를 끊습니다.
//! - "매칭됨"과 "종료됨"은 별개의 상태입니다: stop 없이 merge만 하는
//!   규칙 뒤의 규칙도 같은 레코드에 다시 매칭되어 데이터를 보탤 수
//!   있습니다.
//! - 목적지 토픽은 topic 액션이 지정한 값, 없으면 기본 토픽입니다.
//!
//! 고정된 RuleSet과 고정된 레코드 내용에 대해 평가 순서와 결과는 완전히
//! 재현 가능합니다.

pub mod action;
pub mod loader;
pub mod matcher;

pub use action::Action;
pub use loader::RuleLoader;
pub use matcher::Matcher;

use std::time::Instant;

use metrics::{counter, histogram};

use signpost_core::metrics as metric_names;
use signpost_core::record::{DispatchEnvelope, Record};

/// 규칙 — 매처 하나와 액션 시퀀스의 쌍
#[derive(Debug)]
pub struct Rule {
    /// 매처
    matcher: Matcher,
    /// 매칭 시 순서대로 적용되는 액션
    actions: Vec<Action>,
}

impl Rule {
    /// 새 규칙을 생성합니다.
    pub fn new(matcher: Matcher, actions: Vec<Action>) -> Self {
        Self { matcher, actions }
    }

    /// 매처를 반환합니다.
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// 액션 목록을 반환합니다.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// 규칙 세트 — 순서가 보장된 규칙 목록과 기본 토픽
///
/// 로드 이후 불변이며, 모든 커넥션 워커가 `Arc`로 공유하여 동기화 없이
/// 읽습니다.
#[derive(Debug)]
pub struct RuleSet {
    /// 설정 순서 그대로의 규칙 목록
    rules: Vec<Rule>,
    /// 어떤 규칙도 토픽을 지정하지 않은 레코드의 목적지
    default_topic: String,
}

impl RuleSet {
    /// 새 규칙 세트를 생성합니다.
    pub fn new(rules: Vec<Rule>, default_topic: impl Into<String>) -> Self {
        Self {
            rules,
            default_topic: default_topic.into(),
        }
    }

    /// 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 기본 토픽을 반환합니다.
    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// 레코드에 대해 규칙을 평가하고 목적지 토픽을 반환합니다.
    ///
    /// 레코드는 매칭된 규칙의 액션에 의해 제자리에서 변형됩니다.
    /// 어떤 규칙도 매칭되지 않은 레코드도 기본 토픽으로 라우팅됩니다
    /// ("no rule matched"에 대한 특수 처리는 없습니다).
    pub fn evaluate(&self, record: &mut Record) -> String {
        let started = Instant::now();

        for (idx, rule) in self.rules.iter().enumerate() {
            if record.is_terminated() {
                break;
            }

            if !rule.matcher.evaluate(record) {
                continue;
            }

            counter!(metric_names::ROUTER_RULE_MATCHES_TOTAL).increment(1);
            tracing::trace!(
                rule = idx,
                kind = rule.matcher.kind_name(),
                field = rule.matcher.field(),
                "rule matched"
            );

            for action in &rule.actions {
                action.apply(record);
                if record.is_terminated() {
                    break;
                }
            }
        }

        counter!(metric_names::ROUTER_RECORDS_TOTAL).increment(1);
        histogram!(metric_names::ROUTER_EVALUATE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        record
            .destination_topic()
            .unwrap_or(&self.default_topic)
            .to_owned()
    }

    /// 레코드를 평가하고 곧바로 dispatch envelope으로 변환합니다.
    pub fn route(&self, mut record: Record) -> DispatchEnvelope {
        let topic = self.evaluate(&mut record);
        record.into_envelope(&topic)
    }

    /// 레코드에 매칭되는 규칙 인덱스 목록을 반환합니다 (드라이런용).
    ///
    /// 액션은 적용하지 않지만, Query 매처의 lazy 파싱은 평상시와
    /// 동일하게 동작합니다. stop에 의한 단락 없이 전체 규칙을 훑습니다.
    pub fn matching_rules(&self, record: &mut Record) -> Vec<usize> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(idx, rule)| rule.matcher.evaluate(record).then_some(idx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signpost_core::record::FIELD_MSG;

    fn stop_rule(pattern: &str) -> Rule {
        Rule::new(
            Matcher::pattern(pattern, FIELD_MSG).unwrap(),
            vec![Action::Stop],
        )
    }

    fn merge_rule(pattern: &str, fragment: serde_json::Value) -> Rule {
        Rule::new(
            Matcher::pattern(pattern, FIELD_MSG).unwrap(),
            vec![Action::Merge { template: fragment }],
        )
    }

    #[test]
    fn empty_ruleset_routes_to_default_topic() {
        let ruleset = RuleSet::new(vec![], "logs-default");
        let mut record = Record::from_line("anything");
        assert_eq!(ruleset.evaluate(&mut record), "logs-default");
        assert!(!record.is_terminated());
    }

    #[test]
    fn unmatched_record_is_unmutated() {
        let ruleset = RuleSet::new(
            vec![merge_rule("^never-matches$", json!({"x": 1}))],
            "logs-default",
        );
        let mut record = Record::from_line("plain line");
        ruleset.evaluate(&mut record);
        assert!(record.structured().is_none());
    }

    #[test]
    fn stop_halts_subsequent_rules() {
        let ruleset = RuleSet::new(
            vec![
                stop_rule("first"),
                merge_rule(".*", json!({"should_not": "appear"})),
            ],
            "logs-default",
        );
        let mut record = Record::from_line("first line");
        ruleset.evaluate(&mut record);
        assert!(record.is_terminated());
        assert!(record.structured().is_none());
    }

    #[test]
    fn merge_without_stop_lets_later_rules_contribute() {
        let ruleset = RuleSet::new(
            vec![
                merge_rule("line", json!({"first": 1})),
                merge_rule("line", json!({"second": 2})),
            ],
            "logs-default",
        );
        let mut record = Record::from_line("a line");
        ruleset.evaluate(&mut record);

        let view = record.structured().unwrap();
        assert_eq!(view["first"], 1);
        assert_eq!(view["second"], 2);
    }

    #[test]
    fn stop_inside_actions_skips_rest_of_rule() {
        let rule = Rule::new(
            Matcher::pattern(".*", FIELD_MSG).unwrap(),
            vec![
                Action::Merge { template: json!({"before": true}) },
                Action::Stop,
                Action::Merge { template: json!({"after": true}) },
            ],
        );
        let ruleset = RuleSet::new(vec![rule], "logs-default");
        let mut record = Record::from_line("x");
        ruleset.evaluate(&mut record);

        let view = record.structured().unwrap();
        assert_eq!(view["before"], true);
        assert!(view.get("after").is_none());
    }

    #[test]
    fn topic_action_overrides_default() {
        let rule = Rule::new(
            Matcher::pattern(".*", FIELD_MSG).unwrap(),
            vec![
                Action::Topic { topic: "logs-special".to_owned() },
                Action::Stop,
            ],
        );
        let ruleset = RuleSet::new(vec![rule], "logs-default");
        let mut record = Record::from_line("x");
        assert_eq!(ruleset.evaluate(&mut record), "logs-special");
    }

    #[test]
    fn merge_alone_never_sets_topic() {
        let ruleset = RuleSet::new(
            vec![merge_rule(".*", json!({"enriched": true}))],
            "logs-default",
        );
        let mut record = Record::from_line("x");
        // merge만 하고 stop하지 않아도 기본 토픽이 적용됨
        assert_eq!(ruleset.evaluate(&mut record), "logs-default");
    }

    #[test]
    fn rules_evaluate_in_configured_order() {
        let ruleset = RuleSet::new(
            vec![
                Rule::new(
                    Matcher::pattern(".*", FIELD_MSG).unwrap(),
                    vec![
                        Action::Topic { topic: "first-wins".to_owned() },
                        Action::Stop,
                    ],
                ),
                Rule::new(
                    Matcher::pattern(".*", FIELD_MSG).unwrap(),
                    vec![
                        Action::Topic { topic: "never-reached".to_owned() },
                        Action::Stop,
                    ],
                ),
            ],
            "logs-default",
        );
        let mut record = Record::from_line("x");
        assert_eq!(ruleset.evaluate(&mut record), "first-wins");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let ruleset = RuleSet::new(
            vec![
                merge_rule("deterministic", json!({"a": {"b": 1}})),
                merge_rule("deterministic", json!({"a": {"c": 2}})),
                stop_rule(".*"),
            ],
            "logs-default",
        );

        let mut first = Record::from_line("a deterministic line");
        let topic_first = ruleset.evaluate(&mut first);

        let mut second = Record::from_line("a deterministic line");
        let topic_second = ruleset.evaluate(&mut second);

        assert_eq!(topic_first, topic_second);
        assert_eq!(first.structured(), second.structured());
        assert_eq!(first.is_terminated(), second.is_terminated());
    }

    #[test]
    fn route_produces_envelope_with_resolved_topic() {
        let ruleset = RuleSet::new(vec![stop_rule(".*")], "logs-default");
        let envelope = ruleset.route(Record::from_line("hello"));
        assert_eq!(envelope.topic, "logs-default");
        assert_eq!(envelope.payload.as_ref(), b"hello");
    }

    #[test]
    fn matching_rules_reports_all_matches() {
        let ruleset = RuleSet::new(
            vec![
                stop_rule("alpha"),
                stop_rule("beta"),
                stop_rule(".*"),
            ],
            "logs-default",
        );
        let mut record = Record::from_line("alpha and beta");
        // 드라이런은 stop으로 단락하지 않고 전체를 훑음
        assert_eq!(ruleset.matching_rules(&mut record), vec![0, 1, 2]);
        assert!(!record.is_terminated());
    }

    #[test]
    fn ruleset_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuleSet>();
    }
}
