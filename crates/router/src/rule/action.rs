//! 액션 — 매칭된 레코드에 적용되는 변형/제어 효과
//!
//! 배리언트:
//!
//! - **Merge**: 플레이스홀더를 확장한 JSON 프래그먼트를 구조화 뷰에
//!   딥 머지합니다. 뷰가 없으면 빈 객체에서 시작합니다.
//! - **Stop**: 레코드를 종료 상태로 표시하여 이후 규칙 평가를
//!   중단합니다. 구조화 뷰는 건드리지 않습니다.
//! - **Topic**: 목적지 토픽을 지정합니다 (기본 토픽보다 우선).
//!
//! 액션의 부수효과는 소유한 레코드에만 미칩니다. 전역 상태 없음.

use serde_json::Value;

use signpost_core::record::Record;

use crate::merge::deep_merge;
use crate::template::TemplateContext;

/// 매칭된 레코드에 순서대로 적용되는 액션
#[derive(Debug, Clone)]
pub enum Action {
    /// 템플릿 확장 후 구조화 뷰에 딥 머지
    Merge {
        /// 머지할 프래그먼트 (플레이스홀더 토큰 포함 가능)
        template: Value,
    },
    /// 이후 규칙 평가 중단
    Stop,
    /// 목적지 토픽 지정
    Topic {
        /// 토픽 이름
        topic: String,
    },
}

impl Action {
    /// 액션을 레코드에 적용합니다.
    ///
    /// Merge의 플레이스홀더는 이 호출 시점의 값으로 확장됩니다.
    pub fn apply(&self, record: &mut Record) {
        match self {
            Action::Merge { template } => {
                let expanded = TemplateContext::now().expand(template);
                deep_merge(record.structured_mut_or_empty(), &expanded);
            }
            Action::Stop => record.terminate(),
            Action::Topic { topic } => record.set_destination_topic(topic.clone()),
        }
    }

    /// 배리언트 이름을 반환합니다 (로깅용).
    pub fn name(&self) -> &'static str {
        match self {
            Action::Merge { .. } => "merge",
            Action::Stop => "stop",
            Action::Topic { .. } => "topic",
        }
    }
}
