//! 매처 — 레코드 필드에 대한 술어
//!
//! 두 가지 배리언트를 지원합니다:
//!
//! - **Query**: JMESPath 경로를 대상 필드의 구조화 뷰에 평가합니다.
//!   주소가 가리키는 값이 존재하고 null이 아니면 매칭입니다.
//! - **Pattern**: 정규식을 대상 필드의 원시 텍스트에 평가합니다.
//!   unanchored 첫 매칭("contains") 시맨틱입니다.
//!
//! 표현식은 설정 로드 시점에 한 번만 컴파일되며, 핫패스에서는 타입
//! 태그를 다시 해석하지 않습니다. 컴파일 실패는 기동 거부로 이어집니다.

use std::fmt;

use regex::Regex;

use signpost_core::record::Record;

use crate::error::RouterError;

/// 컴파일된 매처 배리언트
pub enum MatcherKind {
    /// 구조화 쿼리 (JMESPath)
    Query(jmespath::Expression<'static>),
    /// 원시 텍스트 패턴 (정규식)
    Pattern(Regex),
}

/// 매처 — 대상 필드와 컴파일된 술어의 쌍
pub struct Matcher {
    /// 컴파일된 술어
    kind: MatcherKind,
    /// 입력이 되는 레코드 필드명
    field: String,
}

impl Matcher {
    /// JMESPath 쿼리 매처를 컴파일합니다.
    pub fn query(path: &str, field: impl Into<String>) -> Result<Self, RouterError> {
        let expression =
            jmespath::compile(path).map_err(|e| RouterError::InvalidExpression {
                kind: "jmespath".to_owned(),
                expression: path.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            kind: MatcherKind::Query(expression),
            field: field.into(),
        })
    }

    /// 정규식 패턴 매처를 컴파일합니다.
    pub fn pattern(pattern: &str, field: impl Into<String>) -> Result<Self, RouterError> {
        let regex = Regex::new(pattern).map_err(|e| RouterError::InvalidExpression {
            kind: "regex".to_owned(),
            expression: pattern.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            kind: MatcherKind::Pattern(regex),
            field: field.into(),
        })
    }

    /// 대상 필드명을 반환합니다.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// 배리언트 이름을 반환합니다 (로깅용).
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MatcherKind::Query(_) => "jmespath",
            MatcherKind::Pattern(_) => "regex",
        }
    }

    /// 레코드에 대해 매처를 평가합니다.
    ///
    /// - Query: 대상 필드의 lazy 파싱이 실패하면 no-match (에러 전파 없음)
    /// - Pattern: 대상 필드가 없으면 no-match
    pub fn evaluate(&self, record: &mut Record) -> bool {
        match &self.kind {
            MatcherKind::Query(expression) => {
                let Some(view) = record.structured_for(&self.field) else {
                    return false;
                };
                let Ok(data) = jmespath::Variable::from_serializable(view) else {
                    return false;
                };
                match expression.search(data) {
                    Ok(result) => !result.is_null(),
                    Err(_) => false,
                }
            }
            MatcherKind::Pattern(regex) => record
                .field(&self.field)
                .is_some_and(|text| regex.is_match(text)),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expression = match &self.kind {
            MatcherKind::Query(e) => e.as_str().to_owned(),
            MatcherKind::Pattern(r) => r.as_str().to_owned(),
        };
        f.debug_struct("Matcher")
            .field("kind", &self.kind_name())
            .field("expression", &expression)
            .field("field", &self.field)
            .finish()
    }
}
