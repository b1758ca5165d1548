//! 레코드 — 파이프라인의 작업 단위
//!
//! [`Record`]는 리스너가 수신한 한 건의 로그를 나타내며, 규칙 평가
//! 한 번을 거쳐 [`DispatchEnvelope`]로 변환된 뒤 폐기됩니다.
//!
//! # 구조화 뷰의 lazy 파싱
//!
//! Query 매처가 처음 참조할 때 대상 필드의 원시 텍스트를 JSON으로
//! 파싱하여 `structured`에 채웁니다. 파싱 결과(성공/실패)는 필드명
//! 단위로 메모이즈되므로, 같은 필드를 조회하는 매처가 여러 개여도
//! 파싱은 레코드당 한 번만 수행됩니다. 파싱 실패는 no-match일 뿐
//! 에러로 전파되지 않습니다.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde_json::Value;

/// 모든 레코드가 최소한으로 가지는 메시지 필드명
pub const FIELD_MSG: &str = "msg";

/// 파이프라인의 작업 단위
///
/// 원시 바이트와 필드 맵, lazy 파싱된 구조화 뷰, 그리고 평가 상태
/// (`terminated`, `destination_topic`)를 담습니다. 레코드는 커넥션
/// 워커 태스크가 단독으로 소유하며 공유되지 않습니다.
#[derive(Debug, Clone)]
pub struct Record {
    /// 수신한 원시 바이트
    raw: Bytes,
    /// 필드명 -> 원시 서브 값 (최소 "msg" 포함)
    fields: Vec<(String, String)>,
    /// 필드별 파싱 성공 여부 메모 (true = structured 뷰에 반영됨)
    parse_state: HashMap<String, bool>,
    /// 파싱된 구조화 뷰 (첫 파싱 성공 시 생성, merge 액션이 변형)
    structured: Option<Value>,
    /// 규칙이 지정한 목적지 토픽 (없으면 기본 토픽 적용)
    destination_topic: Option<String>,
    /// stop 액션이 설정하는 종료 플래그
    terminated: bool,
}

impl Record {
    /// 원시 바이트로 새 레코드를 생성합니다.
    pub fn new(raw: Bytes) -> Self {
        Self {
            raw,
            fields: Vec::new(),
            parse_state: HashMap::new(),
            structured: None,
            destination_topic: None,
            terminated: false,
        }
    }

    /// 한 줄의 텍스트를 `msg` 필드 하나만 가진 레코드로 만듭니다.
    pub fn from_line(line: &str) -> Self {
        Self::new(Bytes::copy_from_slice(line.as_bytes())).with_field(FIELD_MSG, line)
    }

    /// 필드를 추가합니다 (빌더 스타일).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// 필드를 추가합니다.
    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// 원시 바이트를 반환합니다.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// 필드 값을 조회합니다. 같은 이름이 여러 번 있으면 첫 값을 반환합니다.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 모든 필드를 반환합니다.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// 현재 구조화 뷰를 반환합니다 (파싱을 유발하지 않음).
    pub fn structured(&self) -> Option<&Value> {
        self.structured.as_ref()
    }

    /// 대상 필드 기준의 구조화 뷰를 반환합니다. 첫 호출 시 lazy 파싱.
    ///
    /// - 필드가 없거나 JSON 파싱에 실패하면 `None` (실패도 메모이즈)
    /// - 첫 파싱 성공이 `structured` 뷰를 만들고, 이후 같은 필드 조회는
    ///   (merge로 변형되었을 수 있는) 현재 뷰를 그대로 반환
    pub fn structured_for(&mut self, field: &str) -> Option<&Value> {
        match self.parse_state.get(field).copied() {
            Some(true) => self.structured.as_ref(),
            Some(false) => None,
            None => {
                let parsed = self
                    .field(field)
                    .and_then(|text| serde_json::from_str::<Value>(text).ok());
                match parsed {
                    Some(value) => {
                        self.parse_state.insert(field.to_owned(), true);
                        if self.structured.is_none() {
                            self.structured = Some(value);
                        }
                        self.structured.as_ref()
                    }
                    None => {
                        self.parse_state.insert(field.to_owned(), false);
                        None
                    }
                }
            }
        }
    }

    /// 구조화 뷰에 대한 가변 참조를 반환합니다. 없으면 빈 객체를 만듭니다.
    pub fn structured_mut_or_empty(&mut self) -> &mut Value {
        self.structured
            .get_or_insert_with(|| Value::Object(serde_json::Map::new()))
    }

    /// 규칙 평가를 종료 상태로 표시합니다.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// 종료 상태 여부를 반환합니다.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// 목적지 토픽을 설정합니다 (기본 토픽보다 우선).
    pub fn set_destination_topic(&mut self, topic: impl Into<String>) {
        self.destination_topic = Some(topic.into());
    }

    /// 설정된 목적지 토픽을 반환합니다.
    pub fn destination_topic(&self) -> Option<&str> {
        self.destination_topic.as_deref()
    }

    /// 레코드를 싱크로 전달할 envelope으로 변환합니다.
    ///
    /// 페이로드는 구조화 뷰가 있으면 그 직렬화 결과, 없으면 원시
    /// 바이트입니다. 토픽은 명시적 설정이 없으면 `default_topic`입니다.
    pub fn into_envelope(self, default_topic: &str) -> DispatchEnvelope {
        let payload = match self.structured.as_ref().and_then(|v| serde_json::to_vec(v).ok()) {
            Some(bytes) => Bytes::from(bytes),
            None => self.raw.clone(),
        };
        let topic = self
            .destination_topic
            .unwrap_or_else(|| default_topic.to_owned());
        DispatchEnvelope { topic, payload }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record[fields={} structured={} terminated={}]",
            self.fields.len(),
            self.structured.is_some(),
            self.terminated,
        )
    }
}

/// 파이프라인을 통과한 레코드 한 건의 전달 단위
///
/// 디스패처 큐에 들어가 외부 싱크가 정확히 한 번 소비합니다.
#[derive(Debug, Clone)]
pub struct DispatchEnvelope {
    /// 목적지 토픽
    pub topic: String,
    /// 직렬화된 페이로드
    pub payload: Bytes,
}

impl fmt::Display for DispatchEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DispatchEnvelope[topic={} payload={}B]",
            self.topic,
            self.payload.len(),
        )
    }
}
