//! 구조화 뷰 딥 머지
//!
//! merge 액션이 확장된 JSON 프래그먼트를 레코드의 구조화 뷰에 합칠 때
//! 사용합니다. 객체 키는 재귀적으로 합쳐지고, 스칼라와 배열 리프는
//! 프래그먼트 값으로 덮어씁니다 (append 없음).

use serde_json::Value;

/// `fragment`를 `target`에 딥 머지합니다.
///
/// - 양쪽 모두 객체면 키 단위로 재귀 머지
/// - 그 외에는 `target`을 `fragment` 값으로 교체
///
/// 같은 값을 다시 머지하면 결과가 변하지 않습니다 (멱등).
pub fn deep_merge(target: &mut Value, fragment: &Value) {
    match (target, fragment) {
        (Value::Object(target_map), Value::Object(fragment_map)) => {
            for (key, value) in fragment_map {
                match target_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target_slot, fragment_value) => {
            *target_slot = fragment_value.clone();
        }
    }
}
