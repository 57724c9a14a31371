//! §4.9 `ReflectionEngine`: judges whether the last action achieved its
//! intent by diffing the screen before/after, taking a fast path (no model
//! call) whenever the change is unambiguous, and falling back to a single
//! VLM judgment call otherwise.

use std::collections::HashSet;

use serde::Deserialize;
use tapflow_core::memory::{ExecutionResult, ReflectionRecord};
use tapflow_core::ui_element::UiElement;
use tapflow_llm::client::{extract_json, reflect_system_prompt, ChatBackend, ModelClient};
use tapflow_llm::types::Message;

/// The position bucket a `state_changes` entry is keyed on: `bbox`'s
/// top-left corner, divided into 10px cells (§4.9).
fn position_key(e: &UiElement) -> (i32, i32) {
    (e.bbox.x1 / 10, e.bbox.y1 / 10)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub position: (i32, i32),
    pub before_content: String,
    pub after_content: String,
}

#[derive(Debug, Clone, Default)]
pub struct UiDelta {
    pub element_count_diff: i64,
    pub new_contents: HashSet<String>,
    pub removed_contents: HashSet<String>,
    pub state_changes: Vec<StateChange>,
}

/// Diff `before`/`after` element lists (§4.9). Content identity is
/// `UiElement::identity_key()`; position identity is the 10px bucket of the
/// element's top-left corner.
pub fn compute_ui_delta(before: &[UiElement], after: &[UiElement]) -> UiDelta {
    let element_count_diff = after.len() as i64 - before.len() as i64;

    let before_contents: HashSet<String> = before.iter().map(UiElement::identity_key).collect();
    let after_contents: HashSet<String> = after.iter().map(UiElement::identity_key).collect();

    let new_contents: HashSet<String> = after_contents.difference(&before_contents).cloned().collect();
    let removed_contents: HashSet<String> = before_contents.difference(&after_contents).cloned().collect();

    let mut before_by_position = std::collections::HashMap::new();
    for e in before {
        before_by_position.insert(position_key(e), e.identity_key());
    }

    let mut state_changes = Vec::new();
    for e in after {
        let key = position_key(e);
        if let Some(before_content) = before_by_position.get(&key) {
            let after_content = e.identity_key();
            if *before_content != after_content {
                state_changes.push(StateChange {
                    position: key,
                    before_content: before_content.clone(),
                    after_content,
                });
            }
        }
    }

    UiDelta { element_count_diff, new_contents, removed_contents, state_changes }
}

const SUCCESS_WORDS: &[&str] = &["success", "done", "added", "completed", "confirmed", "submitted"];
const NAVIGATION_WORDS: &[&str] = &["navigate", "open", "launch", "back", "home", "scroll"];

/// §4.9's obvious-change heuristic: a large enough count/content delta, any
/// positional state change, or a success/navigation word appearing among
/// the newly-appeared element contents, all skip the model call.
pub fn is_obvious_change(delta: &UiDelta) -> bool {
    if delta.element_count_diff.unsigned_abs() as usize > 2 {
        return true;
    }
    if delta.new_contents.len() > 3 || delta.removed_contents.len() > 3 {
        return true;
    }
    if !delta.state_changes.is_empty() {
        return true;
    }
    delta.new_contents.iter().any(|content| {
        let lower = content.to_lowercase();
        SUCCESS_WORDS.iter().any(|w| lower.contains(w)) || NAVIGATION_WORDS.iter().any(|w| lower.contains(w))
    })
}

pub fn focused_element_changed(before: Option<&UiElement>, after: Option<&UiElement>) -> bool {
    before.map(UiElement::identity_key) != after.map(UiElement::identity_key)
}

#[derive(Debug, Deserialize)]
struct RawReflection {
    execution_result: String,
    confidence: f32,
    #[serde(default)]
    ui_changes: Option<String>,
    #[serde(default)]
    goal_achievement: Option<String>,
    #[serde(default)]
    abnormal_states: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    improvement_suggestions: Option<String>,
}

/// Parse the §4.9 slow-path strict-JSON reflect response into a
/// `ReflectionRecord`, mapping `execution_result` to `action_successful` as
/// `success→true`, `failure→false`, else `unknown` (§4.9 step 5).
fn parse_reflection_json(raw: &str) -> Option<ReflectionRecord> {
    let json_text = extract_json(raw);
    let parsed: RawReflection = serde_json::from_str(json_text).ok()?;

    let (execution_result, action_successful) = match parsed.execution_result.as_str() {
        "success" => (ExecutionResult::Success, Some(true)),
        "failure" => (ExecutionResult::Failure, Some(false)),
        "partial_success" | "partial" => (ExecutionResult::PartialSuccess, Some(true)),
        _ => (ExecutionResult::Failure, None),
    };

    Some(ReflectionRecord {
        action_successful,
        execution_result,
        interface_changes: parsed.ui_changes,
        goal_achievement: parsed.goal_achievement,
        abnormal_states: parsed.abnormal_states,
        improvement_suggestions: parsed.improvement_suggestions,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        reasoning: parsed.reasoning,
        used_model_analysis: true,
    })
}

/// Run the full reflection step (§4.9): fast path on an obvious change or a
/// focused-element change, otherwise one VLM judgment call. Any backend
/// error, or a response that fails to parse, resolves to
/// `ReflectionRecord::unknown()` rather than aborting the step.
pub async fn reflect<C: ChatBackend>(
    model: &ModelClient<C>,
    before: &[UiElement],
    after: &[UiElement],
    focused_before: Option<&UiElement>,
    focused_after: Option<&UiElement>,
    action_description: &str,
) -> ReflectionRecord {
    let delta = compute_ui_delta(before, after);

    if is_obvious_change(&delta) || focused_element_changed(focused_before, focused_after) {
        return ReflectionRecord::obvious_success(describe_delta(&delta));
    }

    let messages = vec![
        Message::system(reflect_system_prompt()),
        Message::user(format!(
            "Action attempted: {action_description}\n\nUi delta:\n{}",
            describe_delta(&delta)
        )),
    ];

    match model.request_reflection(messages).await {
        Ok(raw) => parse_reflection_json(&raw).unwrap_or_else(ReflectionRecord::unknown),
        Err(_) => ReflectionRecord::unknown(),
    }
}

fn describe_delta(delta: &UiDelta) -> String {
    format!(
        "element_count_diff={}, new_contents={}, removed_contents={}, state_changes={}",
        delta.element_count_diff,
        delta.new_contents.len(),
        delta.removed_contents.len(),
        delta.state_changes.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapflow_core::ui_element::{Bbox, ToggleState};

    fn elem(text: &str, x1: i32, y1: i32) -> UiElement {
        UiElement {
            elem_id: text.to_string(),
            bbox: Bbox { x1, y1, x2: x1 + 10, y2: y1 + 10 },
            class_path: "android.widget.TextView".to_string(),
            checked: ToggleState::Disabled,
            focused: ToggleState::Disabled,
            resource_id: None,
            content_desc: None,
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn identical_screens_have_empty_delta() {
        let screen = vec![elem("a", 0, 0), elem("b", 20, 20)];
        let delta = compute_ui_delta(&screen, &screen);
        assert_eq!(delta.element_count_diff, 0);
        assert!(delta.new_contents.is_empty());
        assert!(delta.removed_contents.is_empty());
        assert!(delta.state_changes.is_empty());
    }

    #[test]
    fn detects_new_and_removed_contents() {
        let before = vec![elem("a", 0, 0)];
        let after = vec![elem("b", 0, 0)];
        let delta = compute_ui_delta(&before, &after);
        assert!(delta.new_contents.contains(&after[0].identity_key()));
        assert!(delta.removed_contents.contains(&before[0].identity_key()));
    }

    #[test]
    fn detects_state_change_at_same_position() {
        let before = vec![elem("0", 100, 100)];
        let after = vec![elem("1", 100, 100)];
        let delta = compute_ui_delta(&before, &after);
        assert_eq!(delta.state_changes.len(), 1);
        assert_eq!(delta.state_changes[0].position, (10, 10));
    }

    #[test]
    fn large_count_diff_is_obvious_change() {
        let before = vec![elem("a", 0, 0)];
        let after = vec![elem("b", 0, 0), elem("c", 20, 20), elem("d", 40, 40), elem("e", 60, 60)];
        let delta = compute_ui_delta(&before, &after);
        assert!(is_obvious_change(&delta));
    }

    #[test]
    fn success_word_in_new_contents_is_obvious_change() {
        let before = vec![elem("Login", 0, 0)];
        let after = vec![elem("Login", 0, 0), elem("Order submitted successfully", 200, 200)];
        let delta = compute_ui_delta(&before, &after);
        assert_eq!(delta.state_changes.len(), 0);
        assert!(is_obvious_change(&delta));
    }

    #[test]
    fn small_quiet_delta_is_not_obvious_change() {
        let delta = UiDelta::default();
        assert!(!is_obvious_change(&delta));
    }

    #[test]
    fn focused_element_change_is_detected() {
        let a = elem("a", 0, 0);
        let b = elem("b", 0, 0);
        assert!(focused_element_changed(Some(&a), Some(&b)));
        assert!(!focused_element_changed(Some(&a), Some(&a)));
        assert!(focused_element_changed(None, Some(&a)));
    }

    #[test]
    fn parse_reflection_json_maps_success_to_action_successful_true() {
        let record = parse_reflection_json(r#"{"execution_result": "success", "confidence": 0.95, "notes": "ok"}"#).unwrap();
        assert_eq!(record.action_successful, Some(true));
        assert_eq!(record.execution_result, ExecutionResult::Success);
    }

    #[test]
    fn parse_reflection_json_strips_code_fence() {
        let record = parse_reflection_json("```json\n{\"execution_result\": \"failure\", \"confidence\": 0.4}\n```").unwrap();
        assert_eq!(record.action_successful, Some(false));
    }

    #[test]
    fn parse_reflection_json_clamps_out_of_range_confidence() {
        let record = parse_reflection_json(r#"{"execution_result": "success", "confidence": 1.7}"#).unwrap();
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn parse_reflection_json_returns_none_on_malformed_input() {
        assert!(parse_reflection_json("not json").is_none());
    }
}
