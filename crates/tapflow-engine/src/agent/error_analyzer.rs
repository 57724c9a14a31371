//! C6: `ErrorAnalyzer` — tracks action failures across a run and surfaces
//! prevention guidance before a likely-repeated mistake (§4.5). Guidance is
//! logged, never sent to the model: it informs the loop's own retry/backoff
//! decisions, not the prompt.

use std::collections::HashMap;

use tapflow_core::memory::ActionKind;

/// One recorded failure: the action kind and the element it targeted (or
/// `None` for gestureless actions), plus a short description of the error.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub kind: ActionKind,
    pub element: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePattern {
    RepeatedFailure,
    WrongElement,
    TimingIssue,
    InputValidation,
}

/// §4.5 pattern 2 closed list.
const WRONG_ELEMENT_PHRASES: &[&str] = &[
    "wrong element",
    "incorrect target",
    "element not found",
    "no response",
    "element not clickable",
    "element disabled",
];

/// §4.5 pattern 3 closed list.
const TIMING_ISSUE_PHRASES: &[&str] = &[
    "loading",
    "not ready",
    "still processing",
    "animation",
    "transition",
    "delay needed",
    "too fast",
    "ui not stable",
];

/// §4.5 pattern 4 closed list, only checked for `Type` actions.
const INPUT_VALIDATION_PHRASES: &[&str] = &[
    "invalid format",
    "validation error",
    "format required",
    "invalid input",
    "text rejected",
    "field validation",
];

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| haystack.contains(p))
}

/// A fully-populated pattern record (§4.5: "a dictionary of detected
/// `ErrorPattern`s"), combining the detected kind with the UI-context tags
/// and fixed suggestion text a caller would log or feed to analysis.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub pattern_type: FailurePattern,
    pub description: String,
    pub failed_actions: Vec<ActionKind>,
    pub context_conds: Vec<String>,
    pub suggestions: Vec<&'static str>,
    pub confidence: f64,
}

/// §4.5's `contextConds`: `COMPLEX_UI` above 20 elements, `SIMPLE_UI` below
/// 5, plus an `APP_<NAME>` tag for whichever app the failure happened in.
pub fn context_conds(element_count: usize, app: &str) -> Vec<String> {
    let mut conds = Vec::new();
    if element_count > 20 {
        conds.push("COMPLEX_UI".to_string());
    } else if element_count < 5 {
        conds.push("SIMPLE_UI".to_string());
    }
    if !app.is_empty() {
        conds.push(format!("APP_{}", app.to_uppercase()));
    }
    conds
}

#[derive(Debug, Default)]
pub struct ErrorAnalyzer {
    error_history: Vec<ErrorEntry>,
    failure_count: HashMap<(ActionKind, Option<String>), u32>,
}

impl ErrorAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of an action. Failures grow `error_history` and
    /// bump `failure_count` for `(kind, element)`; a success resets that
    /// key's count to zero (§4.5, §8: "failureCount resets on success").
    pub fn record_action_result(&mut self, kind: ActionKind, element: Option<String>, success: bool, message: &str) {
        let key = (kind, element.clone());
        if success {
            self.failure_count.insert(key, 0);
        } else {
            *self.failure_count.entry(key).or_insert(0) += 1;
            self.error_history.push(ErrorEntry { kind, element, message: message.to_string() });
        }
    }

    pub fn failure_count_for(&self, kind: ActionKind, element: Option<&str>) -> u32 {
        self.failure_count.get(&(kind, element.map(str::to_string))).copied().unwrap_or(0)
    }

    /// §4.5 pattern rules, evaluated over the error history: `repeated_failure`
    /// if the same `(kind, element)` failed at least twice within the last
    /// three recorded errors; the rest are closed-list substring matches on
    /// the error message.
    pub fn detect_pattern(&self, kind: ActionKind, element: Option<&str>) -> Option<FailurePattern> {
        let recent: Vec<&ErrorEntry> = self.error_history.iter().rev().take(3).collect();
        let same_target_count =
            recent.iter().filter(|e| e.kind == kind && e.element.as_deref() == element).count();
        if same_target_count >= 2 {
            return Some(FailurePattern::RepeatedFailure);
        }

        let last = recent.first()?;
        let msg = last.message.to_lowercase();
        if contains_any(&msg, WRONG_ELEMENT_PHRASES) {
            return Some(FailurePattern::WrongElement);
        }
        if contains_any(&msg, TIMING_ISSUE_PHRASES) {
            return Some(FailurePattern::TimingIssue);
        }
        if kind == ActionKind::Type && contains_any(&msg, INPUT_VALIDATION_PHRASES) {
            return Some(FailurePattern::InputValidation);
        }
        None
    }

    /// Fixed per-kind suggestion lists (§4.5). `suggestion_for` returns the
    /// first entry for compact logging; `suggestions_for` returns the full
    /// list for a constructed `ErrorPattern`.
    pub fn suggestion_for(&self, kind: ActionKind, pattern: &FailurePattern) -> &'static str {
        self.suggestions_for(kind, pattern)[0]
    }

    pub fn suggestions_for(&self, kind: ActionKind, pattern: &FailurePattern) -> Vec<&'static str> {
        match (kind, pattern) {
            (ActionKind::Tap, FailurePattern::RepeatedFailure) => vec![
                "this exact tap has failed repeatedly; try a different element or approach",
                "try long press instead of tap",
            ],
            (_, FailurePattern::RepeatedFailure) => {
                vec!["this exact action has failed repeatedly; try a different element or approach"]
            }
            (ActionKind::Tap | ActionKind::DoubleTap | ActionKind::LongPress, FailurePattern::WrongElement) => {
                vec!["re-examine the current screen elements before retrying; the target element id may have changed"]
            }
            (ActionKind::Type, FailurePattern::InputValidation) => vec![
                "the typed text may not satisfy the field's format; check for required patterns (digits, length)",
            ],
            (ActionKind::Swipe, FailurePattern::TimingIssue) => {
                vec!["the screen may still be animating; wait briefly before swiping again"]
            }
            (_, FailurePattern::TimingIssue) => vec!["the screen may not have finished loading; wait before retrying"],
            (_, FailurePattern::WrongElement) => vec!["the referenced element was not found on the current screen"],
            (_, FailurePattern::InputValidation) => {
                vec!["the action's arguments were rejected; double-check their format"]
            }
        }
    }

    /// Build the full `ErrorPattern` record (§4.5) for `kind`/`element`, if
    /// a pattern is currently detected — `context_conds` ties in the
    /// current UI's element count and app name.
    pub fn error_pattern(
        &self,
        kind: ActionKind,
        element: Option<&str>,
        element_count: usize,
        app: &str,
    ) -> Option<ErrorPattern> {
        let pattern = self.detect_pattern(kind, element)?;
        let failed_actions = self
            .error_history
            .iter()
            .filter(|e| e.kind == kind && e.element.as_deref() == element)
            .map(|e| e.kind)
            .collect();
        Some(ErrorPattern {
            description: format!("{:?} detected for {:?} targeting {:?}", pattern, kind, element),
            suggestions: self.suggestions_for(kind, &pattern),
            context_conds: context_conds(element_count, app),
            confidence: (0.5 + 0.1 * self.failure_count_for(kind, element) as f64).min(1.0),
            pattern_type: pattern,
            failed_actions,
        })
    }

    /// Warning text to log (never sent to the model) ahead of dispatching
    /// `kind`/`element`, if a pattern matches or the failure count alone is
    /// already at or above 2 (§4.5 `getPreventionGuidance`).
    pub fn prevention_guidance(&self, kind: ActionKind, element: Option<&str>) -> Option<String> {
        let pattern = self.detect_pattern(kind, element);
        let count = self.failure_count_for(kind, element);

        if let Some(pattern) = &pattern {
            return Some(format!("{:?}: {}", pattern, self.suggestion_for(kind, pattern)));
        }
        if count >= 2 {
            return Some(format!("{:?} targeting {:?} has failed {} times so far", kind, element, count));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_count_resets_on_success() {
        let mut analyzer = ErrorAnalyzer::new();
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "element not found");
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "element not found");
        assert_eq!(analyzer.failure_count_for(ActionKind::Tap, Some("btn")), 2);
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), true, "tapped");
        assert_eq!(analyzer.failure_count_for(ActionKind::Tap, Some("btn")), 0);
    }

    #[test]
    fn repeated_failure_pattern_detected_after_two_identical_failures() {
        let mut analyzer = ErrorAnalyzer::new();
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "element not found");
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "element not found");
        let pattern = analyzer.detect_pattern(ActionKind::Tap, Some("btn"));
        assert_eq!(pattern, Some(FailurePattern::RepeatedFailure));
    }

    #[test]
    fn wrong_element_pattern_from_message_substring() {
        let mut analyzer = ErrorAnalyzer::new();
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "element not found in elements_info");
        let pattern = analyzer.detect_pattern(ActionKind::Tap, Some("other"));
        assert_eq!(pattern, Some(FailurePattern::WrongElement));
    }

    #[test]
    fn prevention_guidance_is_none_below_threshold_with_no_pattern() {
        let analyzer = ErrorAnalyzer::new();
        assert!(analyzer.prevention_guidance(ActionKind::Tap, Some("btn")).is_none());
    }

    #[test]
    fn prevention_guidance_present_once_failure_count_reaches_two() {
        let mut analyzer = ErrorAnalyzer::new();
        analyzer.record_action_result(ActionKind::Swipe, None, false, "something odd");
        analyzer.record_action_result(ActionKind::Swipe, None, false, "something odd");
        assert!(analyzer.prevention_guidance(ActionKind::Swipe, None).is_some());
    }

    #[test]
    fn context_conds_tags_complex_and_simple_ui_and_app() {
        assert_eq!(context_conds(25, "com.example.app"), vec!["COMPLEX_UI", "APP_COM.EXAMPLE.APP"]);
        assert_eq!(context_conds(3, "com.example.app"), vec!["SIMPLE_UI", "APP_COM.EXAMPLE.APP"]);
        assert_eq!(context_conds(10, ""), Vec::<String>::new());
    }

    #[test]
    fn repeated_tap_failure_suggests_long_press() {
        let mut analyzer = ErrorAnalyzer::new();
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "no response");
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "no response");
        analyzer.record_action_result(ActionKind::Tap, Some("btn".to_string()), false, "no response");
        let pattern = analyzer.error_pattern(ActionKind::Tap, Some("btn"), 12, "com.example.app").unwrap();
        assert_eq!(pattern.pattern_type, FailurePattern::RepeatedFailure);
        assert!(pattern.suggestions.contains(&"try long press instead of tap"));
        assert!(pattern.context_conds.contains(&"APP_COM.EXAMPLE.APP".to_string()));
    }
}
