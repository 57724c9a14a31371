use serde::{Deserialize, Serialize};

/// Coarse-grained outcome bucket for a reflected action (§3 ReflectionRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Success,
    PartialSuccess,
    Failure,
}

/// The outcome of a single reflection pass over a before/after screenshot
/// pair (§4.9, §3). Written back onto the `WorkAction` it judged, not just
/// returned to the caller — see `reflection_result`/`confidence_score` in
/// the on-disk `WorkAction` layout (§6).
///
/// `elements_before`/`elements_after` deliberately aren't fields here: they
/// are transient comparison inputs the engine crate's `ReflectionEngine`
/// works with, not something worth persisting per action (§6's on-disk
/// layout lists only `reflection_result` and `confidence_score`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    /// `None` means "unknown" (§3: `action_successful ∈ {true,false,unknown}`).
    pub action_successful: Option<bool>,
    pub execution_result: ExecutionResult,
    pub interface_changes: Option<String>,
    pub goal_achievement: Option<String>,
    pub abnormal_states: Option<String>,
    pub improvement_suggestions: Option<String>,
    pub confidence: f32,
    pub reasoning: Option<String>,
    pub used_model_analysis: bool,
}

impl ReflectionRecord {
    /// The §4.9 fast-path result: obvious UI delta, no VLM call.
    pub fn obvious_success(interface_changes: impl Into<String>) -> Self {
        Self {
            action_successful: Some(true),
            execution_result: ExecutionResult::Success,
            interface_changes: Some(interface_changes.into()),
            goal_achievement: None,
            abnormal_states: None,
            improvement_suggestions: None,
            confidence: 0.9,
            reasoning: Some("fast path: obvious UI change".to_string()),
            used_model_analysis: false,
        }
    }

    /// §4.9 step 5: on any reflect-mode error, a zero-confidence unknown
    /// record, never a propagated error.
    pub fn unknown() -> Self {
        Self {
            action_successful: None,
            execution_result: ExecutionResult::Failure,
            interface_changes: None,
            goal_achievement: None,
            abnormal_states: None,
            improvement_suggestions: None,
            confidence: 0.0,
            reasoning: None,
            used_model_analysis: false,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.action_successful == Some(false) || self.execution_result == ExecutionResult::Failure
    }
}
