//! The agent control plane (§4): everything the `AgentLoop` orchestrates
//! per step — prompt assembly, action parsing/dispatch, error analysis,
//! skill execution, speculative prediction, and reflection.

pub mod context;
pub mod error_analyzer;
pub mod handler;
pub mod reflection;
pub mod run_loop;
pub mod skill;
pub mod speculative;

#[cfg(any(test, feature = "test-stubs"))]
pub mod test_stubs;

pub use context::{HistoryEntry, StructuredContext, MAX_HISTORY, MAX_REFLECTION};
pub use error_analyzer::{context_conds, ErrorAnalyzer, ErrorEntry, ErrorPattern, FailurePattern};
pub use handler::{parse_work_action, ActionHandler, ApiCaller, HandlerOutcome};
pub use reflection::{compute_ui_delta, focused_element_changed, is_obvious_change, reflect, StateChange, UiDelta};
pub use run_loop::{AgentConfig, AgentLoop, RunResult, StepOutcome};
pub use skill::{
    is_skill_action, record_skill_invocation, SkillDefinition, SkillExecutionResult, SkillExecutor,
    SkillLibraryEntry, SkillStep,
};
pub use speculative::{candidate_confidence, similarity, speculate, SpeculativeCandidate};
