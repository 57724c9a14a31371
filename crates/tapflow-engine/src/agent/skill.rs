//! C8: `SkillExecutor` and the on-disk skill library (§4.7, §6). A skill is
//! a pure, ordered list of abstract actions; executing one takes a fresh
//! screen capture before each step and stops at the first failing step —
//! a deliberate correction of an original implementation that only checked
//! the *last* step's outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tapflow_core::device::DeviceController;
use tapflow_core::memory::{ActionKind, WorkAction};

use super::handler::ActionHandler;

/// One step of a skill's abstract action list (§6 "action dict shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillStep {
    pub action: String,
    #[serde(default)]
    pub element: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub dist: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
}

impl SkillStep {
    /// Bind this step to a concrete `WorkAction`. No element resolution
    /// happens here — that's `ActionHandler::dispatch`'s job, once a fresh
    /// screen capture is in hand.
    fn to_work_action(&self) -> Result<WorkAction, String> {
        match self.action.as_str() {
            "tap" => Ok(WorkAction::tap(
                self.element.clone().ok_or("tap step missing 'element'")?,
                "skill step: tap",
            )),
            "long_press" => Ok(WorkAction::long_press(
                self.element.clone().ok_or("long_press step missing 'element'")?,
                "skill step: long_press",
            )),
            "double_tap" => Ok(WorkAction::double_tap(
                self.element.clone().ok_or("double_tap step missing 'element'")?,
                "skill step: double_tap",
            )),
            "type" => Ok(WorkAction::type_text(
                self.element.clone().ok_or("type step missing 'element'")?,
                self.text.clone().ok_or("type step missing 'text'")?,
                "skill step: type",
            )),
            "swipe" => Ok(WorkAction::swipe(
                self.direction.clone().ok_or("swipe step missing 'direction'")?,
                self.dist.clone().ok_or("swipe step missing 'dist'")?,
                self.element.clone(),
                "skill step: swipe",
            )),
            "launch" => {
                Ok(WorkAction::launch(self.app.clone().ok_or("launch step missing 'app'")?, "skill step: launch"))
            }
            "back" => Ok(WorkAction::back("skill step: back")),
            "home" => Ok(WorkAction::home("skill step: home")),
            other => Err(format!("unsupported skill step action '{other}'")),
        }
    }
}

/// An entry in the skill library (§6: `function_name`/`tag`/`description`/
/// `parameters`/`workflow_count`/`workflow_tasks`/`created_time`/`file_path`).
/// The step list itself lives in the file at `file_path`, not inline, so
/// the library can be listed without loading every skill's body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillLibraryEntry {
    pub function_name: String,
    pub tag: String,
    pub description: String,
    pub parameters: Vec<String>,
    pub workflow_count: u32,
    pub workflow_tasks: Vec<String>,
    pub created_time: DateTime<Utc>,
    pub file_path: String,
}

/// A loaded skill body: the ordered step list a `SkillExecutor` runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub function_name: String,
    pub steps: Vec<SkillStep>,
}

#[derive(Debug, Clone)]
pub struct SkillExecutionResult {
    pub success: bool,
    pub steps_completed: usize,
    pub failure: Option<String>,
}

pub struct SkillExecutor<'a> {
    handler: &'a ActionHandler,
}

impl<'a> SkillExecutor<'a> {
    pub fn new(handler: &'a ActionHandler) -> Self {
        Self { handler }
    }

    /// Run `skill`'s steps in order against `device`, taking a fresh
    /// screenshot before each one. Stops at the first step whose binding
    /// or dispatch fails — never continues past a failure to "check the
    /// last step" the way the naive version of this logic would.
    pub async fn execute(&self, skill: &SkillDefinition, device: &dyn DeviceController) -> SkillExecutionResult {
        for (index, step) in skill.steps.iter().enumerate() {
            let action = match step.to_work_action() {
                Ok(action) => action,
                Err(message) => {
                    return SkillExecutionResult { success: false, steps_completed: index, failure: Some(message) };
                }
            };

            let screen = match device.screenshot().await {
                Ok(screen) => screen,
                Err(e) => {
                    return SkillExecutionResult {
                        success: false,
                        steps_completed: index,
                        failure: Some(format!("screenshot failed before step {index}: {e}")),
                    };
                }
            };

            let outcome = match self.handler.dispatch(device, &screen, &action).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    return SkillExecutionResult {
                        success: false,
                        steps_completed: index,
                        failure: Some(format!("step {index} ({}) failed to resolve: {e}", step.action)),
                    };
                }
            };

            if !outcome.success {
                return SkillExecutionResult {
                    success: false,
                    steps_completed: index,
                    failure: outcome.message.or(Some(format!("step {index} ({}) failed", step.action))),
                };
            }
        }

        SkillExecutionResult { success: true, steps_completed: skill.steps.len(), failure: None }
    }
}

/// A `WorkAction` recording the invocation of a whole skill, for the
/// workflow graph (§3 `ActionKind::SkillExecution`).
pub fn record_skill_invocation(function_name: &str, params: serde_json::Value, description: &str) -> WorkAction {
    WorkAction::skill_execution(function_name, params, description)
}

pub fn is_skill_action(kind: ActionKind) -> bool {
    kind == ActionKind::SkillExecution
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tapflow_core::device::ScreenState;
    use tapflow_core::error::DeviceError;
    use tapflow_core::ui_element::{Bbox, ToggleState, UiElement};

    struct FakeDevice {
        tap_calls: AtomicUsize,
        fail_after: usize,
    }

    fn screen_with(elem_id: &str) -> ScreenState {
        ScreenState {
            pixels_png: Vec::new(),
            width: 1080,
            height: 1920,
            elements: vec![UiElement {
                elem_id: elem_id.to_string(),
                bbox: Bbox { x1: 0, y1: 0, x2: 10, y2: 10 },
                class_path: "android.widget.Button".to_string(),
                checked: ToggleState::Enabled,
                focused: ToggleState::Disabled,
                resource_id: None,
                content_desc: None,
                text: Some(elem_id.to_string()),
            }],
            focused_element: None,
            is_sensitive: false,
        }
    }

    #[async_trait]
    impl DeviceController for FakeDevice {
        async fn screenshot(&self) -> Result<ScreenState, DeviceError> {
            Ok(screen_with("btn"))
        }
        async fn tap(&self, _x: i32, _y: i32) -> Result<(), DeviceError> {
            let n = self.tap_calls.fetch_add(1, Ordering::SeqCst);
            if n + 1 > self.fail_after {
                Err(DeviceError::GestureFailed("simulated failure".to_string()))
            } else {
                Ok(())
            }
        }
        async fn double_tap(&self, _x: i32, _y: i32) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn long_press(&self, _x: i32, _y: i32) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn swipe(&self, _x1: i32, _y1: i32, _x2: i32, _y2: i32, _duration_ms: Option<u64>) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn back(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn home(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn launch_app(&self, _app: &str) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn clear_text(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn type_text(&self, _text: &str) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn set_ime(&self) -> Result<String, DeviceError> {
            Ok("default".to_string())
        }
        async fn restore_ime(&self, _previous: &str) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn current_app(&self) -> Result<String, DeviceError> {
            Ok("com.example.app".to_string())
        }
    }

    fn skill_of(steps: Vec<SkillStep>) -> SkillDefinition {
        SkillDefinition { function_name: "test_skill".to_string(), steps }
    }

    fn tap_step() -> SkillStep {
        SkillStep { action: "tap".to_string(), element: Some("btn".to_string()), text: None, direction: None, dist: None, app: None }
    }

    #[tokio::test]
    async fn all_steps_succeed_when_device_never_fails() {
        let device = FakeDevice { tap_calls: AtomicUsize::new(0), fail_after: 100 };
        let handler = ActionHandler::new();
        let executor = SkillExecutor::new(&handler);
        let skill = skill_of(vec![tap_step(), tap_step(), tap_step()]);
        let result = executor.execute(&skill, &device).await;
        assert!(result.success);
        assert_eq!(result.steps_completed, 3);
    }

    #[tokio::test]
    async fn execution_stops_at_first_failing_step_not_the_last() {
        let device = FakeDevice { tap_calls: AtomicUsize::new(0), fail_after: 1 };
        let handler = ActionHandler::new();
        let executor = SkillExecutor::new(&handler);
        let skill = skill_of(vec![tap_step(), tap_step(), tap_step()]);
        let result = executor.execute(&skill, &device).await;
        assert!(!result.success);
        assert_eq!(result.steps_completed, 1);
    }

    #[tokio::test]
    async fn malformed_step_fails_without_touching_the_device() {
        let device = FakeDevice { tap_calls: AtomicUsize::new(0), fail_after: 100 };
        let handler = ActionHandler::new();
        let executor = SkillExecutor::new(&handler);
        let bad_step = SkillStep { action: "type".to_string(), element: Some("btn".to_string()), text: None, direction: None, dist: None, app: None };
        let skill = skill_of(vec![bad_step]);
        let result = executor.execute(&skill, &device).await;
        assert!(!result.success);
        assert_eq!(result.steps_completed, 0);
        assert_eq!(device.tap_calls.load(Ordering::SeqCst), 0);
    }
}
