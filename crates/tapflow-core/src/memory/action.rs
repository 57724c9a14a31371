use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reflection::ReflectionRecord;

/// The action vocabulary an agent step can record (§3). Field-presence
/// invariants are enforced by the constructors below, not by the enum
/// shape, so that `Tap { zone_path: None, .. }` can never be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    LongPress,
    DoubleTap,
    Swipe,
    Type,
    Launch,
    Back,
    Home,
    Wait,
    TakeOver,
    Interact,
    Note,
    CallApi,
    Finish,
    SkillExecution,
}

/// A single recorded action, attached to the `WorkNode` it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAction {
    pub kind: ActionKind,
    /// Target element identity (`UiElement::elem_id`) for element-targeted
    /// actions; `None` for gestureless ones (Back, Home, Finish, Launch).
    /// Dedup of actions within a node is keyed on this field.
    pub zone_path: Option<String>,
    /// Free-form per-kind payload: `text` for Type, `app` for Launch,
    /// `direction`/`distance` for Swipe, `message` for Finish, `skill` +
    /// its arguments for SkillExecution.
    pub params: serde_json::Value,
    pub description: String,
    pub reflection: Option<ReflectionRecord>,
    /// Model-reported confidence in the action choice itself, distinct from
    /// the reflection's post-hoc confidence (§3: `confidence ∈ [0,1]`).
    pub confidence: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl WorkAction {
    fn new(
        kind: ActionKind,
        zone_path: Option<String>,
        params: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            zone_path,
            params,
            description: description.into(),
            reflection: None,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_reflection(mut self, reflection: ReflectionRecord) -> Self {
        self.reflection = Some(reflection);
        self
    }

    pub fn tap(zone_path: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ActionKind::Tap, Some(zone_path.into()), serde_json::Value::Null, description)
    }

    pub fn long_press(zone_path: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ActionKind::LongPress, Some(zone_path.into()), serde_json::Value::Null, description)
    }

    pub fn double_tap(zone_path: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ActionKind::DoubleTap, Some(zone_path.into()), serde_json::Value::Null, description)
    }

    pub fn swipe(
        direction: impl Into<String>,
        distance: impl Into<String>,
        zone_path: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            ActionKind::Swipe,
            zone_path,
            serde_json::json!({ "direction": direction.into(), "distance": distance.into() }),
            description,
        )
    }

    pub fn type_text(
        zone_path: impl Into<String>,
        text: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            ActionKind::Type,
            Some(zone_path.into()),
            serde_json::json!({ "text": text.into() }),
            description,
        )
    }

    pub fn launch(app: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            ActionKind::Launch,
            None,
            serde_json::json!({ "app": app.into() }),
            description,
        )
    }

    pub fn back(description: impl Into<String>) -> Self {
        Self::new(ActionKind::Back, None, serde_json::Value::Null, description)
    }

    pub fn home(description: impl Into<String>) -> Self {
        Self::new(ActionKind::Home, None, serde_json::Value::Null, description)
    }

    pub fn wait(seconds: f64, description: impl Into<String>) -> Self {
        Self::new(ActionKind::Wait, None, serde_json::json!({ "seconds": seconds }), description)
    }

    /// Hands control to a human operator; the device/model loop pauses
    /// until the operator signals completion (§4.4 `Take_over`).
    pub fn take_over(reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ActionKind::TakeOver, None, serde_json::json!({ "reason": reason.into() }), description)
    }

    /// A sensitive action that must be confirmed by the caller's
    /// confirmation callback before dispatch (§4.4).
    pub fn interact(
        zone_path: impl Into<String>,
        payload: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        Self::new(ActionKind::Interact, Some(zone_path.into()), payload, description)
    }

    pub fn note(text: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ActionKind::Note, None, serde_json::json!({ "text": text.into() }), description)
    }

    pub fn call_api(
        endpoint: impl Into<String>,
        payload: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            ActionKind::CallApi,
            None,
            serde_json::json!({ "endpoint": endpoint.into(), "payload": payload }),
            description,
        )
    }

    pub fn finish(message: impl Into<String>) -> Self {
        Self::new(
            ActionKind::Finish,
            None,
            serde_json::json!({ "message": message.into() }),
            "task finished",
        )
    }

    pub fn skill_execution(
        skill: impl Into<String>,
        args: serde_json::Value,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            ActionKind::SkillExecution,
            None,
            serde_json::json!({ "skill": skill.into(), "args": args }),
            description,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_carries_zone_path() {
        let action = WorkAction::tap("btn_submit", "tap submit");
        assert_eq!(action.zone_path.as_deref(), Some("btn_submit"));
        assert_eq!(action.kind, ActionKind::Tap);
    }

    #[test]
    fn launch_has_no_zone_path() {
        let action = WorkAction::launch("com.example.app", "open app");
        assert!(action.zone_path.is_none());
        assert_eq!(action.params["app"], "com.example.app");
    }

    #[test]
    fn finish_carries_message_param() {
        let action = WorkAction::finish("done");
        assert_eq!(action.params["message"], "done");
    }
}
