//! Deterministic test doubles for driving `AgentLoop` without a live device
//! or model backend. Gated behind `#[cfg(any(test, feature =
//! "test-stubs"))]` (declared in `agent::mod`) so production builds never
//! compile this surface; downstream crates can still reach it in their own
//! tests via the `test-stubs` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use tapflow_core::device::{DeviceController, ScreenState};
use tapflow_core::error::DeviceError;
use tapflow_llm::client::ChatBackend;
use tapflow_llm::types::{ChatResponse, Choice, Message};

/// A `ChatBackend` that replays a fixed sequence of raw response strings,
/// one per call, then repeats its last response forever. `AgentLoop` tests
/// script router decisions, action calls, and reflection judgments this way
/// without a live VLM.
pub struct ScriptedLlm {
    responses: Vec<String>,
    next: AtomicUsize,
    call_count: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl ChatBackend for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted-test-model"
    }

    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<serde_json::Value>>,
    ) -> anyhow::Result<ChatResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        let content = self
            .responses
            .get(idx)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(ChatResponse {
            id: format!("scripted-{idx}"),
            choices: vec![Choice { index: 0, message: Message::assistant(content), finish_reason: Some("stop".to_string()) }],
            usage: None,
        })
    }
}

/// A `DeviceController` returning a fixed screen on every screenshot and
/// recording every call it receives. Gestures succeed unless constructed
/// with `.failing()`.
pub struct StaticDevice {
    screen: ScreenState,
    app: String,
    fail_gestures: bool,
    calls: Mutex<Vec<String>>,
}

impl StaticDevice {
    pub fn new(screen: ScreenState, app: impl Into<String>) -> Self {
        Self { screen, app: app.into(), fail_gestures: false, calls: Mutex::new(Vec::new()) }
    }

    pub fn failing(mut self) -> Self {
        self.fail_gestures = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn gesture_result(&self) -> Result<(), DeviceError> {
        if self.fail_gestures {
            Err(DeviceError::GestureFailed("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceController for StaticDevice {
    async fn screenshot(&self) -> Result<ScreenState, DeviceError> {
        self.record("screenshot");
        Ok(self.screen.clone())
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(format!("tap({x},{y})"));
        self.gesture_result()
    }

    async fn double_tap(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(format!("double_tap({x},{y})"));
        self.gesture_result()
    }

    async fn long_press(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.record(format!("long_press({x},{y})"));
        self.gesture_result()
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: Option<u64>) -> Result<(), DeviceError> {
        self.record(format!("swipe({x1},{y1},{x2},{y2},{duration_ms:?})"));
        self.gesture_result()
    }

    async fn back(&self) -> Result<(), DeviceError> {
        self.record("back");
        self.gesture_result()
    }

    async fn home(&self) -> Result<(), DeviceError> {
        self.record("home");
        self.gesture_result()
    }

    async fn launch_app(&self, app: &str) -> Result<(), DeviceError> {
        self.record(format!("launch({app})"));
        self.gesture_result()
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.record("clear_text");
        self.gesture_result()
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.record(format!("type_text({text})"));
        self.gesture_result()
    }

    async fn set_ime(&self) -> Result<String, DeviceError> {
        self.record("set_ime");
        Ok("default".to_string())
    }

    async fn restore_ime(&self, _previous: &str) -> Result<(), DeviceError> {
        self.record("restore_ime");
        Ok(())
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        Ok(self.app.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_llm_repeats_last_response_past_its_script() {
        let llm = ScriptedLlm::new(vec!["first", "second"]);
        assert_eq!(llm.chat(vec![], None).await.unwrap().choices[0].message.content_text(), "first");
        assert_eq!(llm.chat(vec![], None).await.unwrap().choices[0].message.content_text(), "second");
        assert_eq!(llm.chat(vec![], None).await.unwrap().choices[0].message.content_text(), "second");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn static_device_records_calls_and_reports_fixed_app() {
        let screen = ScreenState { pixels_png: vec![], width: 1, height: 1, elements: vec![], focused_element: None, is_sensitive: false };
        let device = StaticDevice::new(screen, "com.example.app");
        device.tap(1, 2).await.unwrap();
        assert_eq!(device.current_app().await.unwrap(), "com.example.app");
        assert_eq!(device.calls(), vec!["tap(1,2)".to_string()]);
    }

    #[tokio::test]
    async fn failing_device_reports_gesture_errors() {
        let screen = ScreenState { pixels_png: vec![], width: 1, height: 1, elements: vec![], focused_element: None, is_sensitive: false };
        let device = StaticDevice::new(screen, "com.example.app").failing();
        assert!(device.tap(1, 2).await.is_err());
    }
}
