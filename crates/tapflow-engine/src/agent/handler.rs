//! C5: `ActionHandler` — turns a parsed model call into a `WorkAction` and
//! dispatches it against a `DeviceController` (§4.4). Parsing never
//! evaluates model-supplied text as code; every argument is read as a typed
//! literal by `tapflow_llm::literal`.

use async_trait::async_trait;
use serde_json::Value;
use tapflow_core::device::{DeviceController, ScreenState, SwipeDirection, SwipeDistance};
use tapflow_core::error::ParseError;
use tapflow_core::memory::{ActionKind, WorkAction};
use tapflow_core::ui_element::UiElement;
use tapflow_llm::client::ActionCall;
use tapflow_llm::literal::{parse_call, Literal};

/// The result of dispatching a single action (§4.4's `{success, shouldFinish,
/// requiresConfirmation, message}` shape).
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub success: bool,
    pub should_finish: bool,
    pub requires_confirmation: bool,
    pub message: Option<String>,
}

impl HandlerOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, should_finish: false, requires_confirmation: false, message: Some(message.into()) }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { success: false, should_finish: false, requires_confirmation: false, message: Some(message.into()) }
    }

    fn finished(message: impl Into<String>) -> Self {
        Self { success: true, should_finish: true, requires_confirmation: false, message: Some(message.into()) }
    }

    /// A sensitive action the operator declined to confirm (§4.4, §5). This
    /// ends the run rather than letting the loop retry, since the model has
    /// no way to un-ask a rejected confirmation.
    fn cancelled(message: impl Into<String>) -> Self {
        Self { success: false, should_finish: true, requires_confirmation: true, message: Some(message.into()) }
    }
}

/// Capability seam for the `Call_API` action kind, the one dispatch branch
/// with no device-controller analogue. Left unconfigured, `Call_API`
/// dispatches fail cleanly rather than silently no-opping.
#[async_trait]
pub trait ApiCaller: Send + Sync {
    async fn call(&self, endpoint: &str, payload: &Value) -> Result<Value, anyhow::Error>;
}

/// Parse a `do(action=...)`/`finish(message=...)` call into a `WorkAction`.
/// Resolution of any referenced element (`elem_id` -> coordinates) happens
/// later, in `ActionHandler::dispatch`, once a concrete screen is at hand.
pub fn parse_work_action(call: &ActionCall) -> Result<WorkAction, ParseError> {
    let (name, args) = parse_call(&call.call)?;

    let get_str = |key: &str| -> Option<&str> { args.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.as_str()) };
    let require_str = |key: &str| -> Result<&str, ParseError> {
        get_str(key).ok_or_else(|| ParseError::MalformedLiteral(format!("{name} requires '{key}'")))
    };

    match name.as_str() {
        "finish" => Ok(WorkAction::finish(require_str("message")?)),
        "do" => {
            let action = require_str("action")?;
            match action {
                "tap" => Ok(WorkAction::tap(require_str("element")?, &call.description)),
                "long_press" => Ok(WorkAction::long_press(require_str("element")?, &call.description)),
                "double_tap" => Ok(WorkAction::double_tap(require_str("element")?, &call.description)),
                "type" => Ok(WorkAction::type_text(require_str("element")?, require_str("text")?, &call.description)),
                "swipe" => Ok(WorkAction::swipe(
                    require_str("direction")?,
                    require_str("distance")?,
                    get_str("element").map(str::to_string),
                    &call.description,
                )),
                "launch" => Ok(WorkAction::launch(require_str("app")?, &call.description)),
                "back" => Ok(WorkAction::back(&call.description)),
                "home" => Ok(WorkAction::home(&call.description)),
                "wait" => {
                    let seconds = args
                        .iter()
                        .find(|(k, _)| k == "seconds")
                        .and_then(|(_, v)| v.as_f64())
                        .ok_or_else(|| ParseError::MalformedLiteral("wait requires 'seconds'".to_string()))?;
                    Ok(WorkAction::wait(seconds, &call.description))
                }
                "take_over" => Ok(WorkAction::take_over(require_str("reason")?, &call.description)),
                "interact" => {
                    let element = require_str("element")?;
                    let payload = literal_args_to_json(&args, &["action", "element"]);
                    Ok(WorkAction::interact(element, payload, &call.description))
                }
                "note" => Ok(WorkAction::note(require_str("text")?, &call.description)),
                "call_api" => {
                    let endpoint = require_str("endpoint")?;
                    let payload = literal_args_to_json(&args, &["action", "endpoint"]);
                    Ok(WorkAction::call_api(endpoint, payload, &call.description))
                }
                other => Err(ParseError::UnrecognizedForm(format!("do(action=\"{other}\", ...)"))),
            }
        }
        other => Err(ParseError::UnrecognizedForm(other.to_string())),
    }
}

fn literal_args_to_json(args: &[(String, Literal)], skip: &[&str]) -> Value {
    let map = args
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Value::Object(map)
}

fn find_element<'a>(elements: &'a [UiElement], zone_path: &str) -> Option<&'a UiElement> {
    elements.iter().find(|e| e.elem_id == zone_path)
}

fn parse_swipe_direction(s: &str) -> Option<SwipeDirection> {
    match s {
        "up" => Some(SwipeDirection::Up),
        "down" => Some(SwipeDirection::Down),
        "left" => Some(SwipeDirection::Left),
        "right" => Some(SwipeDirection::Right),
        _ => None,
    }
}

fn parse_swipe_distance(s: &str) -> Option<SwipeDistance> {
    match s {
        "short" => Some(SwipeDistance::Short),
        "medium" => Some(SwipeDistance::Medium),
        "long" => Some(SwipeDistance::Long),
        _ => None,
    }
}

/// §4.4 Swipe: "compute endpoint from width×{2,5,10}". `unit_dist` is a
/// tenth of the screen width; `short`/`medium`/`long` scale it by
/// `2`/`5`/`10` respectively, applied uniformly to whichever axis
/// `direction` moves along (SPEC_FULL normalizes the original's
/// vertical/horizontal asymmetry, see DESIGN.md).
fn swipe_endpoint(origin: (i32, i32), width: u32, direction: SwipeDirection, distance: SwipeDistance) -> (i32, i32) {
    let unit_dist = (width / 10) as i32;
    let factor = match distance {
        SwipeDistance::Short => 2,
        SwipeDistance::Medium => 5,
        SwipeDistance::Long => 10,
    };
    let offset = unit_dist * factor;
    let (x, y) = origin;
    match direction {
        SwipeDirection::Up => (x, y - offset),
        SwipeDirection::Down => (x, y + offset),
        SwipeDirection::Left => (x - offset, y),
        SwipeDirection::Right => (x + offset, y),
    }
}

/// Dispatches a parsed `WorkAction` against a live device, resolving any
/// `zone_path` against the current screen's elements first.
pub struct ActionHandler {
    confirm: Option<Box<dyn Fn(&WorkAction) -> bool + Send + Sync>>,
    api_caller: Option<Box<dyn ApiCaller>>,
}

impl Default for ActionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler {
    pub fn new() -> Self {
        Self { confirm: None, api_caller: None }
    }

    /// Install the sensitive-action confirmation callback (§4.4): consulted
    /// before dispatching `Interact`, which is the one action kind the
    /// spec singles out as potentially sensitive (payments, permissions).
    pub fn with_confirmation(mut self, confirm: impl Fn(&WorkAction) -> bool + Send + Sync + 'static) -> Self {
        self.confirm = Some(Box::new(confirm));
        self
    }

    pub fn with_api_caller(mut self, caller: impl ApiCaller + 'static) -> Self {
        self.api_caller = Some(Box::new(caller));
        self
    }

    /// Tap the target, switch to the controlled IME, clear and type the
    /// text, then restore the previous IME regardless of whether typing
    /// succeeded (§4.4 `Type`: "tap element, switch to controlled IME,
    /// clear, type, restore IME").
    async fn type_into(
        &self,
        device: &dyn DeviceController,
        x: i32,
        y: i32,
        text: &str,
    ) -> Result<(), tapflow_core::error::DeviceError> {
        device.tap(x, y).await?;
        let previous_ime = device.set_ime().await?;
        let result = device.clear_text().await.and(device.type_text(text).await);
        device.restore_ime(&previous_ime).await?;
        result
    }

    /// Resolve `action`'s `zone_path` (if any) against `screen`'s elements
    /// and dispatch it through `device`. Unresolved elements are reported
    /// as a `ParseError`, distinct from a device-level failure (§7).
    pub async fn dispatch(
        &self,
        device: &dyn DeviceController,
        screen: &ScreenState,
        action: &WorkAction,
    ) -> Result<HandlerOutcome, ParseError> {
        let resolve = |zone_path: &str| -> Result<(i32, i32), ParseError> {
            find_element(&screen.elements, zone_path)
                .map(|e| e.center())
                .ok_or_else(|| ParseError::UnresolvedElement(zone_path.to_string()))
        };

        let outcome = match action.kind {
            ActionKind::Tap => {
                let (x, y) = resolve(action.zone_path.as_deref().unwrap_or_default())?;
                device_result(device.tap(x, y).await, "tapped")
            }
            ActionKind::DoubleTap => {
                let (x, y) = resolve(action.zone_path.as_deref().unwrap_or_default())?;
                device_result(device.double_tap(x, y).await, "double-tapped")
            }
            ActionKind::LongPress => {
                let (x, y) = resolve(action.zone_path.as_deref().unwrap_or_default())?;
                device_result(device.long_press(x, y).await, "long-pressed")
            }
            ActionKind::Type => {
                let (x, y) = resolve(action.zone_path.as_deref().unwrap_or_default())?;
                let text = action.params["text"].as_str().unwrap_or_default();
                match self.type_into(device, x, y, text).await {
                    Ok(_) => HandlerOutcome::ok(format!("typed {} chars", text.len())),
                    Err(e) => HandlerOutcome::failed(e.to_string()),
                }
            }
            ActionKind::Swipe => {
                let direction = action.params["direction"].as_str().and_then(parse_swipe_direction);
                let distance = action.params["distance"].as_str().and_then(parse_swipe_distance);
                let origin = match &action.zone_path {
                    Some(zone) => resolve(zone)?,
                    None => ((screen.width / 2) as i32, (screen.height / 2) as i32),
                };
                match (direction, distance) {
                    (Some(direction), Some(distance)) => {
                        let (x2, y2) = swipe_endpoint(origin, screen.width, direction, distance);
                        device_result(device.swipe(origin.0, origin.1, x2, y2, None).await, "swiped")
                    }
                    _ => HandlerOutcome::failed("swipe requires a valid direction and distance"),
                }
            }
            ActionKind::Launch => {
                let app = action.params["app"].as_str().unwrap_or_default();
                device_result(device.launch_app(app).await, "launched app")
            }
            ActionKind::Back => device_result(device.back().await, "pressed back"),
            ActionKind::Home => device_result(device.home().await, "pressed home"),
            ActionKind::Wait => {
                let seconds = action.params["seconds"].as_f64().unwrap_or(0.0).max(0.0);
                tokio::time::sleep(std::time::Duration::from_secs_f64(seconds)).await;
                HandlerOutcome::ok(format!("waited {seconds}s"))
            }
            ActionKind::TakeOver => HandlerOutcome {
                success: true,
                should_finish: false,
                requires_confirmation: true,
                message: Some(action.params["reason"].as_str().unwrap_or("handed control to operator").to_string()),
            },
            ActionKind::Interact => {
                let confirmed = match &self.confirm {
                    Some(confirm) => confirm(action),
                    None => true,
                };
                if !confirmed {
                    HandlerOutcome::cancelled("action rejected by confirmation callback")
                } else {
                    let (x, y) = resolve(action.zone_path.as_deref().unwrap_or_default())?;
                    device_result(device.tap(x, y).await, "interacted")
                }
            }
            ActionKind::Note => HandlerOutcome::ok(action.params["text"].as_str().unwrap_or_default()),
            ActionKind::CallApi => match &self.api_caller {
                Some(caller) => {
                    let endpoint = action.params["endpoint"].as_str().unwrap_or_default();
                    let payload = action.params["payload"].clone();
                    match caller.call(endpoint, &payload).await {
                        Ok(response) => HandlerOutcome::ok(response.to_string()),
                        Err(e) => HandlerOutcome::failed(e.to_string()),
                    }
                }
                None => HandlerOutcome::failed("call_api dispatched with no ApiCaller configured"),
            },
            ActionKind::Finish => HandlerOutcome::finished(action.params["message"].as_str().unwrap_or_default()),
            ActionKind::SkillExecution => {
                HandlerOutcome::failed("SkillExecution actions are dispatched by SkillExecutor, not ActionHandler")
            }
        };

        Ok(outcome)
    }
}

fn device_result(result: Result<(), tapflow_core::error::DeviceError>, verb: &str) -> HandlerOutcome {
    match result {
        Ok(()) => HandlerOutcome::ok(verb),
        Err(e) => HandlerOutcome::failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapflow_core::ui_element::Bbox;
    use tapflow_core::ui_element::ToggleState;

    fn element(elem_id: &str, x1: i32, y1: i32, x2: i32, y2: i32) -> UiElement {
        UiElement {
            elem_id: elem_id.to_string(),
            bbox: Bbox { x1, y1, x2, y2 },
            class_path: "android.widget.Button".to_string(),
            checked: ToggleState::Enabled,
            focused: ToggleState::Disabled,
            resource_id: None,
            content_desc: None,
            text: Some(elem_id.to_string()),
        }
    }

    fn action_call(text: &str) -> ActionCall {
        tapflow_llm::client::parse_action_call(text).unwrap()
    }

    #[test]
    fn parses_tap_into_work_action() {
        let call = action_call(r#"Tapping submit: do(action="tap", element="btn_submit")"#);
        let action = parse_work_action(&call).unwrap();
        assert_eq!(action.kind, ActionKind::Tap);
        assert_eq!(action.zone_path.as_deref(), Some("btn_submit"));
    }

    #[test]
    fn parses_finish_into_work_action() {
        let call = action_call(r#"Done: finish(message="task complete")"#);
        let action = parse_work_action(&call).unwrap();
        assert_eq!(action.kind, ActionKind::Finish);
        assert_eq!(action.params["message"], "task complete");
    }

    #[test]
    fn parses_swipe_with_optional_element() {
        let call = action_call(r#"Scrolling: do(action="swipe", direction="up", distance="medium")"#);
        let action = parse_work_action(&call).unwrap();
        assert_eq!(action.kind, ActionKind::Swipe);
        assert!(action.zone_path.is_none());
    }

    #[test]
    fn missing_required_field_is_malformed_literal() {
        let call = action_call(r#"Tapping: do(action="tap")"#);
        assert!(matches!(parse_work_action(&call), Err(ParseError::MalformedLiteral(_))));
    }

    #[test]
    fn unknown_action_name_is_unrecognized_form() {
        let call = action_call(r#"Doing something: do(action="teleport")"#);
        assert!(matches!(parse_work_action(&call), Err(ParseError::UnrecognizedForm(_))));
    }

    #[test]
    fn interact_payload_excludes_action_and_element_keys() {
        let call = action_call(r#"Confirming: do(action="interact", element="btn_pay", amount=500)"#);
        let action = parse_work_action(&call).unwrap();
        assert_eq!(action.kind, ActionKind::Interact);
        assert_eq!(action.params["amount"], 500);
        assert!(action.params.get("element").is_none());
    }

    #[test]
    fn find_element_helper_finds_match() {
        let elements = vec![element("a", 0, 0, 10, 10), element("b", 20, 20, 30, 30)];
        assert!(find_element(&elements, "b").is_some());
        assert!(find_element(&elements, "c").is_none());
    }

    #[test]
    fn swipe_endpoint_scales_by_distance_and_respects_direction() {
        let origin = (500, 500);
        let short = swipe_endpoint(origin, 1000, SwipeDirection::Up, SwipeDistance::Short);
        let medium = swipe_endpoint(origin, 1000, SwipeDirection::Up, SwipeDistance::Medium);
        let long = swipe_endpoint(origin, 1000, SwipeDirection::Up, SwipeDistance::Long);
        assert_eq!(short, (500, 300));
        assert_eq!(medium, (500, 0));
        assert_eq!(long, (500, -500));

        assert_eq!(swipe_endpoint(origin, 1000, SwipeDirection::Down, SwipeDistance::Short), (500, 700));
        assert_eq!(swipe_endpoint(origin, 1000, SwipeDirection::Left, SwipeDistance::Short), (300, 500));
        assert_eq!(swipe_endpoint(origin, 1000, SwipeDirection::Right, SwipeDistance::Short), (700, 500));
    }

    #[tokio::test]
    async fn swipe_dispatch_computes_endpoint_from_screen_width() {
        use crate::agent::test_stubs::StaticDevice;

        let screen = ScreenState { pixels_png: vec![], width: 1000, height: 2000, elements: vec![], focused_element: None, is_sensitive: false };
        let device = StaticDevice::new(screen.clone(), "com.example.app");
        let handler = ActionHandler::new();
        let action = WorkAction::swipe("up", "medium", None, "swipe up");

        let outcome = handler.dispatch(&device, &screen, &action).await.unwrap();
        assert!(outcome.success);
        assert_eq!(device.calls(), vec!["swipe(500,1000,500,500,None)".to_string()]);
    }

    #[tokio::test]
    async fn type_dispatch_switches_ime_around_clear_and_type() {
        use crate::agent::test_stubs::StaticDevice;

        let elements = vec![element("field_a", 0, 0, 20, 20)];
        let screen = ScreenState {
            pixels_png: vec![],
            width: 100,
            height: 100,
            elements,
            focused_element: None,
            is_sensitive: false,
        };
        let device = StaticDevice::new(screen.clone(), "com.example.app");
        let handler = ActionHandler::new();
        let action = WorkAction::type_text("field_a", "hello\nworld", "typing");

        let outcome = handler.dispatch(&device, &screen, &action).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            device.calls(),
            vec![
                "tap(10,10)".to_string(),
                "set_ime".to_string(),
                "clear_text".to_string(),
                "type_text(hello\nworld)".to_string(),
                "restore_ime".to_string(),
            ]
        );
    }
}
