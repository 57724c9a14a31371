//! Concrete `DeviceController` (§6) backed by an `McpClient` talking to a
//! mobile-automation MCP server (`take_screenshot`, `click`, `long_press`,
//! `swipe`, `type_text`, `list_apps`, `focus_window`/`launch`, `back`,
//! `home`).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tapflow_core::device::{DeviceController, ScreenState};
use tapflow_core::error::DeviceError;
use tapflow_core::ui_element::{extract_elements, Bbox, RawUiNode};

use crate::client::McpClient;
use crate::protocol::ToolContent;

/// The raw, pre-parsed element tree the MCP server's `take_screenshot` tool
/// embeds as a JSON text part alongside the PNG image.
#[derive(Debug, Deserialize)]
struct RawElementWire {
    class: String,
    bounds: [i32; 4],
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    content_desc: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    clickable: bool,
    #[serde(default)]
    long_clickable: bool,
    #[serde(default)]
    scrollable: bool,
    #[serde(default)]
    focusable: bool,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default)]
    children: Vec<RawElementWire>,
}

fn default_true() -> bool {
    true
}

impl From<RawElementWire> for RawUiNode {
    fn from(w: RawElementWire) -> Self {
        RawUiNode {
            class_name: w.class,
            bounds: Bbox { x1: w.bounds[0], y1: w.bounds[1], x2: w.bounds[2], y2: w.bounds[3] },
            resource_id: w.resource_id,
            content_desc: w.content_desc,
            text: w.text,
            clickable: w.clickable,
            long_clickable: w.long_clickable,
            scrollable: w.scrollable,
            focusable: w.focusable,
            enabled: w.enabled,
            visible: w.visible,
            children: w.children.into_iter().map(Into::into).collect(),
        }
    }
}

pub struct McpDeviceController {
    client: McpClient,
}

impl McpDeviceController {
    pub fn new(client: McpClient) -> Self {
        Self { client }
    }

    fn call(&self, tool: &str, args: serde_json::Value) -> Result<crate::protocol::ToolCallResult, DeviceError> {
        self.client
            .call_tool(tool, Some(args))
            .map_err(|e| DeviceError::GestureFailed(format!("{tool}: {e}")))
    }

}

#[async_trait]
impl DeviceController for McpDeviceController {
    async fn screenshot(&self) -> Result<ScreenState, DeviceError> {
        let result = self.call("take_screenshot", serde_json::json!({}))?;

        let mut pixels_png = Vec::new();
        let mut raw_tree: Option<RawUiNode> = None;
        let mut is_sensitive = false;
        let (mut width, mut height) = (0u32, 0u32);

        for content in &result.content {
            match content {
                ToolContent::Image { data, .. } => {
                    pixels_png =
                        STANDARD.decode(data).map_err(|e| DeviceError::ScreenshotFailed(e.to_string()))?;
                    if let Ok(img) = image::load_from_memory(&pixels_png) {
                        width = img.width();
                        height = img.height();
                    }
                }
                ToolContent::Text { text } => {
                    if let Ok(wire) = serde_json::from_str::<RawElementWire>(text) {
                        raw_tree = Some(wire.into());
                    } else if text.contains("\"is_sensitive\":true") {
                        is_sensitive = true;
                    }
                }
                ToolContent::Unknown => {}
            }
        }

        let elements = raw_tree.as_ref().map(extract_elements).unwrap_or_default();
        let focused_element = elements.iter().find(|e| e.focused == tapflow_core::ui_element::ToggleState::Enabled).cloned();

        Ok(ScreenState {
            width,
            height,
            pixels_png,
            elements,
            focused_element,
            is_sensitive,
        })
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.call("click", serde_json::json!({ "x": x, "y": y })).map(|_| ())
    }

    async fn double_tap(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.call("click", serde_json::json!({ "x": x, "y": y, "count": 2 })).map(|_| ())
    }

    async fn long_press(&self, x: i32, y: i32) -> Result<(), DeviceError> {
        self.call("long_press", serde_json::json!({ "x": x, "y": y })).map(|_| ())
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: Option<u64>) -> Result<(), DeviceError> {
        self.call(
            "swipe",
            serde_json::json!({
                "x1": x1,
                "y1": y1,
                "x2": x2,
                "y2": y2,
                "duration_ms": duration_ms,
            }),
        )
        .map(|_| ())
    }

    async fn back(&self) -> Result<(), DeviceError> {
        self.call("back", serde_json::json!({})).map(|_| ())
    }

    async fn home(&self) -> Result<(), DeviceError> {
        self.call("home", serde_json::json!({})).map(|_| ())
    }

    async fn launch_app(&self, app: &str) -> Result<(), DeviceError> {
        self.call("focus_window", serde_json::json!({ "app_name": app }))
            .or_else(|_| self.call("launch", serde_json::json!({ "app": app })))
            .map(|_| ())
            .map_err(|_| DeviceError::AppNotFound(app.to_string()))
    }

    async fn clear_text(&self) -> Result<(), DeviceError> {
        self.call("type_text", serde_json::json!({ "text": "", "clear": true })).map(|_| ())
    }

    async fn type_text(&self, text: &str) -> Result<(), DeviceError> {
        self.call("type_text", serde_json::json!({ "text": text })).map(|_| ())
    }

    async fn set_ime(&self) -> Result<String, DeviceError> {
        let result = self.call("list_apps", serde_json::json!({ "current_ime": true }))?;
        Ok(result.content.first().and_then(|c| c.as_text()).unwrap_or_default().to_string())
    }

    async fn restore_ime(&self, _previous: &str) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn current_app(&self) -> Result<String, DeviceError> {
        let result = self.call("list_apps", serde_json::json!({ "foreground_only": true }))?;
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|s| s.to_string())
            .ok_or_else(|| DeviceError::AppNotFound("<unknown>".to_string()))
    }
}
