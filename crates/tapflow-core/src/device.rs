//! C1: the `DeviceController` capability trait (§1, §6). This crate only
//! declares the contract; concrete adapters (e.g. the MCP-backed one in
//! `tapflow-mcp`) live outside it.

use async_trait::async_trait;

use crate::error::DeviceError;
use crate::ui_element::UiElement;

/// A single screen observation, as returned by `screenshot()` (§6).
#[derive(Debug, Clone)]
pub struct ScreenState {
    /// Raw PNG bytes of the captured frame.
    pub pixels_png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub elements: Vec<UiElement>,
    pub focused_element: Option<UiElement>,
    /// True when the platform reports the current field as a password /
    /// otherwise sensitive input; gates the confirmation behavior in C5.
    pub is_sensitive: bool,
}

/// Relative swipe distance, named per §4.4's action vocabulary. Absolute
/// pixel distance is resolved against screen width (see `ActionHandler`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDistance {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// The out-of-scope-but-interfaced device capability (§1). Every method
/// reports failure through `DeviceError` rather than panicking — a failed
/// gesture is routine agent-loop data, not a bug.
#[async_trait]
pub trait DeviceController: Send + Sync {
    async fn screenshot(&self) -> Result<ScreenState, DeviceError>;

    async fn tap(&self, x: i32, y: i32) -> Result<(), DeviceError>;

    async fn double_tap(&self, x: i32, y: i32) -> Result<(), DeviceError>;

    async fn long_press(&self, x: i32, y: i32) -> Result<(), DeviceError>;

    /// Issue a swipe between two concrete device-pixel points (§6:
    /// `swipe(x1,y1,x2,y2,duration_ms?)`). The caller (C5 `ActionHandler`)
    /// is responsible for turning a symbolic `direction`/`distance` pair
    /// into this endpoint, per §4.4's dispatch contract ("compute endpoint
    /// from width×{2,5,10}; issue swipe") — this trait only knows about
    /// pixels.
    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: Option<u64>,
    ) -> Result<(), DeviceError>;

    async fn back(&self) -> Result<(), DeviceError>;

    async fn home(&self) -> Result<(), DeviceError>;

    async fn launch_app(&self, app: &str) -> Result<(), DeviceError>;

    async fn clear_text(&self) -> Result<(), DeviceError>;

    async fn type_text(&self, text: &str) -> Result<(), DeviceError>;

    /// Swap in an automation-friendly IME, returning whatever token
    /// `restore_ime` needs to put the original one back.
    async fn set_ime(&self) -> Result<String, DeviceError>;

    async fn restore_ime(&self, previous: &str) -> Result<(), DeviceError>;

    async fn current_app(&self) -> Result<String, DeviceError>;
}
