pub mod device;
pub mod embed;
pub mod error;
pub mod memory;
pub mod ui_element;

pub use device::{DeviceController, ScreenState};
pub use embed::{Embedder, HashingEmbedder};
pub use error::{DeviceError, MemoryError, ParseError};
pub use memory::{
    ActionKind, ActionMemory, ExecutionResult, LoadOptions, ReflectionRecord, WorkAction, WorkGraph,
    WorkNode, WorkTransition, Workflow, WorkflowRecorder,
};
pub use ui_element::{RawUiNode, UiElement, extract_elements};

/// Replace characters that are unsafe in a filename: spaces, `/`, and `.` all
/// become `_`. Used for both graph (`<app>.json`) and workflow (`<tag>.json`)
/// filenames, per the on-disk store layout.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ' ' | '/' | '.' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_replaces_spaces_slashes_dots() {
        assert_eq!(sanitize_filename("com.example app/v2"), "com_example_app_v2");
    }

    #[test]
    fn sanitize_filename_is_noop_on_clean_input() {
        assert_eq!(sanitize_filename("settings"), "settings");
    }
}
