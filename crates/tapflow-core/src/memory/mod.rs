//! C3: `ActionMemory` — the persistent, per-app graph of observed screens
//! and the workflows (traversals) recorded across them (§3, §4.2).

mod action;
mod node;
mod reflection;
mod recorder;
mod store;
mod workflow;

pub use action::{ActionKind, WorkAction};
pub use node::{WorkGraph, WorkNode};
pub use reflection::{ExecutionResult, ReflectionRecord};
pub use recorder::WorkflowRecorder;
pub use store::{ActionMemory, DEFAULT_EMBED_THRESHOLD, DEFAULT_TAG_THRESHOLD, LoadOptions};
pub use workflow::{WorkTransition, Workflow};
