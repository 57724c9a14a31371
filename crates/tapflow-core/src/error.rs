use thiserror::Error;

/// Failure surfaces for the `DeviceController` capability (§6, §7).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("screenshot capture failed: {0}")]
    ScreenshotFailed(String),
    #[error("gesture failed: {0}")]
    GestureFailed(String),
    #[error("app '{0}' not found")]
    AppNotFound(String),
}

/// Failure surfaces for parsing a VLM-emitted action string (§4.4, §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized call form: {0}")]
    UnrecognizedForm(String),
    #[error("unknown keyword argument: {0}")]
    UnknownArgument(String),
    #[error("malformed literal: {0}")]
    MalformedLiteral(String),
    #[error("element '{0}' not found in elements_info")]
    UnresolvedElement(String),
    #[error("unbalanced brackets or quotes in argument list")]
    Unbalanced,
}

/// Failure surfaces for `ActionMemory` persistence (§4.2, §7 StoreError).
/// Every variant here is recoverable: callers log and continue per-file.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("graph file '{path}' is corrupt or not a JSON object: {source}")]
    CorruptGraphFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("workflow file '{path}' is corrupt or not a JSON array: {source}")]
    CorruptWorkflowFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("transition from {from} does not continue workflow ending at {last:?}")]
    DiscontinuousTransition { from: String, last: Option<String> },
    #[error("node {0} not found in graph")]
    NodeNotFound(String),
    #[error("on_new_node called again before the pending transition from {0} was closed")]
    PendingTransitionAlreadyOpen(String),
    #[error("on_action_executed called with no pending node (call on_new_node first)")]
    NoPendingTransition,
    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
