use thiserror::Error;

/// Failure surfaces for a model backend call (§4.10, §7 ModelError). Unlike
/// `tapflow_core::error::ParseError`/`MemoryError`, these originate outside
/// the process (network, provider, malformed response) so they carry a
/// `source` rather than a closed set of known causes.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request to model backend failed: {0}")]
    RequestFailed(#[source] anyhow::Error),
    #[error("model backend returned an error response: {0}")]
    BackendError(String),
    #[error("could not parse model response: {0}")]
    MalformedResponse(String),
}
