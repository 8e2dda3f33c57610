use thiserror::Error;

/// Failures while turning node descriptions into a realized chain.
///
/// Any of these aborts the chain build; a malformed graph is never
/// silently shortened.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node type '{tag}'")]
    UnknownNodeType { tag: String },

    #[error("malformed '{tag}' node: {reason}")]
    InvalidNode { tag: String, reason: String },

    #[error("invalid parameter for {node} node: {reason}")]
    InvalidParameter { node: &'static str, reason: String },
}

/// Failures reported by a sample fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("sample '{file_id}' not found")]
    NotFound { file_id: String },

    #[error("sample '{file_id}' could not be decoded: {reason}")]
    Decode { file_id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to build effect chain for track {track}: {source}")]
    Graph {
        track: usize,
        #[source]
        source: GraphError,
    },

    #[error("master chain could not be built: {0}")]
    Master(#[source] GraphError),

    #[error("render cancelled")]
    Cancelled,

    #[error("invalid render transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::render::RenderState,
        to: crate::render::RenderState,
    },

    #[error("invalid render configuration: {0}")]
    InvalidConfig(String),

    #[error("render task failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
}
