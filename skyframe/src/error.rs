use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameGraphError {
    #[error("Frame '{frame}' is already registered with a different descriptor")]
    Conflict { frame: String },

    #[error("No directed path from frame '{from}' to frame '{to}'")]
    PathNotFound { from: String, to: String },

    #[error("Cannot transform from frame '{from}' to frame '{to}': no path in the transform graph")]
    NoPath { from: String, to: String },

    #[error("Shape mismatch: {positions} positions but {velocities} velocities")]
    ShapeMismatch { positions: usize, velocities: usize },

    #[error("Velocities required for the coordinate in frame '{frame}' but none are present")]
    VelocityRequired { frame: String },

    #[error("Malformed transform from '{from}' to '{to}': {reason}")]
    MalformedTransform {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Transform from '{from}' to '{to}' cannot be inverted")]
    NotInvertible { from: String, to: String },

    #[error("Transform expects a coordinate in frame '{expected}', got '{actual}'")]
    FrameMismatch { expected: String, actual: String },

    #[error("Frame '{0}' does not exist")]
    FrameNotFound(String),

    #[error("Frame name '{0}' is too long (max 64 bytes)")]
    FrameNameTooLong(String),

    #[error("Frame '{frame}' maps unknown component '{component}'")]
    InvalidAxisName { frame: String, component: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FrameGraphError {
    /// Turns a path search failure into the error reported by `transform_to`.
    pub(crate) fn into_no_path(self) -> Self {
        match self {
            FrameGraphError::PathNotFound { from, to } => FrameGraphError::NoPath { from, to },
            other => other,
        }
    }
}

pub type FrameGraphResult<T> = Result<T, FrameGraphError>;
