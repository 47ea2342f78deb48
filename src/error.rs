//! Error types for the edgecam pipeline

use thiserror::Error;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the conversion, filter, staging and rendering stages.
///
/// None of these cross a producer or consumer callback: the controller logs
/// them and returns.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller handed us image data that breaks the planar contract
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// A plane is too short for the declared geometry
    #[error("{plane} plane holds {len} bytes, needs at least {needed}")]
    PlaneTooSmall {
        plane: &'static str,
        needed: usize,
        len: usize,
    },

    /// RGBA buffer length does not match width * height * 4
    #[error("Pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
    BufferSize { width: u32, height: u32, len: usize },

    /// Filter parameters out of range
    #[error("Invalid filter parameters: {0}")]
    InvalidParameters(String),

    /// Edge filter failed internally
    #[error("Filter error: {0}")]
    Filter(String),

    /// Shader compile or pipeline link failure
    #[error("Shader error: {0}")]
    Shader(String),

    /// Any other GPU failure (adapter, device, texture)
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Renderer has no live GPU resources
    #[error("Renderer not ready")]
    RendererNotReady,

    /// Entry point called after destroy()
    #[error("Pipeline destroyed")]
    Destroyed,

    /// Configuration loading error
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl PipelineError {
    /// Precondition violations: the caller's fault, no work attempted
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidImage(_)
                | PipelineError::PlaneTooSmall { .. }
                | PipelineError::BufferSize { .. }
        )
    }
}
