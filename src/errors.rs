// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the frame pipeline

use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while processing frames or building the pipeline
///
/// Only `ContextInit` is fatal. The per-frame variants cause the frame to be
/// dropped and are never returned to a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Output buffer creation failed (resource exhaustion)
    Allocation(String),
    /// Source buffer could not be wrapped as a processable image
    Conversion(String),
    /// Rendering into an output buffer failed
    Render(String),
    /// Neither the hardware nor the software rendering context could be built
    ContextInit(String),
    /// A serial execution queue could not be started
    Queue(String),
    /// Configuration file could not be read or parsed
    Config(String),
}

impl PipelineError {
    /// Whether this error only affects the current frame
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            PipelineError::Allocation(_) | PipelineError::Conversion(_) | PipelineError::Render(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Allocation(msg) => write!(f, "Buffer allocation failed: {}", msg),
            PipelineError::Conversion(msg) => write!(f, "Buffer conversion failed: {}", msg),
            PipelineError::Render(msg) => write!(f, "Render failed: {}", msg),
            PipelineError::ContextInit(msg) => {
                write!(f, "Rendering context unavailable: {}", msg)
            }
            PipelineError::Queue(msg) => write!(f, "Execution queue error: {}", msg),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}
