//! Error types for the host.

use std::fmt;

use thiserror::Error;

/// A single error-severity shader diagnostic, resolved against its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDiagnostic {
    pub message: String,
    /// 1-based line number, 0 when the compiler reported no location.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub column: u32,
    /// The offending source line, trimmed of its line terminator.
    pub source_line: Option<String>,
}

impl fmt::Display for ShaderDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)?;
        if let Some(src) = &self.source_line {
            write!(f, "\n    {}", src.trim_end())?;
        }
        Ok(())
    }
}

/// Errors surfaced to plugin code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphicsError {
    /// Malformed descriptor, bad argument, or an operation invalid in the current state.
    #[error("validation error: {0}")]
    Validation(String),
    /// A render graph declares a dependency cycle.
    #[error("render graph '{graph}' has a dependency cycle through node '{node}'")]
    CyclicDependency { graph: String, node: String },
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Every error-severity diagnostic of every failing stage.
    #[error("shader compilation failed for '{label}' ({} error(s))", .errors.len())]
    ShaderCompilationFailed {
        label: String,
        errors: Vec<ShaderDiagnostic>,
    },
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),
    #[error("surface creation failed: {0}")]
    SurfaceCreationFailed(String),
    /// The engine or handle was already disposed.
    #[error("{0} is already disposed")]
    AlreadyDisposed(String),
    /// The device was lost; the engine is no longer usable.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),
}

impl GraphicsError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors caused by caller misuse rather than the device.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::CyclicDependency { .. })
    }
}

/// Result alias used throughout the crate.
pub type GraphicsResult<T> = Result<T, GraphicsError>;
