//! Error and warning types for the progressive tracer.

use thiserror::Error;

/// Fatal error raised synchronously by a frame or a resource operation.
///
/// Nothing here poisons the driver: after an error the next
/// [`render_frame`](crate::FrameDriver::render_frame) starts from a clean state.
#[derive(Error, Debug)]
pub enum Error {
    /// Required input missing or invalid (kernel program, skybox, settings)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Surface or buffer allocation failed
    #[error("Failed to allocate {what}: {reason}")]
    Allocation { what: &'static str, reason: String },

    /// Graphics backend failure outside validation and allocation (device loss, readback)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Settings file could not be parsed or written
    #[error("Invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error from a message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an allocation error for the named resource.
    pub fn allocation(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Allocation { what, reason: reason.into() }
    }

    /// Whether a later frame may succeed without the caller changing anything.
    ///
    /// Only allocation failures qualify; a rejected kernel or a lost device fails the same
    /// way on every retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Allocation { .. })
    }
}

/// Non-fatal condition reported alongside a successful operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// Scene has no primitives; frames dispatch without a scene binding
    #[error("Scene is empty: dispatching without a scene binding")]
    EmptyScene,
}

/// Result type alias for tracer operations.
pub type Result<T> = std::result::Result<T, Error>;
