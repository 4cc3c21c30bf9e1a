//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;

/// Errors produced by the postfx crate.
#[derive(Debug)]
pub enum PostFxError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// A WGSL shader failed to compose.
    ShaderCompose {
        /// Path of the shader that failed.
        shader: &'static str,
        /// Composer diagnostic.
        message: String,
    },
    /// Reading a render target back to the CPU failed.
    Readback(String),
    /// An upload did not cover exactly the target's allocation.
    PixelCount {
        /// Pixels in the target allocation.
        expected: usize,
        /// Pixels supplied.
        actual: usize,
    },
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
}

impl fmt::Display for PostFxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::ShaderCompose { shader, message } => {
                write!(f, "failed to compose shader '{shader}': {message}")
            }
            Self::Readback(msg) => write!(f, "readback error: {msg}"),
            Self::PixelCount { expected, actual } => write!(
                f,
                "upload has {actual} pixels, target allocation has {expected}"
            ),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
        }
    }
}

impl std::error::Error for PostFxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for PostFxError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for PostFxError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
