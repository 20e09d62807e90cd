//! Error types shared across the renderer.
//!
//! Resource failures (shader compilation, program linking, texture decoding,
//! bad geometry) come back as [`RenderError`] values. Misuse of the API, such
//! as binding a null program or reading through a stale node handle, panics
//! instead: those are bugs in the calling code, not conditions to recover from.

use thiserror::Error;

use crate::gls::ShaderKind;

/// Errors reported by the renderer and its resources.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A shader stage failed to compile. `log` holds the driver's info log.
    #[error("failed to compile {kind:?} shader for program `{program}`: {log}")]
    ShaderCompile {
        program: String,
        kind: ShaderKind,
        log: String,
    },

    /// Compiled stages failed to link into a program.
    #[error("failed to link program `{program}`: {log}")]
    ProgramLink { program: String, log: String },

    /// No shader source is registered under the requested name.
    #[error("unknown shader `{0}`")]
    UnknownShader(String),

    /// Encoded image data could not be decoded.
    #[error("failed to decode texture: {0}")]
    TextureDecode(#[from] image::ImageError),

    /// Geometry data is inconsistent (out of range indices, mismatched skin data...).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A scene graph edit would break the tree structure.
    #[error("invalid hierarchy: {0}")]
    Hierarchy(String),

    /// The graphics context refused to create an object.
    #[error("graphics context error: {0}")]
    Context(String),

    /// A frame was requested while no graphics context is attached.
    #[error("no graphics context attached")]
    NoContext,
}

pub type Result<T> = std::result::Result<T, RenderError>;
