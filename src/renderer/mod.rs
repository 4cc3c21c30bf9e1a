//! Rendering subsystems.
//!
//! Contains the screen-space post-processing effects (bloom, SSAO, FXAA)
//! and the stack that sequences them.

pub mod postprocess;
