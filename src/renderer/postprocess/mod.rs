//! Post-processing effect passes.
//!
//! Provides pyramid bloom, screen-space ambient occlusion (SSAO) and FXAA
//! anti-aliasing, plus the [`PostProcessStack`] that owns and sequences
//! them.

pub mod bloom;
pub mod effect;
pub mod fxaa;
mod post_process;
pub mod screen_pass;
pub mod ssao;

pub use effect::{EffectKind, FrameEffect, PostProcessEffect};
pub use post_process::{
    GBufferViews, PostProcessCamera, PostProcessContext, PostProcessStack,
};
