//! GPU resource management utilities.
//!
//! Provides headless device initialization, render targets, dynamic uniform
//! buffers, RGBA16F upload/readback and shader composition.

/// Growable GPU buffers and dynamic-offset uniform slots.
pub mod dynamic_buffer;
/// Shared wgpu boilerplate helpers for screen-space post-process pipelines.
pub mod pipeline_helpers;
/// Blocking RGBA16F texture upload and readback.
pub mod readback;
/// wgpu device and queue initialization.
pub mod render_context;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Render-target texture abstraction.
pub mod texture;
