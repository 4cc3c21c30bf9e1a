// -- Lint policy ---------------------------------------------------------
// Crate-wide lints live in Cargo.toml ([lints.clippy], [lints.rust],
// [lints.rustdoc]); complexity thresholds in clippy.toml.

//! Screen-space post-processing stack built on wgpu.
//!
//! postfx turns an HDR scene color target (plus a depth/normal G-buffer)
//! into bloom, ambient-occlusion and anti-aliased images.
//!
//! # Key entry points
//!
//! - [`renderer::postprocess::PostProcessStack`] - owns every effect and
//!   runs them in frame order
//! - [`renderer::postprocess::bloom::BloomPass`] - the pyramid bloom
//! - [`renderer::postprocess::bloom::software::SoftwareBloom`] - a CPU
//!   rendition of the same pass schedule, used for verification
//! - [`options::Options`] - TOML-backed tunables for every effect
//!
//! # Architecture
//!
//! Bloom extracts bright pixels into the first active level of a
//! six-level half-resolution pyramid, downsamples through the chain,
//! blurs each level coarsest first and sums the levels into a
//! full-resolution output with weights derived from `scattering`. The
//! whole pass list is a plain value ([`renderer::postprocess::bloom::schedule::BloomSchedule`])
//! that the GPU and CPU implementations both replay.

pub mod error;
pub mod gpu;
pub mod options;
pub mod renderer;

pub use error::PostFxError;
pub use options::Options;
pub use renderer::postprocess::PostProcessStack;
