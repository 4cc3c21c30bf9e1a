//! Bloom render-target pyramid.
//!
//! [`PyramidLayout`] is the resolution math and belongs to one bloom
//! instance; [`BloomPyramid`] owns the GPU surfaces laid out by it.

use std::ops::Range;

use crate::gpu::texture::{Extent, RenderTarget};

/// Pyramid levels sampled by the composite pass.
pub const PYRAMID_COUNT: usize = 5;

/// Levels allocated: one extra so half-resolution mode can shift every
/// operation down by one level.
pub const PYRAMID_LEVELS: usize = PYRAMID_COUNT + 1;

/// First level touched by the pipeline.
#[must_use]
pub fn level_offset(half_resolution: bool) -> usize {
    usize::from(half_resolution)
}

/// Levels touched by the pipeline (threshold target through the coarsest
/// composited level).
#[must_use]
pub fn active_levels(half_resolution: bool) -> Range<usize> {
    let offset = level_offset(half_resolution);
    offset..offset + PYRAMID_COUNT
}

/// Extents of every pyramid level for one base resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidLayout {
    base: Extent,
    levels: [Extent; PYRAMID_LEVELS],
}

impl PyramidLayout {
    /// Level 0 at `width`x`height`, each following level half the previous,
    /// rounded down.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let base = Extent::new(width, height);
        let mut levels = [Extent::default(); PYRAMID_LEVELS];
        let mut size = base;
        for level in &mut levels {
            *level = size;
            size = size.halved();
        }
        Self { base, levels }
    }

    /// Full output resolution.
    #[must_use]
    pub fn base(&self) -> Extent {
        self.base
    }

    /// Extent of `level`, or `None` past the coarsest level.
    #[must_use]
    pub fn level(&self, level: usize) -> Option<Extent> {
        self.levels.get(level).copied()
    }

    /// All level extents, finest first.
    #[must_use]
    pub fn levels(&self) -> &[Extent; PYRAMID_LEVELS] {
        &self.levels
    }

    /// Indices of levels whose exact extent is zero on some axis.
    #[must_use]
    pub fn degenerate_levels(&self) -> Vec<usize> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_degenerate())
            .map(|(i, _)| i)
            .collect()
    }
}

/// One pyramid level: the target the pipeline reads and writes, and a
/// same-sized scratch surface used as the blur ping-pong partner.
pub struct PyramidLevel {
    /// Level surface.
    pub target: RenderTarget,
    /// Blur scratch surface.
    pub scratch: RenderTarget,
}

/// GPU surfaces of a [`PyramidLayout`].
pub struct BloomPyramid {
    layout: PyramidLayout,
    levels: Vec<PyramidLevel>,
}

impl BloomPyramid {
    /// Allocate every level of `layout` as `Rgba16Float`.
    pub fn new(device: &wgpu::Device, layout: PyramidLayout) -> Self {
        let degenerate = layout.degenerate_levels();
        if !degenerate.is_empty() {
            log::warn!(
                "bloom pyramid for {}x{} has zero-sized levels {:?}; \
                 allocating them as 1x1",
                layout.base().width,
                layout.base().height,
                degenerate
            );
        }

        let levels = layout
            .levels()
            .iter()
            .enumerate()
            .map(|(i, &extent)| PyramidLevel {
                target: RenderTarget::hdr(
                    device,
                    &format!("Bloom Level {i}"),
                    extent,
                ),
                scratch: RenderTarget::hdr(
                    device,
                    &format!("Bloom Scratch {i}"),
                    extent,
                ),
            })
            .collect();

        log::debug!("bloom pyramid levels: {:?}", layout.levels());
        Self { layout, levels }
    }

    /// Resolution math for these surfaces.
    pub fn layout(&self) -> &PyramidLayout {
        &self.layout
    }

    /// Surfaces of `level`; `level` must be below `PYRAMID_LEVELS`.
    pub(super) fn level(&self, level: usize) -> &PyramidLevel {
        &self.levels[level]
    }

    /// All levels, finest first.
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }
}
