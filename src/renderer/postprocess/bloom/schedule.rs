//! The ordered pass list of one bloom frame.
//!
//! The schedule is pure data derived from [`BloomOptions`]. The GPU pass and
//! the software reference both execute it step by step, so pass order,
//! touched levels, and per-pass parameters are defined once, here.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::pyramid::{active_levels, level_offset, PYRAMID_COUNT};
use crate::options::BloomOptions;

/// Normalized weights of the 9-tap separable Gaussian, center tap first.
pub const GAUSSIAN_WEIGHTS: [f32; 5] = [
    0.227_027_03,
    0.194_594_6,
    0.121_621_62,
    0.054_054_055,
    0.016_216_216,
];

/// Blur kernel run by the blur stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlurKernel {
    /// Separable 9-tap Gaussian: horizontal then vertical pass.
    Gaussian,
    /// Four diagonal bilinear taps at a growing offset per pass.
    Kawase,
}

/// A surface of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Surface {
    /// The level target itself.
    Level(usize),
    /// The level's blur scratch target.
    Scratch(usize),
}

/// One blur draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurPass {
    /// Pyramid level being blurred.
    pub level: usize,
    /// Surface sampled.
    pub source: Surface,
    /// Surface written.
    pub target: Surface,
    /// Kernel of this pass.
    pub kernel: BlurKernel,
    /// Gaussian tap direction in texels; unused by Kawase.
    pub direction: [f32; 2],
    /// Kawase tap distance in texels; unused by Gaussian.
    pub offset: f32,
    /// Index of this pass's parameters in the frame's blur uniform array.
    pub slot: usize,
}

/// One step of the bloom pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BloomStep {
    /// Bright-pass the scene into `target`.
    Threshold {
        /// Level written.
        target: usize,
    },
    /// Blit `source` into the next-coarser `target`.
    Downsample {
        /// Level read.
        source: usize,
        /// Level written.
        target: usize,
    },
    /// One blur draw.
    Blur(BlurPass),
    /// Weighted sum of `PYRAMID_COUNT` levels starting at `first_level`.
    Composite {
        /// Finest composited level.
        first_level: usize,
    },
}

/// Blur draws for `iterations` iterations of `kernel` on `level`.
///
/// Every iteration is two draws, level to scratch then scratch to level, so
/// the result always ends in the level target whichever kernel runs.
#[must_use]
pub fn blur_level(
    level: usize,
    kernel: BlurKernel,
    iterations: usize,
    first_slot: usize,
) -> Vec<BlurPass> {
    (0..iterations * 2)
        .map(|pass| {
            let (source, target) = if pass % 2 == 0 {
                (Surface::Level(level), Surface::Scratch(level))
            } else {
                (Surface::Scratch(level), Surface::Level(level))
            };
            let (direction, offset) = match kernel {
                BlurKernel::Gaussian if pass % 2 == 0 => ([1.0, 0.0], 1.0),
                BlurKernel::Gaussian => ([0.0, 1.0], 1.0),
                BlurKernel::Kawase => ([1.0, 1.0], pass as f32 + 0.5),
            };
            BlurPass {
                level,
                source,
                target,
                kernel,
                direction,
                offset,
                slot: first_slot + pass,
            }
        })
        .collect()
}

/// Per-level composite weights: `s^i` normalized to sum to one, with `s` the
/// clamped scattering. Zero keeps only the finest level; one weights all
/// levels equally.
#[must_use]
pub fn composite_weights(scattering: f32) -> [f32; PYRAMID_COUNT] {
    let s = scattering.clamp(0.0, 1.0);
    let mut weights = [0.0f32; PYRAMID_COUNT];
    let mut power = 1.0;
    for w in &mut weights {
        *w = power;
        power *= s;
    }
    let sum: f32 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// The ordered steps of one bloom frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BloomSchedule {
    steps: Vec<BloomStep>,
    half_resolution: bool,
    blur_pass_count: usize,
}

impl BloomSchedule {
    /// Threshold, downsample chain (finest to coarsest), blur (coarsest to
    /// finest), composite.
    #[must_use]
    pub fn new(options: &BloomOptions) -> Self {
        let offset = level_offset(options.half_resolution);
        let levels = active_levels(options.half_resolution);
        let kernel = options.blur_kernel();
        let iterations = options.blur_iteration_count();

        let mut steps = Vec::with_capacity(
            PYRAMID_COUNT * (1 + iterations * 2) + 1,
        );
        steps.push(BloomStep::Threshold { target: offset });
        for target in levels.clone().skip(1) {
            steps.push(BloomStep::Downsample {
                source: target - 1,
                target,
            });
        }

        let mut slot = 0;
        for level in levels.rev() {
            let passes = blur_level(level, kernel, iterations, slot);
            slot += passes.len();
            steps.extend(passes.into_iter().map(BloomStep::Blur));
        }

        steps.push(BloomStep::Composite {
            first_level: offset,
        });

        Self {
            steps,
            half_resolution: options.half_resolution,
            blur_pass_count: slot,
        }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[BloomStep] {
        &self.steps
    }

    /// Blur draws in execution order.
    pub fn blur_passes(&self) -> impl Iterator<Item = &BlurPass> {
        self.steps.iter().filter_map(|step| match step {
            BloomStep::Blur(pass) => Some(pass),
            _ => None,
        })
    }

    /// Number of blur draws (and blur uniform slots).
    pub fn blur_pass_count(&self) -> usize {
        self.blur_pass_count
    }

    /// Levels composited into the output.
    pub fn composite_levels(&self) -> Range<usize> {
        active_levels(self.half_resolution)
    }

    /// Every level target written by some step.
    #[must_use]
    pub fn written_levels(&self) -> BTreeSet<usize> {
        self.steps
            .iter()
            .filter_map(|step| match *step {
                BloomStep::Threshold { target }
                | BloomStep::Downsample { target, .. } => Some(target),
                BloomStep::Blur(BlurPass {
                    target: Surface::Level(level),
                    ..
                }) => Some(level),
                BloomStep::Blur(_) | BloomStep::Composite { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::postprocess::bloom::pyramid::PYRAMID_LEVELS;

    fn options(half_resolution: bool, kawase: bool) -> BloomOptions {
        BloomOptions {
            half_resolution,
            use_kawase_blur: kawase,
            ..BloomOptions::default()
        }
    }

    /// A step with its kernel-specific parameters erased.
    fn shape(step: &BloomStep) -> String {
        match step {
            BloomStep::Blur(pass) => format!(
                "blur {} {:?}->{:?} #{}",
                pass.level, pass.source, pass.target, pass.slot
            ),
            other => format!("{other:?}"),
        }
    }

    #[test]
    fn full_resolution_order() {
        let schedule = BloomSchedule::new(&options(false, false));
        let steps = schedule.steps();
        assert_eq!(steps[0], BloomStep::Threshold { target: 0 });
        for (i, step) in steps[1..5].iter().enumerate() {
            assert_eq!(
                *step,
                BloomStep::Downsample {
                    source: i,
                    target: i + 1
                }
            );
        }
        assert_eq!(
            steps.last(),
            Some(&BloomStep::Composite { first_level: 0 })
        );
        assert_eq!(schedule.composite_levels(), 0..5);
    }

    #[test]
    fn blur_runs_coarsest_first() {
        let schedule = BloomSchedule::new(&options(false, false));
        let mut order: Vec<usize> =
            schedule.blur_passes().map(|p| p.level).collect();
        order.dedup();
        assert_eq!(order, vec![4, 3, 2, 1, 0]);
        // 4 iterations, 2 draws each, 5 levels
        assert_eq!(schedule.blur_pass_count(), 40);
        let slots: Vec<usize> = schedule.blur_passes().map(|p| p.slot).collect();
        assert_eq!(slots, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn half_resolution_never_writes_level_zero() {
        let schedule = BloomSchedule::new(&options(true, false));
        let written = schedule.written_levels();
        assert!(!written.contains(&0));
        assert_eq!(written, (1..PYRAMID_LEVELS).collect());
        assert_eq!(schedule.steps()[0], BloomStep::Threshold { target: 1 });
        assert_eq!(
            schedule.steps().last(),
            Some(&BloomStep::Composite { first_level: 1 })
        );
        for pass in schedule.blur_passes() {
            assert_ne!(pass.source, Surface::Level(0));
            assert_ne!(pass.source, Surface::Scratch(0));
        }
    }

    #[test]
    fn kernel_switch_only_changes_blur_parameters() {
        for half in [false, true] {
            let gaussian = BloomSchedule::new(&options(half, false));
            let kawase = BloomSchedule::new(&options(half, true));
            let a: Vec<String> = gaussian.steps().iter().map(shape).collect();
            let b: Vec<String> = kawase.steps().iter().map(shape).collect();
            assert_eq!(a, b);
            assert_eq!(gaussian.written_levels(), kawase.written_levels());
            assert!(kawase.blur_passes().all(|p| p.kernel == BlurKernel::Kawase));
        }
    }

    #[test]
    fn non_positive_iterations_skip_blur() {
        for iterations in [0, -2] {
            let schedule = BloomSchedule::new(&BloomOptions {
                blur_iterations: iterations,
                ..BloomOptions::default()
            });
            assert_eq!(schedule.blur_pass_count(), 0);
            assert_eq!(schedule.steps().len(), 1 + 4 + 1);
        }
    }

    #[test]
    fn gaussian_alternates_direction_and_returns_to_level() {
        let passes = blur_level(2, BlurKernel::Gaussian, 2, 10);
        assert_eq!(passes.len(), 4);
        assert_eq!(passes[0].direction, [1.0, 0.0]);
        assert_eq!(passes[1].direction, [0.0, 1.0]);
        assert_eq!(passes[3].target, Surface::Level(2));
        assert_eq!(passes[0].slot, 10);
    }

    #[test]
    fn kawase_offsets_grow() {
        let passes = blur_level(0, BlurKernel::Kawase, 2, 0);
        let offsets: Vec<f32> = passes.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(passes.last().map(|p| p.target), Some(Surface::Level(0)));
    }

    #[test]
    fn composite_weights_follow_scattering() {
        assert_eq!(composite_weights(0.0), [1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(composite_weights(-0.3), composite_weights(0.0));
        assert_eq!(composite_weights(1.5), composite_weights(1.0));
        for w in composite_weights(1.0) {
            assert!((w - 0.2).abs() < 1e-6);
        }
        let half = composite_weights(0.5);
        assert!((half.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(half.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn gaussian_weights_are_normalized() {
        let total = GAUSSIAN_WEIGHTS[0]
            + 2.0 * GAUSSIAN_WEIGHTS[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-3);
    }
}
