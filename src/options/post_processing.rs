use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::renderer::postprocess::bloom::schedule::BlurKernel;

/// Bloom effect parameters. All of them can change between frames; the
/// uniforms are refreshed on the next apply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Bloom", inline)]
#[serde(default)]
pub struct BloomOptions {
    /// Luminance above which a pixel contributes to bloom.
    #[schemars(title = "Threshold", range(min = 0.0, max = 16.0), extend("step" = 0.1))]
    pub threshold: f32,
    /// Blend weight of the composite.
    #[schemars(title = "Intensity", range(min = 0.0, max = 2.0), extend("step" = 0.01))]
    pub intensity: f32,
    /// Spread versus focus of the composite; clamped to [0, 1] at use.
    #[schemars(title = "Scattering", range(min = 0.0, max = 1.0), extend("step" = 0.01))]
    pub scattering: f32,
    /// Blur iterations per pyramid level. Zero or negative disables blur.
    #[schemars(title = "Blur Iterations", range(min = 0, max = 16))]
    pub blur_iterations: i32,
    /// Use the Kawase kernel instead of the separable Gaussian.
    #[schemars(title = "Kawase Blur")]
    pub use_kawase_blur: bool,
    /// Skip the full-resolution pyramid level.
    #[schemars(title = "Half Resolution")]
    pub half_resolution: bool,
}

impl Default for BloomOptions {
    fn default() -> Self {
        Self {
            threshold: 4.0,
            intensity: 0.2,
            scattering: 0.5,
            blur_iterations: 4,
            use_kawase_blur: false,
            half_resolution: false,
        }
    }
}

impl BloomOptions {
    /// The blur kernel selected by [`Self::use_kawase_blur`].
    #[must_use]
    pub fn blur_kernel(&self) -> BlurKernel {
        if self.use_kawase_blur {
            BlurKernel::Kawase
        } else {
            BlurKernel::Gaussian
        }
    }

    /// Scattering clamped to the range the composite shader accepts.
    #[must_use]
    pub fn clamped_scattering(&self) -> f32 {
        self.scattering.clamp(0.0, 1.0)
    }

    /// Blur iterations with non-positive counts mapped to zero.
    #[must_use]
    pub fn blur_iteration_count(&self) -> usize {
        self.blur_iterations.max(0) as usize
    }
}

/// Screen-space ambient occlusion parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "SSAO", inline)]
#[serde(default)]
pub struct SsaoOptions {
    /// Exponent applied to the AO factor.
    #[schemars(title = "Intensity", range(min = 1, max = 16))]
    pub intensity: i32,
    /// Tint of fully occluded pixels.
    #[schemars(skip)]
    pub color: [f32; 3],
    /// Sampling radius in view space.
    #[schemars(title = "Radius", range(min = 0.1, max = 10.0), extend("step" = 0.1))]
    pub sample_radius: f32,
    /// Depth bias to prevent self-occlusion.
    #[schemars(skip)]
    pub bias: f32,
    /// Kernel samples per pixel, capped at the kernel capacity.
    #[schemars(title = "Samples", range(min = 1, max = 64))]
    pub sample_amount: u32,
}

impl Default for SsaoOptions {
    fn default() -> Self {
        Self {
            intensity: 5,
            color: [1.0, 1.0, 1.0],
            sample_radius: 3.0,
            bias: 0.025,
            sample_amount: 64,
        }
    }
}

/// FXAA parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "FXAA", inline)]
#[serde(default)]
pub struct FxaaOptions {
    /// Whether the caller should run FXAA.
    #[schemars(title = "Enabled")]
    pub enabled: bool,
    /// Local contrast (relative to max luma) needed to treat a pixel as an
    /// edge.
    #[schemars(title = "Edge Threshold", range(min = 0.063, max = 0.333), extend("step" = 0.001))]
    pub edge_threshold: f32,
    /// Absolute contrast below which dark pixels are skipped.
    #[schemars(skip)]
    pub edge_threshold_min: f32,
    /// Amount of sub-pixel aliasing removal.
    #[schemars(title = "Subpixel", range(min = 0.0, max = 1.0), extend("step" = 0.05))]
    pub subpixel: f32,
}

impl Default for FxaaOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            edge_threshold: 0.125,
            edge_threshold_min: 0.0312,
            subpixel: 0.75,
        }
    }
}

/// Parameters of every post-process effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
#[schemars(title = "Effects", inline)]
#[serde(default)]
pub struct PostProcessingOptions {
    /// Bloom parameters.
    pub bloom: BloomOptions,
    /// SSAO parameters.
    pub ssao: SsaoOptions,
    /// FXAA parameters.
    pub fxaa: FxaaOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scattering_is_clamped() {
        let mut bloom = BloomOptions {
            scattering: 1.5,
            ..BloomOptions::default()
        };
        assert_eq!(bloom.clamped_scattering(), 1.0);
        bloom.scattering = -0.3;
        assert_eq!(bloom.clamped_scattering(), 0.0);
        bloom.scattering = 0.4;
        assert_eq!(bloom.clamped_scattering(), 0.4);
    }

    #[test]
    fn negative_iterations_mean_no_blur() {
        let bloom = BloomOptions {
            blur_iterations: -3,
            ..BloomOptions::default()
        };
        assert_eq!(bloom.blur_iteration_count(), 0);
    }

    #[test]
    fn kernel_follows_flag() {
        let mut bloom = BloomOptions::default();
        assert_eq!(bloom.blur_kernel(), BlurKernel::Gaussian);
        bloom.use_kawase_blur = true;
        assert_eq!(bloom.blur_kernel(), BlurKernel::Kawase);
    }
}
