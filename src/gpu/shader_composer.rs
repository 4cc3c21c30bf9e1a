use std::borrow::Cow;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor, ShaderLanguage,
    ShaderType,
};

use crate::error::PostFxError;

/// Screen-space shaders known to the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// Bright-pass extraction into the top pyramid level.
    BloomThreshold,
    /// Single bilinear tap copy used by the downsample chain.
    BlitCopy,
    /// Separable 9-tap Gaussian blur.
    GaussianBlur,
    /// Four-tap Kawase blur.
    KawaseBlur,
    /// Weighted sum of all pyramid levels.
    BloomComposite,
    /// Hemisphere-kernel ambient occlusion.
    Ssao,
    /// 4x4 box blur over the raw AO term.
    SsaoBlur,
    /// Fast approximate anti-aliasing.
    Fxaa,
}

impl Shader {
    /// Every shader, in declaration order.
    pub const ALL: [Shader; 8] = [
        Shader::BloomThreshold,
        Shader::BlitCopy,
        Shader::GaussianBlur,
        Shader::KawaseBlur,
        Shader::BloomComposite,
        Shader::Ssao,
        Shader::SsaoBlur,
        Shader::Fxaa,
    ];

    /// Human-readable label used for the wgpu module.
    pub fn label(self) -> &'static str {
        match self {
            Self::BloomThreshold => "Bloom Threshold Shader",
            Self::BlitCopy => "Blit Copy Shader",
            Self::GaussianBlur => "Gaussian Blur Shader",
            Self::KawaseBlur => "Kawase Blur Shader",
            Self::BloomComposite => "Bloom Composite Shader",
            Self::Ssao => "SSAO Shader",
            Self::SsaoBlur => "SSAO Blur Shader",
            Self::Fxaa => "FXAA Shader",
        }
    }

    /// Path reported in composer diagnostics.
    pub fn file_path(self) -> &'static str {
        match self {
            Self::BloomThreshold => "screen/bloom_threshold.wgsl",
            Self::BlitCopy => "screen/blit_copy.wgsl",
            Self::GaussianBlur => "screen/gaussian_blur.wgsl",
            Self::KawaseBlur => "screen/kawase_blur.wgsl",
            Self::BloomComposite => "screen/bloom_composite.wgsl",
            Self::Ssao => "screen/ssao.wgsl",
            Self::SsaoBlur => "screen/ssao_blur.wgsl",
            Self::Fxaa => "screen/fxaa.wgsl",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::BloomThreshold => include_str!(
                "../../assets/shaders/screen/bloom_threshold.wgsl"
            ),
            Self::BlitCopy => {
                include_str!("../../assets/shaders/screen/blit_copy.wgsl")
            }
            Self::GaussianBlur => {
                include_str!("../../assets/shaders/screen/gaussian_blur.wgsl")
            }
            Self::KawaseBlur => {
                include_str!("../../assets/shaders/screen/kawase_blur.wgsl")
            }
            Self::BloomComposite => include_str!(
                "../../assets/shaders/screen/bloom_composite.wgsl"
            ),
            Self::Ssao => include_str!("../../assets/shaders/screen/ssao.wgsl"),
            Self::SsaoBlur => {
                include_str!("../../assets/shaders/screen/ssao_blur.wgsl")
            }
            Self::Fxaa => include_str!("../../assets/shaders/screen/fxaa.wgsl"),
        }
    }
}

/// Shared module definition: (source, file_path)
struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

const SHARED_MODULES: &[ModuleDef] = &[
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/fullscreen.wgsl"),
        file_path: "modules/fullscreen.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/color.wgsl"),
        file_path: "modules/color.wgsl",
    },
];

/// Wraps `naga_oil::compose::Composer` to provide shader composition with
/// `#import` support.
///
/// Shared WGSL modules are registered at construction time. Consuming shaders
/// use `#import postfx::module_name::{item}` to pull in shared code. The
/// composer produces `naga::Module` IR directly, skipping WGSL re-parse at
/// runtime.
pub struct ShaderComposer {
    composer: Composer,
}

impl ShaderComposer {
    /// Create a composer with every shared module registered.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if a shared module fails to
    /// parse.
    pub fn new() -> Result<Self, PostFxError> {
        let mut composer = Composer::default();

        for m in SHARED_MODULES {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(|e| PostFxError::ShaderCompose {
                    shader: m.file_path,
                    message: e.to_string(),
                })?;
        }

        Ok(Self { composer })
    }

    /// Compose `shader` into a `wgpu::ShaderModule` ready for pipeline
    /// creation.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if composition fails.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        shader: Shader,
    ) -> Result<wgpu::ShaderModule, PostFxError> {
        let naga_module = self.compose_naga(shader)?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader.label()),
            source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
        }))
    }

    /// Compose `shader` into a `naga::Module` without creating a wgpu shader
    /// module. Useful for testing shader composition without a GPU device.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if composition fails.
    pub fn compose_naga(
        &mut self,
        shader: Shader,
    ) -> Result<naga::Module, PostFxError> {
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source: shader.source(),
                file_path: shader.file_path(),
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(|e| PostFxError::ShaderCompose {
                shader: shader.file_path(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shaders_compose() {
        let mut composer = ShaderComposer::new().unwrap();
        for shader in Shader::ALL {
            let module = composer
                .compose_naga(shader)
                .unwrap_or_else(|e| panic!("{e}"));
            let entry_points: Vec<&str> = module
                .entry_points
                .iter()
                .map(|ep| ep.name.as_str())
                .collect();
            assert!(
                entry_points.contains(&"vs_main"),
                "{} missing vs_main",
                shader.file_path()
            );
            assert!(
                entry_points.contains(&"fs_main"),
                "{} missing fs_main",
                shader.file_path()
            );
        }
    }

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<&str> =
            Shader::ALL.iter().map(|s| s.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), Shader::ALL.len());
    }
}
