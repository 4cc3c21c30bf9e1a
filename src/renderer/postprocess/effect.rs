//! Effect contract shared by bloom, SSAO and FXAA.

use std::fmt;

use crate::gpu::render_context::RenderContext;

/// Identity of a post-process effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Pyramid bloom.
    Bloom,
    /// Screen-space ambient occlusion.
    Ssao,
    /// Fast approximate anti-aliasing.
    Fxaa,
}

impl EffectKind {
    /// Short display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bloom => "bloom",
            Self::Ssao => "ssao",
            Self::Fxaa => "fxaa",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Order in which effects are created and listed by the registry.
pub const REGISTRATION_ORDER: [EffectKind; 3] =
    [EffectKind::Bloom, EffectKind::Ssao, EffectKind::Fxaa];

/// An effect that `PostProcessStack::apply` runs every frame. FXAA is
/// registered but has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameEffect {
    /// Screen-space ambient occlusion over the G-buffer.
    Ssao,
    /// Pyramid bloom over the scene color.
    Bloom,
}

impl FrameEffect {
    /// The registry identity of this effect.
    #[must_use]
    pub fn kind(self) -> EffectKind {
        match self {
            Self::Ssao => EffectKind::Ssao,
            Self::Bloom => EffectKind::Bloom,
        }
    }
}

/// Effects run by `PostProcessStack::apply`, in order.
pub const FRAME_ORDER: [FrameEffect; 2] = [FrameEffect::Ssao, FrameEffect::Bloom];

/// Operations every effect supports regardless of its inputs.
///
/// `apply` lives on the concrete types since each effect consumes different
/// inputs. `clear` may be called any number of times.
pub trait PostProcessEffect {
    /// Which effect this is.
    fn kind(&self) -> EffectKind;

    /// Reset every owned target to transparent black.
    fn clear(&self, encoder: &mut wgpu::CommandEncoder);

    /// Rebuild bind groups that reference owned textures.
    fn refresh_texture_uniforms(&mut self, context: &RenderContext);

    /// Re-create every resolution-dependent resource.
    fn resize(&mut self, context: &RenderContext, width: u32, height: u32);

    /// The texture downstream passes read.
    fn output_view(&self) -> &wgpu::TextureView;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_order_is_a_subset_of_registration() {
        let kinds = FRAME_ORDER.map(FrameEffect::kind);
        assert!(kinds.iter().all(|k| REGISTRATION_ORDER.contains(k)));
        assert!(!kinds.contains(&EffectKind::Fxaa));
        assert_eq!(kinds, [EffectKind::Ssao, EffectKind::Bloom]);
    }

    #[test]
    fn names_are_distinct() {
        assert_eq!(EffectKind::Bloom.to_string(), "bloom");
        assert_ne!(EffectKind::Ssao.name(), EffectKind::Fxaa.name());
    }
}
