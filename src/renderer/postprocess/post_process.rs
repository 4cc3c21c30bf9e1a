use glam::Mat4;

use super::bloom::BloomPass;
use super::effect::{
    EffectKind, FrameEffect, PostProcessEffect, FRAME_ORDER,
    REGISTRATION_ORDER,
};
use super::fxaa::FxaaPass;
use super::ssao::SsaoPass;
use crate::error::PostFxError;
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::ShaderComposer;
use crate::options::PostProcessingOptions;

/// Camera parameters needed for post-processing passes.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessCamera {
    /// Projection matrix.
    pub proj: Mat4,
    /// World-to-view matrix.
    pub view: Mat4,
    /// Near clipping plane distance.
    pub znear: f32,
    /// Far clipping plane distance.
    pub zfar: f32,
}

/// G-buffer inputs of the SSAO pass.
#[derive(Debug, Clone, Copy)]
pub struct GBufferViews<'a> {
    /// Depth attachment (`Depth32Float` or another depth format).
    pub depth: &'a wgpu::TextureView,
    /// View-space normals encoded in a float color target.
    pub normal: &'a wgpu::TextureView,
}

/// Everything one frame of the stack reads.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessContext<'a> {
    /// Camera the G-buffer was rendered with.
    pub camera: &'a PostProcessCamera,
    /// Depth and normal G-buffer.
    pub gbuffer: GBufferViews<'a>,
    /// Full-resolution HDR scene color.
    pub scene_color: &'a wgpu::TextureView,
}

/// Owns every post-process effect and runs them in frame order.
///
/// Effects are registered as bloom, SSAO, FXAA, but [`Self::apply`] runs
/// only SSAO then bloom. FXAA is constructed, resized and cleared with the
/// rest of the stack but never invoked by `apply`; call
/// [`Self::apply_fxaa`] to run it explicitly.
pub struct PostProcessStack {
    bloom: BloomPass,
    ssao: SsaoPass,
    fxaa: FxaaPass,
}

impl PostProcessStack {
    /// Build every effect for a `width`x`height` frame.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if any effect shader fails to
    /// compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        width: u32,
        height: u32,
    ) -> Result<Self, PostFxError> {
        let bloom = BloomPass::new(context, composer, width, height)?;
        let ssao = SsaoPass::new(context, composer, width, height)?;
        let fxaa = FxaaPass::new(context, composer, width, height)?;

        let stack = Self { bloom, ssao, fxaa };
        let registered: Vec<&str> =
            stack.effects().map(|(kind, _)| kind.name()).collect();
        log::debug!(
            "post-process stack {width}x{height}: registered {registered:?}"
        );
        log::info!(
            "post-process frame order is {FRAME_ORDER:?}; fxaa is registered \
             but only runs through apply_fxaa"
        );
        Ok(stack)
    }

    /// Run every effect of [`FRAME_ORDER`] for one frame.
    pub fn apply(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        frame: &PostProcessContext<'_>,
    ) {
        for effect in FRAME_ORDER {
            log::trace!("post-process apply {}", effect.kind());
            match effect {
                FrameEffect::Ssao => self.ssao.apply(
                    context,
                    encoder,
                    frame.camera,
                    &frame.gbuffer,
                ),
                FrameEffect::Bloom => {
                    self.bloom.apply(context, encoder, frame.scene_color);
                }
            }
        }
    }

    /// Anti-alias `source` into the FXAA output target.
    pub fn apply_fxaa(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
    ) {
        self.fxaa.apply(context, encoder, source);
    }

    /// Reset the SSAO and bloom targets to transparent black.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        self.ssao.clear(encoder);
        self.bloom.clear(encoder);
    }

    /// Rebuild texture bindings of every effect. Call after any pipeline
    /// rebuild.
    pub fn refresh_texture_uniforms(&mut self, context: &RenderContext) {
        self.bloom.refresh_texture_uniforms(context);
        self.ssao.refresh_texture_uniforms(context);
        self.fxaa.refresh_texture_uniforms(context);
    }

    /// Registered effects in [`REGISTRATION_ORDER`].
    pub fn effects(
        &self,
    ) -> impl Iterator<Item = (EffectKind, &dyn PostProcessEffect)> {
        REGISTRATION_ORDER
            .into_iter()
            .map(move |kind| (kind, self.effect(kind)))
    }

    /// The effect registered as `kind`.
    pub fn effect(&self, kind: EffectKind) -> &dyn PostProcessEffect {
        match kind {
            EffectKind::Bloom => &self.bloom,
            EffectKind::Ssao => &self.ssao,
            EffectKind::Fxaa => &self.fxaa,
        }
    }

    /// Copy tunable parameters into the effects. Uniforms are written on
    /// the next apply.
    pub fn apply_options(&mut self, options: &PostProcessingOptions) {
        self.bloom.settings = options.bloom;
        self.ssao.settings = options.ssao.clone();
        self.fxaa.settings = options.fxaa.clone();
    }

    /// Re-create every resolution-dependent resource.
    pub fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        self.bloom.resize(context, width, height);
        self.ssao.resize(context, width, height);
        self.fxaa.resize(context, width, height);
    }

    /// The bloom effect.
    pub fn bloom(&self) -> &BloomPass {
        &self.bloom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::readback::read_rgba16f;
    use crate::gpu::texture::{Extent, RenderTarget};

    const WIDTH: u32 = 32;
    const HEIGHT: u32 = 24;

    fn depth_view(context: &RenderContext, extent: Extent) -> wgpu::TextureView {
        context
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Test Depth"),
                size: extent.to_wgpu(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Depth32Float,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn clear_depth(encoder: &mut wgpu::CommandEncoder, depth: &wgpu::TextureView) {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Test Depth Clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(
                wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                },
            ),
            ..Default::default()
        });
    }

    #[test]
    fn gpu_stack_runs_black_frame_to_black_bloom() {
        let Some(context) =
            pollster::block_on(RenderContext::new_headless()).ok()
        else {
            return;
        };
        let mut composer = ShaderComposer::new().unwrap();
        let mut stack =
            PostProcessStack::new(&context, &mut composer, WIDTH, HEIGHT)
                .unwrap();

        let kinds: Vec<_> = stack.effects().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, REGISTRATION_ORDER);
        for (kind, effect) in stack.effects() {
            assert_eq!(effect.kind(), kind);
        }

        let extent = Extent::new(WIDTH, HEIGHT);
        let depth = depth_view(&context, extent);
        let normal = RenderTarget::hdr(&context.device, "Test Normal", extent);
        let scene = RenderTarget::hdr(&context.device, "Test Scene", extent);
        let camera = PostProcessCamera {
            proj: Mat4::perspective_rh(1.0, 4.0 / 3.0, 0.1, 100.0),
            view: Mat4::IDENTITY,
            znear: 0.1,
            zfar: 100.0,
        };

        let mut encoder = context.create_encoder();
        clear_depth(&mut encoder, &depth);
        normal.clear(&mut encoder, "Test Clear", wgpu::Color::TRANSPARENT);
        scene.clear(&mut encoder, "Test Clear", wgpu::Color::TRANSPARENT);
        stack.clear(&mut encoder);
        stack.apply(
            &context,
            &mut encoder,
            &PostProcessContext {
                camera: &camera,
                gbuffer: GBufferViews {
                    depth: &depth,
                    normal: &normal.view,
                },
                scene_color: &scene.view,
            },
        );
        for (kind, effect) in stack.effects() {
            if kind != EffectKind::Fxaa {
                stack.apply_fxaa(&context, &mut encoder, effect.output_view());
            }
        }
        context.submit(encoder);

        let bloom = read_rgba16f(&context, stack.bloom().output()).unwrap();
        assert_eq!(bloom.len(), extent.pixel_count());
        assert!(bloom.iter().all(|p| *p == [0.0; 4]));

        let mut options = PostProcessingOptions::default();
        options.bloom.intensity = 2.0;
        stack.apply_options(&options);
        assert_eq!(stack.bloom().settings, options.bloom);
        stack.refresh_texture_uniforms(&context);
        stack.resize(&context, 16, 8);
        assert_eq!(stack.bloom().output().extent(), Extent::new(16, 8));
    }
}
