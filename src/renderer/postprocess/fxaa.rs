//! FXAA post-process pass: screen-space anti-aliasing.
//!
//! Reads a color image and writes an anti-aliased copy into an owned target
//! in the context's output format.

use super::effect::{EffectKind, PostProcessEffect};
use super::screen_pass::draw_fullscreen;
use crate::error::PostFxError;
use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, filtering_sampler, linear_sampler,
    texture_2d, uniform_buffer, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::texture::{Extent, RenderTarget};
use crate::options::FxaaOptions;

/// FXAA uniform - must match WGSL struct
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FxaaParams {
    inverse_screen_size: [f32; 2],
    edge_threshold: f32,
    edge_threshold_min: f32,
    subpixel: f32,
    _pad: [f32; 3],
}

impl FxaaParams {
    fn new(options: &FxaaOptions, extent: Extent) -> Self {
        Self {
            inverse_screen_size: extent.texel_size(),
            edge_threshold: options.edge_threshold,
            edge_threshold_min: options.edge_threshold_min,
            subpixel: options.subpixel,
            _pad: [0.0; 3],
        }
    }
}

/// FXAA effect.
pub struct FxaaPass {
    /// Parameters uploaded on every [`Self::apply`].
    pub settings: FxaaOptions,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    params_buffer: wgpu::Buffer,
    output: RenderTarget,
}

impl FxaaPass {
    /// Build the pipeline and output target.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if the FXAA shader fails to
    /// compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        width: u32,
        height: u32,
    ) -> Result<Self, PostFxError> {
        let device = &context.device;
        let sampler = linear_sampler(device, "FXAA Sampler");
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FXAA Params"),
            size: size_of::<FxaaParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("FXAA Bind Group Layout"),
                entries: &[
                    texture_2d(0),
                    filtering_sampler(1),
                    uniform_buffer(2),
                ],
            });

        let shader = composer.compose(device, Shader::Fxaa)?;
        let pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "FXAA",
                shader: &shader,
                format: context.format(),
                blend: None,
                bind_group_layouts: &[&bind_group_layout],
            },
        );

        let output = Self::create_output(context, width, height);

        Ok(Self {
            settings: FxaaOptions::default(),
            pipeline,
            bind_group_layout,
            sampler,
            params_buffer,
            output,
        })
    }

    fn create_output(
        context: &RenderContext,
        width: u32,
        height: u32,
    ) -> RenderTarget {
        RenderTarget::new(
            &context.device,
            "FXAA Output",
            Extent::new(width, height),
            context.format(),
        )
    }

    /// Anti-alias `source` into the owned output target.
    pub fn apply(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
    ) {
        let params = FxaaParams::new(&self.settings, self.output.extent());
        context.queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&params),
        );

        let bind_group =
            context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("FXAA Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                &self.sampler,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: self.params_buffer.as_entire_binding(),
                        },
                    ],
                });

        draw_fullscreen(
            encoder,
            "FXAA Pass",
            &self.output.view,
            &self.pipeline,
            &bind_group,
            &[],
        );
    }
}

impl PostProcessEffect for FxaaPass {
    fn kind(&self) -> EffectKind {
        EffectKind::Fxaa
    }

    fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        self.output
            .clear(encoder, "FXAA Clear", wgpu::Color::TRANSPARENT);
    }

    // Only the per-apply bind group references textures.
    fn refresh_texture_uniforms(&mut self, _context: &RenderContext) {}

    fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        self.output = Self::create_output(context, width, height);
        log::debug!("fxaa resized to {width}x{height}");
    }

    fn output_view(&self) -> &wgpu::TextureView {
        &self.output.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_wgsl_size() {
        assert_eq!(size_of::<FxaaParams>(), 32);
    }

    #[test]
    fn params_carry_inverse_size() {
        let params =
            FxaaParams::new(&FxaaOptions::default(), Extent::new(1920, 1080));
        assert_eq!(params.inverse_screen_size, [1.0 / 1920.0, 1.0 / 1080.0]);
        assert_eq!(params.edge_threshold, 0.125);
        assert_eq!(params.subpixel, 0.75);
    }
}
