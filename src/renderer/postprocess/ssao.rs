//! Screen-space ambient occlusion.
//!
//! Hemisphere-kernel AO over a depth + view-space-normal G-buffer, followed
//! by a 4x4 box blur that also applies the occlusion tint.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use super::effect::{EffectKind, PostProcessEffect};
use super::post_process::{GBufferViews, PostProcessCamera};
use super::screen_pass::draw_fullscreen;
use crate::error::PostFxError;
use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, depth_texture_2d, non_filtering_sampler,
    texture_2d, texture_2d_unfilterable, uniform_buffer, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::texture::{Extent, RenderTarget};
use crate::options::SsaoOptions;

/// Kernel capacity; `sample_amount` is capped at this.
pub const KERNEL_SIZE: usize = 64;
/// Side of the square rotation-noise texture.
pub const NOISE_SIZE: u32 = 4;

const KERNEL_SEED: u64 = 0x55A0_5EED;
const NOISE_SEED: u64 = 0x4E01_5E00;

const AO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// SSAO parameters uniform - must match WGSL struct
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SsaoParams {
    proj: [[f32; 4]; 4],
    inv_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    screen_size: [f32; 2],
    radius: f32,
    bias: f32,
    color: [f32; 4],
    power: f32,
    sample_count: u32,
    near: f32,
    far: f32,
}

/// Hemisphere sample kernel: every sample has `z >= 0` and length at most
/// one, and samples cluster toward the origin as the index grows smaller.
#[must_use]
pub fn generate_kernel() -> [[f32; 4]; KERNEL_SIZE] {
    let mut rng = StdRng::seed_from_u64(KERNEL_SEED);
    let mut kernel = [[0.0f32; 4]; KERNEL_SIZE];

    for (i, sample) in kernel.iter_mut().enumerate() {
        let direction = Vec3::new(
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>() * 2.0 - 1.0,
            rng.random::<f32>(),
        )
        .try_normalize()
        .unwrap_or(Vec3::Z);
        let t = i as f32 / KERNEL_SIZE as f32;
        let scale = 0.1 + (1.0 - 0.1) * t * t;
        let v = direction * rng.random::<f32>() * scale;
        *sample = [v.x, v.y, v.z, 0.0];
    }

    kernel
}

/// Unit rotation vectors around +Z, one per noise texel.
#[must_use]
pub fn generate_noise() -> [[f32; 2]; (NOISE_SIZE * NOISE_SIZE) as usize] {
    let mut rng = StdRng::seed_from_u64(NOISE_SEED);
    std::array::from_fn(|_| {
        let x = rng.random::<f32>() * 2.0 - 1.0;
        let y = rng.random::<f32>() * 2.0 - 1.0;
        let len = x.hypot(y);
        if len > 0.0 {
            [x / len, y / len]
        } else {
            [1.0, 0.0]
        }
    })
}

fn encode_noise(noise: &[[f32; 2]]) -> Vec<u8> {
    noise
        .iter()
        .flat_map(|&[x, y]| {
            [
                ((x * 0.5 + 0.5) * 255.0).round() as u8,
                ((y * 0.5 + 0.5) * 255.0).round() as u8,
                128,
                255,
            ]
        })
        .collect()
}

/// Samples actually taken per pixel.
fn sample_count(options: &SsaoOptions) -> u32 {
    options.sample_amount.min(KERNEL_SIZE as u32)
}

/// SSAO effect.
pub struct SsaoPass {
    /// Parameters uploaded on every [`Self::apply`].
    pub settings: SsaoOptions,

    ssao_pipeline: wgpu::RenderPipeline,
    ssao_layout: wgpu::BindGroupLayout,
    blur_pipeline: wgpu::RenderPipeline,
    blur_layout: wgpu::BindGroupLayout,
    blur_bind_group: wgpu::BindGroup,

    kernel_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    /// Keeps the texture behind `noise_view` alive.
    _noise_texture: wgpu::Texture,
    noise_view: wgpu::TextureView,
    noise_sampler: wgpu::Sampler,

    raw: RenderTarget,
    output: RenderTarget,
}

impl SsaoPass {
    /// Create kernel, noise, pipelines and targets for a `width`x`height`
    /// G-buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if an SSAO shader fails to
    /// compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        width: u32,
        height: u32,
    ) -> Result<Self, PostFxError> {
        let device = &context.device;

        let kernel = generate_kernel();
        let kernel_buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("SSAO Kernel"),
                contents: bytemuck::cast_slice(&kernel),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SSAO Params"),
            size: size_of::<SsaoParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (noise_texture, noise_view) = Self::create_noise_texture(context);
        let noise_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SSAO Noise Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let ssao_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("SSAO Bind Group Layout"),
                entries: &[
                    depth_texture_2d(0),
                    texture_2d(1),
                    texture_2d_unfilterable(2),
                    non_filtering_sampler(3),
                    uniform_buffer(4),
                    uniform_buffer(5),
                ],
            });
        let blur_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("SSAO Blur Layout"),
                entries: &[texture_2d(0), uniform_buffer(1)],
            });

        let shader = composer.compose(device, Shader::Ssao)?;
        let ssao_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "SSAO",
                shader: &shader,
                format: AO_FORMAT,
                blend: None,
                bind_group_layouts: &[&ssao_layout],
            },
        );
        let shader = composer.compose(device, Shader::SsaoBlur)?;
        let blur_pipeline = create_screen_space_pipeline(
            device,
            &ScreenSpacePipelineDef {
                label: "SSAO Blur",
                shader: &shader,
                format: OUTPUT_FORMAT,
                blend: None,
                bind_group_layouts: &[&blur_layout],
            },
        );

        let (raw, output) = Self::create_targets(device, width, height);
        let blur_bind_group = Self::create_blur_bind_group(
            device,
            &blur_layout,
            &raw,
            &params_buffer,
        );

        Ok(Self {
            settings: SsaoOptions::default(),
            ssao_pipeline,
            ssao_layout,
            blur_pipeline,
            blur_layout,
            blur_bind_group,
            kernel_buffer,
            params_buffer,
            _noise_texture: noise_texture,
            noise_view,
            noise_sampler,
            raw,
            output,
        })
    }

    fn create_targets(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (RenderTarget, RenderTarget) {
        let extent = Extent::new(width, height);
        (
            RenderTarget::new(device, "SSAO Raw", extent, AO_FORMAT),
            RenderTarget::new(device, "SSAO Output", extent, OUTPUT_FORMAT),
        )
    }

    fn create_noise_texture(
        context: &RenderContext,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let size = wgpu::Extent3d {
            width: NOISE_SIZE,
            height: NOISE_SIZE,
            depth_or_array_layers: 1,
        };
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SSAO Noise Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &encode_noise(&generate_noise()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(NOISE_SIZE * 4),
                rows_per_image: Some(NOISE_SIZE),
            },
            size,
        );
        let view = texture.create_view(&Default::default());
        (texture, view)
    }

    fn create_blur_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        raw: &RenderTarget,
        params_buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SSAO Blur Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&raw.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    fn params(&self, camera: &PostProcessCamera) -> SsaoParams {
        let extent = self.output.extent().allocation();
        let [r, g, b] = self.settings.color;
        SsaoParams {
            proj: camera.proj.to_cols_array_2d(),
            inv_proj: camera.proj.inverse().to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            screen_size: [extent.width as f32, extent.height as f32],
            radius: self.settings.sample_radius,
            bias: self.settings.bias,
            color: [r, g, b, 1.0],
            power: self.settings.intensity as f32,
            sample_count: sample_count(&self.settings),
            near: camera.znear,
            far: camera.zfar,
        }
    }

    /// Record the AO and blur passes for `gbuffer` seen through `camera`.
    pub fn apply(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        camera: &PostProcessCamera,
        gbuffer: &GBufferViews<'_>,
    ) {
        context.queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&self.params(camera)),
        );

        let bind_group =
            context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("SSAO Bind Group"),
                    layout: &self.ssao_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(
                                gbuffer.depth,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(
                                gbuffer.normal,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(
                                &self.noise_view,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(
                                &self.noise_sampler,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: self.kernel_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: self.params_buffer.as_entire_binding(),
                        },
                    ],
                });

        draw_fullscreen(
            encoder,
            "SSAO Pass",
            &self.raw.view,
            &self.ssao_pipeline,
            &bind_group,
            &[],
        );
        draw_fullscreen(
            encoder,
            "SSAO Blur Pass",
            &self.output.view,
            &self.blur_pipeline,
            &self.blur_bind_group,
            &[],
        );
    }
}

impl PostProcessEffect for SsaoPass {
    fn kind(&self) -> EffectKind {
        EffectKind::Ssao
    }

    fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        self.raw
            .clear(encoder, "SSAO Clear", wgpu::Color::TRANSPARENT);
        self.output
            .clear(encoder, "SSAO Clear", wgpu::Color::TRANSPARENT);
    }

    fn refresh_texture_uniforms(&mut self, context: &RenderContext) {
        self.blur_bind_group = Self::create_blur_bind_group(
            &context.device,
            &self.blur_layout,
            &self.raw,
            &self.params_buffer,
        );
    }

    fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        let (raw, output) = Self::create_targets(&context.device, width, height);
        self.raw = raw;
        self.output = output;
        self.refresh_texture_uniforms(context);
        log::debug!("ssao resized to {width}x{height}");
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
        assert_eq!(size_of::<SsaoParams>(), 240);
    }

    #[test]
    fn kernel_is_deterministic() {
        assert_eq!(generate_kernel(), generate_kernel());
        assert_eq!(generate_noise(), generate_noise());
    }

    #[test]
    fn kernel_lies_in_unit_hemisphere() {
        for (i, s) in generate_kernel().iter().enumerate() {
            let v = Vec3::new(s[0], s[1], s[2]);
            assert!(v.z >= 0.0, "sample {i} below the surface");
            assert!(v.length() <= 1.0 + 1e-6, "sample {i} too long");
            let t = i as f32 / KERNEL_SIZE as f32;
            assert!(v.length() <= 0.1 + 0.9 * t * t + 1e-6);
            assert_eq!(s[3], 0.0);
        }
    }

    #[test]
    fn noise_vectors_are_unit_and_encode_to_rgba() {
        let noise = generate_noise();
        for [x, y] in noise {
            assert!((x.hypot(y) - 1.0).abs() < 1e-5);
        }
        let bytes = encode_noise(&noise);
        assert_eq!(bytes.len(), (NOISE_SIZE * NOISE_SIZE * 4) as usize);
        assert!(bytes.chunks_exact(4).all(|px| px[2] == 128 && px[3] == 255));
    }

    #[test]
    fn sample_amount_is_capped() {
        let mut options = SsaoOptions::default();
        assert_eq!(sample_count(&options), 64);
        options.sample_amount = 500;
        assert_eq!(sample_count(&options), KERNEL_SIZE as u32);
        options.sample_amount = 8;
        assert_eq!(sample_count(&options), 8);
    }
}
