//! Pyramid bloom.
//!
//! Pipeline: threshold into the top used level → blit-copy downsample chain
//! → blur every level in place (coarsest first) → weighted composite of all
//! used levels into a full-resolution target. The pass order comes from
//! [`schedule::BloomSchedule`]; [`software::SoftwareBloom`] runs the same
//! schedule on the CPU.

pub mod pyramid;
pub mod schedule;
pub mod software;

use pyramid::{BloomPyramid, PyramidLayout, PYRAMID_COUNT};
use schedule::{
    composite_weights, BloomSchedule, BloomStep, BlurKernel, BlurPass, Surface,
};

use super::effect::{EffectKind, PostProcessEffect};
use super::screen_pass::draw_fullscreen;
use crate::error::PostFxError;
use crate::gpu::dynamic_buffer::UniformSlots;
use crate::gpu::pipeline_helpers::{
    create_screen_space_pipeline, dynamic_uniform_buffer, filtering_sampler,
    linear_sampler, texture_2d, uniform_buffer, ScreenSpacePipelineDef,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::texture::RenderTarget;
use crate::options::BloomOptions;

const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Threshold uniform, must match WGSL `ThresholdParams`.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ThresholdParams {
    threshold: f32,
    _pad: [f32; 3],
}

/// Per-draw blur uniform, must match WGSL `BlurParams`.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    texel_size: [f32; 2],
    direction: [f32; 2],
    offset: f32,
    _pad: [f32; 3],
}

/// Composite uniform, must match WGSL `CompositeParams`. The five level
/// weights are packed into two vec4s.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeParams {
    intensity: f32,
    scattering: f32,
    _pad: [f32; 2],
    weights: [[f32; 4]; 2],
}

impl CompositeParams {
    fn new(options: &BloomOptions) -> Self {
        let mut weights = [[0.0; 4]; 2];
        for (i, w) in composite_weights(options.scattering).into_iter().enumerate()
        {
            weights[i / 4][i % 4] = w;
        }
        Self {
            intensity: options.intensity,
            scattering: options.clamped_scattering(),
            _pad: [0.0; 2],
            weights,
        }
    }
}

/// Bind groups that reference pyramid textures. Rebuilt on resize and after
/// the blur uniform buffer reallocates.
struct LevelBindings {
    /// `blit[i]` samples level `i`.
    blit: Vec<wgpu::BindGroup>,
    /// `blur[i][0]` samples level `i`, `blur[i][1]` its scratch.
    blur: Vec<[wgpu::BindGroup; 2]>,
    /// Composite over levels `0..5` and `1..6`.
    composite: [wgpu::BindGroup; 2],
}

/// GPU bloom effect.
pub struct BloomPass {
    /// Parameters uploaded on every [`Self::apply`].
    pub settings: BloomOptions,

    sampler: wgpu::Sampler,

    threshold_layout: wgpu::BindGroupLayout,
    threshold_pipeline: wgpu::RenderPipeline,
    threshold_buffer: wgpu::Buffer,

    blit_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,

    blur_layout: wgpu::BindGroupLayout,
    gaussian_pipeline: wgpu::RenderPipeline,
    kawase_pipeline: wgpu::RenderPipeline,
    blur_slots: UniformSlots<BlurParams>,

    composite_layout: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::RenderPipeline,
    composite_buffer: wgpu::Buffer,

    pyramid: BloomPyramid,
    output: RenderTarget,
    bindings: LevelBindings,
}

impl BloomPass {
    /// Build pipelines and allocate the pyramid and composite target for a
    /// `width`x`height` scene.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::ShaderCompose`] if a bloom shader fails to
    /// compose.
    pub fn new(
        context: &RenderContext,
        composer: &mut ShaderComposer,
        width: u32,
        height: u32,
    ) -> Result<Self, PostFxError> {
        let device = &context.device;
        let sampler = linear_sampler(device, "Bloom Sampler");

        let threshold_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bloom Threshold Layout"),
                entries: &[
                    texture_2d(0),
                    filtering_sampler(1),
                    uniform_buffer(2),
                ],
            });
        let blit_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bloom Blit Layout"),
                entries: &[texture_2d(0), filtering_sampler(1)],
            });
        let blur_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bloom Blur Layout"),
                entries: &[
                    texture_2d(0),
                    filtering_sampler(1),
                    dynamic_uniform_buffer(
                        2,
                        size_of::<BlurParams>() as u64,
                    ),
                ],
            });
        let mut composite_entries: Vec<wgpu::BindGroupLayoutEntry> =
            (0..PYRAMID_COUNT as u32).map(texture_2d).collect();
        composite_entries.push(filtering_sampler(PYRAMID_COUNT as u32));
        composite_entries.push(uniform_buffer(PYRAMID_COUNT as u32 + 1));
        let composite_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bloom Composite Layout"),
                entries: &composite_entries,
            });

        let mut pipeline = |label: &str,
                            shader: Shader,
                            layout: &wgpu::BindGroupLayout|
         -> Result<wgpu::RenderPipeline, PostFxError> {
            let module = composer.compose(device, shader)?;
            Ok(create_screen_space_pipeline(
                device,
                &ScreenSpacePipelineDef {
                    label,
                    shader: &module,
                    format: HDR_FORMAT,
                    blend: None,
                    bind_group_layouts: &[layout],
                },
            ))
        };
        let threshold_pipeline = pipeline(
            "Bloom Threshold",
            Shader::BloomThreshold,
            &threshold_layout,
        )?;
        let blit_pipeline =
            pipeline("Bloom Downsample", Shader::BlitCopy, &blit_layout)?;
        let gaussian_pipeline =
            pipeline("Bloom Gaussian Blur", Shader::GaussianBlur, &blur_layout)?;
        let kawase_pipeline =
            pipeline("Bloom Kawase Blur", Shader::KawaseBlur, &blur_layout)?;
        let composite_pipeline = pipeline(
            "Bloom Composite",
            Shader::BloomComposite,
            &composite_layout,
        )?;

        let threshold_buffer = uniform(
            device,
            "Bloom Threshold Params",
            size_of::<ThresholdParams>() as u64,
        );
        let composite_buffer = uniform(
            device,
            "Bloom Composite Params",
            size_of::<CompositeParams>() as u64,
        );

        let settings = BloomOptions::default();
        let blur_slots = UniformSlots::new(
            device,
            "Bloom Blur Params",
            BloomSchedule::new(&settings).blur_pass_count(),
            context.uniform_offset_alignment(),
        );

        let pyramid =
            BloomPyramid::new(device, PyramidLayout::new(width, height));
        let output = RenderTarget::hdr(
            device,
            "Bloom Composite",
            pyramid.layout().base(),
        );

        let bindings = LevelBindings::new(
            device,
            &Layouts {
                blit: &blit_layout,
                blur: &blur_layout,
                composite: &composite_layout,
            },
            &pyramid,
            &sampler,
            &blur_slots,
            &composite_buffer,
        );

        log::debug!("bloom initialized at {width}x{height}");

        Ok(Self {
            settings,
            sampler,
            threshold_layout,
            threshold_pipeline,
            threshold_buffer,
            blit_layout,
            blit_pipeline,
            blur_layout,
            gaussian_pipeline,
            kawase_pipeline,
            blur_slots,
            composite_layout,
            composite_pipeline,
            composite_buffer,
            pyramid,
            output,
            bindings,
        })
    }

    /// Record the whole bloom pipeline for `source` (the full-resolution
    /// scene color) into `encoder`.
    pub fn apply(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
    ) {
        let schedule = BloomSchedule::new(&self.settings);
        self.write_uniforms(context, &schedule);

        let threshold_bind_group =
            context
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Bloom Threshold Bind Group"),
                    layout: &self.threshold_layout,
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
                            resource: self.threshold_buffer.as_entire_binding(),
                        },
                    ],
                });

        log::trace!(
            "bloom: {} steps ({} blur draws)",
            schedule.steps().len(),
            schedule.blur_pass_count()
        );
        for step in schedule.steps() {
            self.record(encoder, step, &threshold_bind_group);
        }
    }

    fn write_uniforms(
        &mut self,
        context: &RenderContext,
        schedule: &BloomSchedule,
    ) {
        let threshold = ThresholdParams {
            threshold: self.settings.threshold,
            _pad: [0.0; 3],
        };
        context.queue.write_buffer(
            &self.threshold_buffer,
            0,
            bytemuck::bytes_of(&threshold),
        );
        context.queue.write_buffer(
            &self.composite_buffer,
            0,
            bytemuck::bytes_of(&CompositeParams::new(&self.settings)),
        );

        let layout = *self.pyramid.layout();
        let blur: Vec<BlurParams> = schedule
            .blur_passes()
            .map(|pass| BlurParams {
                texel_size: layout
                    .level(pass.level)
                    .unwrap_or_default()
                    .texel_size(),
                direction: pass.direction,
                offset: pass.offset,
                _pad: [0.0; 3],
            })
            .collect();
        if self.blur_slots.write(&context.device, &context.queue, &blur) {
            self.refresh_texture_uniforms(context);
        }
    }

    fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        step: &BloomStep,
        threshold_bind_group: &wgpu::BindGroup,
    ) {
        match *step {
            BloomStep::Threshold { target } => draw_fullscreen(
                encoder,
                "Bloom Threshold",
                &self.pyramid.level(target).target.view,
                &self.threshold_pipeline,
                threshold_bind_group,
                &[],
            ),
            BloomStep::Downsample { source, target } => draw_fullscreen(
                encoder,
                "Bloom Downsample",
                &self.pyramid.level(target).target.view,
                &self.blit_pipeline,
                &self.bindings.blit[source],
                &[],
            ),
            BloomStep::Blur(pass) => self.record_blur(encoder, &pass),
            BloomStep::Composite { first_level } => draw_fullscreen(
                encoder,
                "Bloom Composite",
                &self.output.view,
                &self.composite_pipeline,
                &self.bindings.composite[first_level],
                &[],
            ),
        }
    }

    fn record_blur(&self, encoder: &mut wgpu::CommandEncoder, pass: &BlurPass) {
        let pipeline = match pass.kernel {
            BlurKernel::Gaussian => &self.gaussian_pipeline,
            BlurKernel::Kawase => &self.kawase_pipeline,
        };
        let bind_group = match pass.source {
            Surface::Level(level) => &self.bindings.blur[level][0],
            Surface::Scratch(level) => &self.bindings.blur[level][1],
        };
        draw_fullscreen(
            encoder,
            "Bloom Blur",
            self.surface_view(pass.target),
            pipeline,
            bind_group,
            &[self.blur_slots.offset(pass.slot)],
        );
    }

    fn surface_view(&self, surface: Surface) -> &wgpu::TextureView {
        match surface {
            Surface::Level(level) => &self.pyramid.level(level).target.view,
            Surface::Scratch(level) => &self.pyramid.level(level).scratch.view,
        }
    }

    /// The pyramid surfaces.
    pub fn pyramid(&self) -> &BloomPyramid {
        &self.pyramid
    }

    /// The full-resolution composite target.
    pub fn output(&self) -> &RenderTarget {
        &self.output
    }
}

impl PostProcessEffect for BloomPass {
    fn kind(&self) -> EffectKind {
        EffectKind::Bloom
    }

    fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        for level in self.pyramid.levels() {
            level
                .target
                .clear(encoder, "Bloom Clear", wgpu::Color::TRANSPARENT);
            level
                .scratch
                .clear(encoder, "Bloom Clear", wgpu::Color::TRANSPARENT);
        }
        self.output
            .clear(encoder, "Bloom Clear", wgpu::Color::TRANSPARENT);
    }

    fn refresh_texture_uniforms(&mut self, context: &RenderContext) {
        self.bindings = LevelBindings::new(
            &context.device,
            &Layouts {
                blit: &self.blit_layout,
                blur: &self.blur_layout,
                composite: &self.composite_layout,
            },
            &self.pyramid,
            &self.sampler,
            &self.blur_slots,
            &self.composite_buffer,
        );
    }

    fn resize(&mut self, context: &RenderContext, width: u32, height: u32) {
        self.pyramid = BloomPyramid::new(
            &context.device,
            PyramidLayout::new(width, height),
        );
        self.output = RenderTarget::hdr(
            &context.device,
            "Bloom Composite",
            self.pyramid.layout().base(),
        );
        self.refresh_texture_uniforms(context);
        log::debug!("bloom resized to {width}x{height}");
    }

    fn output_view(&self) -> &wgpu::TextureView {
        &self.output.view
    }
}

fn uniform(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

struct Layouts<'a> {
    blit: &'a wgpu::BindGroupLayout,
    blur: &'a wgpu::BindGroupLayout,
    composite: &'a wgpu::BindGroupLayout,
}

impl LevelBindings {
    fn new(
        device: &wgpu::Device,
        layouts: &Layouts<'_>,
        pyramid: &BloomPyramid,
        sampler: &wgpu::Sampler,
        blur_slots: &UniformSlots<BlurParams>,
        composite_buffer: &wgpu::Buffer,
    ) -> Self {
        let sampled = |label: &str,
                       layout: &wgpu::BindGroupLayout,
                       view: &wgpu::TextureView,
                       uniform: Option<wgpu::BindingResource>| {
            let mut entries = vec![
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ];
            if let Some(resource) = uniform {
                entries.push(wgpu::BindGroupEntry {
                    binding: 2,
                    resource,
                });
            }
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &entries,
            })
        };

        let blit = pyramid
            .levels()
            .iter()
            .map(|level| {
                sampled("Bloom Blit BG", layouts.blit, &level.target.view, None)
            })
            .collect();
        let blur = pyramid
            .levels()
            .iter()
            .map(|level| {
                [
                    sampled(
                        "Bloom Blur Level BG",
                        layouts.blur,
                        &level.target.view,
                        Some(blur_slots.binding()),
                    ),
                    sampled(
                        "Bloom Blur Scratch BG",
                        layouts.blur,
                        &level.scratch.view,
                        Some(blur_slots.binding()),
                    ),
                ]
            })
            .collect();

        let composite_for = |first: usize| {
            let mut entries: Vec<wgpu::BindGroupEntry<'_>> = (0..PYRAMID_COUNT)
                .map(|i| wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: wgpu::BindingResource::TextureView(
                        &pyramid.level(first + i).target.view,
                    ),
                })
                .collect();
            entries.push(wgpu::BindGroupEntry {
                binding: PYRAMID_COUNT as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: PYRAMID_COUNT as u32 + 1,
                resource: composite_buffer.as_entire_binding(),
            });
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Bloom Composite BG"),
                layout: layouts.composite,
                entries: &entries,
            })
        };
        let composite = [composite_for(0), composite_for(1)];

        Self {
            blit,
            blur,
            composite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::readback::{read_rgba16f, write_rgba16f};
    use crate::gpu::texture::Extent;
    use super::software::{HdrImage, SoftwareBloom};

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;
    const BLACK: [f32; 4] = [0.0; 4];

    #[test]
    fn uniform_layouts_match_wgsl() {
        assert_eq!(size_of::<ThresholdParams>(), 16);
        assert_eq!(size_of::<BlurParams>(), 32);
        assert_eq!(size_of::<CompositeParams>(), 48);
    }

    #[test]
    fn composite_uniform_clamps_scattering() {
        for (input, clamped) in [(1.5, 1.0), (-0.3, 0.0), (0.25, 0.25)] {
            let params = CompositeParams::new(&BloomOptions {
                scattering: input,
                ..BloomOptions::default()
            });
            assert_eq!(params.scattering, clamped);
        }
    }

    #[test]
    fn composite_uniform_packs_weights() {
        let options = BloomOptions::default();
        let params = CompositeParams::new(&options);
        let weights = composite_weights(options.scattering);
        assert_eq!(params.weights[0], [weights[0], weights[1], weights[2], weights[3]]);
        assert_eq!(params.weights[1], [weights[4], 0.0, 0.0, 0.0]);
        assert_eq!(params.intensity, 0.2);
    }

    /// `None` on machines without a usable adapter.
    fn headless() -> Option<RenderContext> {
        pollster::block_on(RenderContext::new_headless()).ok()
    }

    /// Dim gradient with an HDR square. Every value is exact in f16, so
    /// the uploaded scene equals the CPU one.
    fn scene() -> HdrImage {
        HdrImage::from_fn(Extent::new(WIDTH, HEIGHT), |x, y| {
            if (20..26).contains(&x) && (18..24).contains(&y) {
                [20.0, 16.0, 12.0, 1.0]
            } else {
                [x as f32 / 64.0, 0.25, 0.125, 1.0]
            }
        })
    }

    struct GpuBloom {
        context: RenderContext,
        bloom: BloomPass,
        scene: RenderTarget,
    }

    impl GpuBloom {
        fn new(context: RenderContext) -> Self {
            let mut composer = ShaderComposer::new().unwrap();
            let bloom =
                BloomPass::new(&context, &mut composer, WIDTH, HEIGHT).unwrap();
            let scene = RenderTarget::hdr(
                &context.device,
                "Test Scene",
                Extent::new(WIDTH, HEIGHT),
            );
            Self {
                context,
                bloom,
                scene,
            }
        }

        /// Upload `image`, run one frame and read the composite back.
        fn run(&mut self, image: &HdrImage, clear: bool) -> Vec<[f32; 4]> {
            write_rgba16f(&self.context, &self.scene, image.pixels()).unwrap();
            let mut encoder = self.context.create_encoder();
            if clear {
                self.bloom.clear(&mut encoder);
            }
            self.bloom.apply(&self.context, &mut encoder, &self.scene.view);
            self.context.submit(encoder);
            read_rgba16f(&self.context, self.bloom.output()).unwrap()
        }

        fn level(&self, level: usize) -> Vec<[f32; 4]> {
            let target = &self.bloom.pyramid().levels()[level].target;
            read_rgba16f(&self.context, target).unwrap()
        }
    }

    /// Level surfaces are f16, so allow a small relative error.
    fn assert_close(gpu: &[[f32; 4]], cpu: &[[f32; 4]], label: &str) {
        assert_eq!(gpu.len(), cpu.len(), "{label}");
        for (i, (g, c)) in gpu.iter().zip(cpu).enumerate() {
            for (a, b) in g.iter().zip(c) {
                assert!(
                    (a - b).abs() <= 0.02 + 0.02 * b.abs(),
                    "{label}: pixel {i} gpu {g:?} cpu {c:?}"
                );
            }
        }
    }

    #[test]
    fn gpu_bloom_matches_software_reference() {
        let Some(context) = headless() else {
            return;
        };
        let mut gpu = GpuBloom::new(context);
        let image = scene();
        let cases = [
            BloomOptions::default(),
            BloomOptions {
                use_kawase_blur: true,
                ..BloomOptions::default()
            },
            BloomOptions {
                half_resolution: true,
                ..BloomOptions::default()
            },
            BloomOptions {
                blur_iterations: 0,
                ..BloomOptions::default()
            },
            // 120 blur draws outgrow the slots sized for the defaults
            BloomOptions {
                use_kawase_blur: true,
                half_resolution: true,
                blur_iterations: 12,
                ..BloomOptions::default()
            },
        ];

        for options in cases {
            gpu.bloom.settings = options;
            let first = gpu.run(&image, true);
            let second = gpu.run(&image, true);
            assert_eq!(first, second, "{options:?} differs between frames");
            assert!(first.iter().any(|p| *p != BLACK), "{options:?}");

            let mut reference = SoftwareBloom::new(WIDTH, HEIGHT);
            reference.settings = options;
            assert_close(
                &first,
                reference.apply(&image).pixels(),
                &format!("{options:?}"),
            );

            if options.half_resolution {
                assert!(gpu.level(0).iter().all(|p| *p == BLACK));
            }
        }
    }

    #[test]
    fn gpu_clear_then_black_scene_is_zero() {
        let Some(context) = headless() else {
            return;
        };
        let mut gpu = GpuBloom::new(context);
        let lit = gpu.run(&scene(), false);
        assert!(lit.iter().any(|p| *p != BLACK));

        let black = HdrImage::new(Extent::new(WIDTH, HEIGHT));
        let output = gpu.run(&black, true);
        assert!(output.iter().all(|p| *p == BLACK));
        for level in 0..PYRAMID_COUNT {
            assert!(gpu.level(level).iter().all(|p| *p == BLACK));
        }
    }

    #[test]
    fn gpu_resize_rebuilds_pyramid_and_output() {
        let Some(context) = headless() else {
            return;
        };
        let mut gpu = GpuBloom::new(context);
        gpu.bloom.resize(&gpu.context, 30, 17);
        assert_eq!(gpu.bloom.output().extent(), Extent::new(30, 17));
        assert_eq!(
            gpu.bloom.pyramid().layout().level(1),
            Some(Extent::new(15, 8))
        );

        let output = gpu.run(&scene(), true);
        assert_eq!(output.len(), 30 * 17);
        assert!(output.iter().any(|p| *p != BLACK));
    }
}
