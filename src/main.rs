//! Headless demo: runs the post-process stack on a synthetic HDR scene
//! and logs what each bloom level and the composite contain.

use std::path::Path;

use glam::{Mat4, Vec3};
use postfx::error::PostFxError;
use postfx::gpu::readback::{read_rgba16f, write_rgba16f};
use postfx::gpu::render_context::RenderContext;
use postfx::gpu::shader_composer::ShaderComposer;
use postfx::gpu::texture::{Extent, RenderTarget};
use postfx::options::Options;
use postfx::renderer::postprocess::bloom::software::{
    luminance, HdrImage, SoftwareBloom,
};
use postfx::renderer::postprocess::{
    EffectKind, GBufferViews, PostProcessCamera, PostProcessContext,
    PostProcessStack,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

/// Dim gradient sky with a few HDR highlights.
fn synthetic_scene(extent: Extent) -> HdrImage {
    let lights = [(0.25, 0.3, 24.0), (0.6, 0.55, 12.0), (0.85, 0.2, 6.0)];
    HdrImage::from_fn(extent, |x, y| {
        let u = x as f32 / extent.width as f32;
        let v = y as f32 / extent.height as f32;
        let mut color = [0.2 + 0.3 * v, 0.25 + 0.2 * u, 0.4, 1.0];
        for &(lx, ly, power) in &lights {
            let dx = (u - lx) * extent.width as f32;
            let dy = (v - ly) * extent.height as f32;
            if dx * dx + dy * dy < 16.0 {
                color = [power, power * 0.8, power * 0.6, 1.0];
            }
        }
        color
    })
}

/// (max, mean) luminance.
fn stats(pixels: &[[f32; 4]]) -> (f32, f32) {
    let max = pixels.iter().copied().map(luminance).fold(0.0, f32::max);
    let sum: f32 = pixels.iter().copied().map(luminance).sum();
    (max, sum / pixels.len().max(1) as f32)
}

fn create_depth(context: &RenderContext, extent: Extent) -> wgpu::TextureView {
    context
        .device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
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

fn clear_gbuffer(
    encoder: &mut wgpu::CommandEncoder,
    depth: &wgpu::TextureView,
    normal: &wgpu::TextureView,
) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("G-Buffer Clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: normal,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: 0.0,
                    g: 0.0,
                    b: 1.0,
                    a: 0.0,
                }),
                store: wgpu::StoreOp::Store,
            },
        })],
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

fn run(options: &Options) -> Result<(), PostFxError> {
    let context =
        pollster::block_on(RenderContext::new_headless())?;
    let mut composer = ShaderComposer::new()?;
    let mut stack =
        PostProcessStack::new(&context, &mut composer, WIDTH, HEIGHT)?;
    stack.apply_options(&options.post_processing);

    let extent = Extent::new(WIDTH, HEIGHT);
    let scene = synthetic_scene(extent);
    let scene_color = RenderTarget::hdr(&context.device, "Scene Color", extent);
    write_rgba16f(&context, &scene_color, scene.pixels())?;
    let depth = create_depth(&context, extent);
    let normal = RenderTarget::hdr(&context.device, "Normal G-Buffer", extent);

    let camera = PostProcessCamera {
        proj: Mat4::perspective_rh(
            45f32.to_radians(),
            WIDTH as f32 / HEIGHT as f32,
            0.1,
            100.0,
        ),
        view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
        znear: 0.1,
        zfar: 100.0,
    };

    let mut encoder = context.create_encoder();
    clear_gbuffer(&mut encoder, &depth, &normal.view);
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
            scene_color: &scene_color.view,
        },
    );
    if options.post_processing.fxaa.enabled {
        let bloom = stack.effect(EffectKind::Bloom).output_view();
        stack.apply_fxaa(&context, &mut encoder, bloom);
    }
    context.submit(encoder);

    for (i, level) in stack.bloom().pyramid().levels().iter().enumerate() {
        let pixels = read_rgba16f(&context, &level.target)?;
        let (max, mean) = stats(&pixels);
        let e = level.target.extent();
        log::info!(
            "level {i} {}x{}: max luminance {max:.4}, mean {mean:.6}",
            e.width,
            e.height
        );
    }

    let composite = read_rgba16f(&context, stack.bloom().output())?;
    let (max, mean) = stats(&composite);
    log::info!(
        "composite {WIDTH}x{HEIGHT}: max luminance {max:.4}, mean {mean:.6}"
    );

    let mut reference = SoftwareBloom::new(WIDTH, HEIGHT);
    reference.settings = options.post_processing.bloom;
    let expected = reference.apply(&scene);
    let max_error = composite
        .iter()
        .zip(expected.pixels())
        .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y).abs()))
        .fold(0.0, f32::max);
    log::info!(
        "software reference max luminance {:.4}, max abs difference {max_error:.5}",
        expected.max_luminance()
    );

    Ok(())
}

fn main() {
    env_logger::init();

    let options = match std::env::args().nth(1) {
        Some(path) => match Options::load(Path::new(&path)) {
            Ok(options) => options,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => Options::default(),
    };

    if let Err(e) = run(&options) {
        log::error!("{e}");
        std::process::exit(1);
    }
}
