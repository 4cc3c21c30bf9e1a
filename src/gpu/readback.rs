//! Upload and read back `Rgba16Float` render targets.

use half::f16;

use super::render_context::RenderContext;
use super::texture::{Extent, RenderTarget};
use crate::error::PostFxError;

const BYTES_PER_PIXEL: u32 = 8;

/// Bytes per row padded to wgpu's copy alignment.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn encode_pixels(pixels: &[[f32; 4]]) -> Vec<u16> {
    pixels
        .iter()
        .flat_map(|p| p.iter().map(|&c| f16::from_f32(c).to_bits()))
        .collect()
}

fn decode_row(row: &[u8], width: usize, out: &mut Vec<[f32; 4]>) {
    for texel in row.chunks_exact(BYTES_PER_PIXEL as usize).take(width) {
        let mut px = [0.0f32; 4];
        for (c, bytes) in px.iter_mut().zip(texel.chunks_exact(2)) {
            *c = f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]))
                .to_f32();
        }
        out.push(px);
    }
}

/// `pixels` must cover `extent`'s allocation exactly.
fn check_pixel_count(extent: Extent, pixels: usize) -> Result<(), PostFxError> {
    let expected = extent.pixel_count();
    if pixels == expected {
        Ok(())
    } else {
        Err(PostFxError::PixelCount {
            expected,
            actual: pixels,
        })
    }
}

/// Upload `pixels` (row-major, `extent.allocation()` sized) into an
/// `Rgba16Float` target.
///
/// # Errors
///
/// Returns [`PostFxError::PixelCount`] if `pixels` does not cover the
/// target's allocation exactly.
pub fn write_rgba16f(
    context: &RenderContext,
    target: &RenderTarget,
    pixels: &[[f32; 4]],
) -> Result<(), PostFxError> {
    check_pixel_count(target.extent(), pixels.len())?;
    let alloc = target.extent().allocation();
    let data = encode_pixels(pixels);
    context.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&data),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(alloc.width * BYTES_PER_PIXEL),
            rows_per_image: Some(alloc.height),
        },
        target.extent().to_wgpu(),
    );
    Ok(())
}

/// Copy an `Rgba16Float` target to the CPU. Blocks until the copy finishes.
///
/// # Errors
///
/// Returns [`PostFxError::Readback`] if polling or mapping the staging
/// buffer fails.
pub fn read_rgba16f(
    context: &RenderContext,
    target: &RenderTarget,
) -> Result<Vec<[f32; 4]>, PostFxError> {
    let Extent { width, height } = target.extent().allocation();
    let row_pitch = padded_bytes_per_row(width);
    let staging = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging"),
        size: u64::from(row_pitch) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context.create_encoder();
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_pitch),
                rows_per_image: Some(height),
            },
        },
        target.extent().to_wgpu(),
    );
    context.submit(encoder);

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = context
        .device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| PostFxError::Readback(e.to_string()))?;
    rx.recv()
        .map_err(|e| PostFxError::Readback(e.to_string()))?
        .map_err(|e| PostFxError::Readback(e.to_string()))?;

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    {
        let mapped = slice.get_mapped_range();
        for row in mapped.chunks_exact(row_pitch as usize) {
            decode_row(row, width as usize, &mut pixels);
        }
    }
    staging.unmap();
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(32), 256);
        assert_eq!(padded_bytes_per_row(33), 512);
    }

    #[test]
    fn upload_must_cover_the_allocation() {
        assert!(check_pixel_count(Extent::new(4, 2), 8).is_ok());
        // Degenerate extents allocate one texel per zero axis
        assert!(check_pixel_count(Extent::new(0, 3), 3).is_ok());
        let err = check_pixel_count(Extent::new(4, 2), 7).unwrap_err();
        assert!(matches!(
            err,
            PostFxError::PixelCount {
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn half_encoding_survives_decode() {
        let pixels = [[1.0, 0.5, 4.0, 0.0], [0.25, 2.0, 8.0, 1.0]];
        let bits = encode_pixels(&pixels);
        let mut row: Vec<u8> =
            bits.iter().flat_map(|b| b.to_le_bytes()).collect();
        row.resize(256, 0);
        let mut out = Vec::new();
        decode_row(&row, 2, &mut out);
        assert_eq!(out, pixels);
    }
}
