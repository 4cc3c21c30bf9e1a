//! Render-target texture abstraction shared by every post-process effect.

use crate::renderer::postprocess::screen_pass::ScreenPass;

/// Integer size of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent {
    /// Construct an extent.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Half the extent on both axes, rounded down.
    #[must_use]
    pub const fn halved(self) -> Self {
        Self {
            width: self.width / 2,
            height: self.height / 2,
        }
    }

    /// `true` if either axis is zero.
    #[must_use]
    pub const fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The size actually allocated for this extent: wgpu rejects zero-sized
    /// textures, so each axis is at least one texel.
    #[must_use]
    pub fn allocation(self) -> Self {
        Self {
            width: self.width.max(1),
            height: self.height.max(1),
        }
    }

    /// Size of one texel in normalized texture coordinates.
    #[must_use]
    pub fn texel_size(self) -> [f32; 2] {
        let alloc = self.allocation();
        [1.0 / alloc.width as f32, 1.0 / alloc.height as f32]
    }

    /// Number of pixels in the allocation.
    #[must_use]
    pub fn pixel_count(self) -> usize {
        let alloc = self.allocation();
        alloc.width as usize * alloc.height as usize
    }

    /// The allocation as a single-layer wgpu extent.
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::Extent3d {
        let alloc = self.allocation();
        wgpu::Extent3d {
            width: alloc.width,
            height: alloc.height,
            depth_or_array_layers: 1,
        }
    }
}

/// A render-target texture and its default view.
///
/// The texture is created with `RENDER_ATTACHMENT | TEXTURE_BINDING |
/// COPY_SRC | COPY_DST` usage, so it can be drawn into, sampled, read back,
/// and uploaded to.
pub struct RenderTarget {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// A default full-texture view.
    pub view: wgpu::TextureView,
    extent: Extent,
    format: wgpu::TextureFormat,
}

impl RenderTarget {
    /// Create a new render-target texture for `extent` in `format`.
    ///
    /// The logical extent is kept as given; the allocation is clamped to at
    /// least 1x1.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        extent: Extent,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent.to_wgpu(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            extent,
            format,
        }
    }

    /// HDR (`Rgba16Float`) target, the format of every bloom surface.
    #[must_use]
    pub fn hdr(device: &wgpu::Device, label: &str, extent: Extent) -> Self {
        Self::new(device, label, extent, wgpu::TextureFormat::Rgba16Float)
    }

    /// Logical extent (may be degenerate).
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Texture format.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Clear the whole target to `color`.
    pub fn clear(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        color: wgpu::Color,
    ) {
        let _pass = ScreenPass::begin(encoder, label, &self.view, color);
    }
}
