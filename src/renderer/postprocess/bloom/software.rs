//! CPU reference of the bloom pipeline.
//!
//! Executes the same [`BloomSchedule`] as the GPU pass on in-memory
//! `[f32; 4]` images, sampling with the same linear clamp-to-edge filter.
//! Used to check pipeline properties without a GPU adapter and to compare
//! against GPU readbacks.

use super::pyramid::PyramidLayout;
use super::schedule::{
    composite_weights, BloomSchedule, BloomStep, BlurKernel, BlurPass, Surface,
    GAUSSIAN_WEIGHTS,
};
use crate::gpu::texture::Extent;
use crate::options::BloomOptions;

/// Rec. 709 luminance of a linear color.
#[must_use]
pub fn luminance(color: [f32; 4]) -> f32 {
    0.2126 * color[0] + 0.7152 * color[1] + 0.0722 * color[2]
}

/// A linear RGBA float image.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrImage {
    extent: Extent,
    pixels: Vec<[f32; 4]>,
}

impl HdrImage {
    /// Transparent black image. Degenerate extents allocate at least 1x1,
    /// like their GPU targets.
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            pixels: vec![[0.0; 4]; extent.pixel_count()],
        }
    }

    /// Image whose pixel `(x, y)` is `f(x, y)`.
    #[must_use]
    pub fn from_fn(extent: Extent, f: impl Fn(u32, u32) -> [f32; 4]) -> Self {
        let alloc = extent.allocation();
        let pixels = (0..alloc.height)
            .flat_map(|y| (0..alloc.width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self { extent, pixels }
    }

    /// Logical extent.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Pixels in row-major order.
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    /// Pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate lies outside the allocation.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let width = self.extent.allocation().width;
        self.pixels[(y * width + x) as usize]
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: [f32; 4]) {
        self.pixels.fill(color);
    }

    /// `true` if every channel of every pixel is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.pixels.iter().all(|p| p.iter().all(|&c| c == 0.0))
    }

    /// Largest luminance of any pixel.
    #[must_use]
    pub fn max_luminance(&self) -> f32 {
        self.pixels.iter().copied().map(luminance).fold(0.0, f32::max)
    }

    /// Bilinear sample at normalized `uv` with clamp-to-edge addressing.
    #[must_use]
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        let alloc = self.extent.allocation();
        let (w, h) = (alloc.width as i64, alloc.height as i64);
        let x = uv[0] * alloc.width as f32 - 0.5;
        let y = uv[1] * alloc.height as f32 - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);

        let fetch = |xi: i64, yi: i64| {
            let xi = xi.clamp(0, w - 1);
            let yi = yi.clamp(0, h - 1);
            self.pixels[(yi * w + xi) as usize]
        };
        let (x0, y0) = (x0 as i64, y0 as i64);
        let top = lerp4(fetch(x0, y0), fetch(x0 + 1, y0), fx);
        let bottom = lerp4(fetch(x0, y0 + 1), fetch(x0 + 1, y0 + 1), fx);
        lerp4(top, bottom, fy)
    }

    /// Overwrite every pixel with `f(uv)` at the pixel center.
    fn draw(&mut self, f: impl Fn([f32; 2]) -> [f32; 4]) {
        let alloc = self.extent.allocation();
        let (w, h) = (alloc.width as f32, alloc.height as f32);
        for (i, px) in self.pixels.iter_mut().enumerate() {
            let x = (i as u32 % alloc.width) as f32;
            let y = (i as u32 / alloc.width) as f32;
            *px = f([(x + 0.5) / w, (y + 0.5) / h]);
        }
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

fn add_scaled(acc: &mut [f32; 4], c: [f32; 4], weight: f32) {
    for (a, c) in acc.iter_mut().zip(c) {
        *a += c * weight;
    }
}

fn blur_sample(
    src: &HdrImage,
    pass: &BlurPass,
    texel: [f32; 2],
    uv: [f32; 2],
) -> [f32; 4] {
    let at = |dx: f32, dy: f32| {
        src.sample([uv[0] + dx * texel[0], uv[1] + dy * texel[1]])
    };
    let mut acc = [0.0; 4];
    match pass.kernel {
        BlurKernel::Gaussian => {
            let [dx, dy] = pass.direction;
            add_scaled(&mut acc, at(0.0, 0.0), GAUSSIAN_WEIGHTS[0]);
            for (i, &w) in GAUSSIAN_WEIGHTS.iter().enumerate().skip(1) {
                let d = i as f32;
                add_scaled(&mut acc, at(dx * d, dy * d), w);
                add_scaled(&mut acc, at(-dx * d, -dy * d), w);
            }
        }
        BlurKernel::Kawase => {
            let o = pass.offset;
            for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
                add_scaled(&mut acc, at(sx * o, sy * o), 0.25);
            }
        }
    }
    acc
}

/// CPU bloom with the same pyramid, schedule, and composite as the GPU
/// pass.
pub struct SoftwareBloom {
    /// Parameters read on every [`Self::apply`].
    pub settings: BloomOptions,
    layout: PyramidLayout,
    levels: Vec<HdrImage>,
    scratch: Vec<HdrImage>,
    output: HdrImage,
}

impl SoftwareBloom {
    /// Pyramid and composite images for a `width`x`height` scene.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let layout = PyramidLayout::new(width, height);
        let images = || -> Vec<HdrImage> {
            layout.levels().iter().map(|&e| HdrImage::new(e)).collect()
        };
        Self {
            settings: BloomOptions::default(),
            layout,
            levels: images(),
            scratch: images(),
            output: HdrImage::new(layout.base()),
        }
    }

    /// Re-create every image for a new resolution.
    pub fn resize(&mut self, width: u32, height: u32) {
        let settings = self.settings;
        *self = Self::new(width, height);
        self.settings = settings;
    }

    /// Reset every level and the composite to transparent black.
    pub fn clear(&mut self) {
        for image in self.levels.iter_mut().chain(&mut self.scratch) {
            image.fill([0.0; 4]);
        }
        self.output.fill([0.0; 4]);
    }

    /// Run the whole pipeline on `scene` and return the composite.
    pub fn apply(&mut self, scene: &HdrImage) -> &HdrImage {
        let schedule = BloomSchedule::new(&self.settings);
        for step in schedule.steps() {
            self.execute(step, scene);
        }
        &self.output
    }

    fn execute(&mut self, step: &BloomStep, scene: &HdrImage) {
        match *step {
            BloomStep::Threshold { target } => {
                let threshold = self.settings.threshold;
                self.levels[target].draw(|uv| {
                    let color = scene.sample(uv);
                    if luminance(color) > threshold {
                        color
                    } else {
                        [0.0; 4]
                    }
                });
            }
            BloomStep::Downsample { source, target } => {
                let (lower, upper) = self.levels.split_at_mut(target);
                let src = &lower[source];
                upper[0].draw(|uv| src.sample(uv));
            }
            BloomStep::Blur(pass) => self.blur(&pass),
            BloomStep::Composite { first_level } => {
                let weights = composite_weights(self.settings.scattering);
                let intensity = self.settings.intensity;
                let levels = &self.levels[first_level..first_level + weights.len()];
                self.output.draw(|uv| {
                    let mut acc = [0.0; 4];
                    for (level, &w) in levels.iter().zip(&weights) {
                        add_scaled(&mut acc, level.sample(uv), w * intensity);
                    }
                    acc
                });
            }
        }
    }

    fn blur(&mut self, pass: &BlurPass) {
        let level = pass.level;
        let texel = self.layout.level(level).unwrap_or_default().texel_size();
        let (src, dst) = match (pass.source, pass.target) {
            (Surface::Level(_), Surface::Scratch(_)) => {
                (&self.levels[level], &mut self.scratch[level])
            }
            _ => (&self.scratch[level], &mut self.levels[level]),
        };
        dst.draw(|uv| blur_sample(src, pass, texel, uv));
    }

    /// Resolution math shared with the GPU pass.
    pub fn layout(&self) -> &PyramidLayout {
        &self.layout
    }

    /// Pyramid level image, or `None` past the coarsest level.
    #[must_use]
    pub fn level(&self, level: usize) -> Option<&HdrImage> {
        self.levels.get(level)
    }

    /// Every pyramid level image, finest first.
    #[must_use]
    pub fn levels(&self) -> &[HdrImage] {
        &self.levels
    }

    /// The composite of the last apply.
    pub fn output(&self) -> &HdrImage {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::postprocess::bloom::pyramid::PYRAMID_LEVELS;

    /// Dim gradient with a bright square, enough to exercise every stage.
    fn scene(width: u32, height: u32) -> HdrImage {
        HdrImage::from_fn(Extent::new(width, height), |x, y| {
            let bright = (width / 3..width / 3 + 6).contains(&x)
                && (height / 2..height / 2 + 6).contains(&y);
            if bright {
                [20.0, 16.0, 12.0, 1.0]
            } else {
                let g = x as f32 / width as f32;
                [g, g * 0.5, 0.1, 1.0]
            }
        })
    }

    #[test]
    fn sampling_at_texel_centers_fetches_exactly() {
        let image = HdrImage::from_fn(Extent::new(4, 2), |x, y| {
            [x as f32, y as f32, 0.0, 1.0]
        });
        assert_eq!(image.sample([0.375, 0.25]), [1.0, 0.0, 0.0, 1.0]);
        // Clamp to edge outside the image
        assert_eq!(image.sample([-1.0, 2.0]), [0.0, 1.0, 0.0, 1.0]);
        // Halfway between two texels
        assert_eq!(image.sample([0.5, 0.25]), [1.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn apply_is_deterministic() {
        for kawase in [false, true] {
            let input = scene(96, 64);
            let mut a = SoftwareBloom::new(96, 64);
            let mut b = SoftwareBloom::new(96, 64);
            a.settings.use_kawase_blur = kawase;
            b.settings.use_kawase_blur = kawase;
            let _ = a.apply(&input);
            let _ = b.apply(&input);
            assert_eq!(a.output(), b.output());
            assert_eq!(a.levels(), b.levels());
            assert_eq!(a.levels().len(), PYRAMID_LEVELS);

            // Re-applying on the same instance reproduces the same frame
            let first = a.output().clone();
            let _ = a.apply(&input);
            assert_eq!(&first, a.output());
        }
    }

    #[test]
    fn black_scene_after_clear_is_zero() {
        let mut bloom = SoftwareBloom::new(64, 48);
        let _ = bloom.apply(&scene(64, 48));
        assert!(!bloom.output().is_zero());

        bloom.clear();
        let black = HdrImage::new(Extent::new(64, 48));
        assert!(bloom.apply(&black).is_zero());
    }

    #[test]
    fn below_threshold_scene_is_zero() {
        let mut bloom = SoftwareBloom::new(32, 32);
        let dim = HdrImage::from_fn(Extent::new(32, 32), |_, _| {
            [3.0, 3.0, 3.0, 1.0]
        });
        assert!(bloom.apply(&dim).is_zero());
    }

    #[test]
    fn bright_pixels_bloom() {
        let mut bloom = SoftwareBloom::new(64, 64);
        let output = bloom.apply(&scene(64, 64)).clone();
        assert!(output.max_luminance() > 0.0);
        // The composite spreads light outside the bright square
        assert!(luminance(output.pixel(64 / 3 - 2, 64 / 2 + 3)) > 0.0);
    }

    #[test]
    fn half_resolution_leaves_level_zero_untouched() {
        let mut bloom = SoftwareBloom::new(64, 64);
        bloom.settings.half_resolution = true;
        let output = bloom.apply(&scene(64, 64)).clone();
        assert!(bloom.levels()[0].is_zero());
        assert!(!bloom.levels()[1].is_zero());
        assert!(bloom.level(PYRAMID_LEVELS).is_none());
        assert!(!output.is_zero());
        assert_eq!(output.extent(), Extent::new(64, 64));
    }

    #[test]
    fn zero_intensity_composites_black() {
        let mut bloom = SoftwareBloom::new(32, 32);
        bloom.settings.intensity = 0.0;
        assert!(bloom.apply(&scene(32, 32)).is_zero());
    }

    #[test]
    fn full_hd_sizes() {
        let bloom = SoftwareBloom::new(1920, 1080);
        let sizes: Vec<(u32, u32)> = bloom
            .levels()
            .iter()
            .map(|level| {
                let e = level.extent();
                (e.width, e.height)
            })
            .collect();
        assert_eq!(
            sizes,
            vec![
                (1920, 1080),
                (960, 540),
                (480, 270),
                (240, 135),
                (120, 67),
                (60, 33)
            ]
        );
        assert_eq!(bloom.output().extent(), Extent::new(1920, 1080));
    }

    #[test]
    fn tiny_scene_survives_degenerate_levels() {
        let mut bloom = SoftwareBloom::new(8, 3);
        let bright = HdrImage::from_fn(Extent::new(8, 3), |_, _| {
            [10.0, 10.0, 10.0, 1.0]
        });
        let output = bloom.apply(&bright);
        assert!(output.pixels().iter().all(|p| p.iter().all(|c| c.is_finite())));
        assert!(!output.is_zero());
    }

    #[test]
    fn resize_keeps_settings() {
        let mut bloom = SoftwareBloom::new(32, 32);
        bloom.settings.threshold = 1.0;
        bloom.resize(100, 50);
        assert_eq!(bloom.settings.threshold, 1.0);
        assert_eq!(bloom.layout().level(1), Some(Extent::new(50, 25)));
    }
}
