//! Scoped full-screen render pass.
//!
//! A [`ScreenPass`] binds exactly one color target for as long as it lives.
//! The underlying `wgpu::RenderPass` ends when the guard is dropped, so a
//! target can never stay bound past the scope that used it, early returns
//! included. The attachment size is the viewport, so drawing into a pyramid
//! level implicitly renders at that level's resolution.

/// A render pass over a single color target, cleared on entry.
pub struct ScreenPass<'e> {
    pass: wgpu::RenderPass<'e>,
}

impl<'e> ScreenPass<'e> {
    /// Bind `target` and clear it to `clear`.
    pub fn begin(
        encoder: &'e mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        clear: wgpu::Color,
    ) -> Self {
        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
        Self { pass }
    }

    /// Draw the full-screen triangle with `pipeline` and group 0 bound to
    /// `bind_group`.
    pub fn draw(
        &mut self,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
        dynamic_offsets: &[u32],
    ) {
        self.pass.set_pipeline(pipeline);
        self.pass.set_bind_group(0, bind_group, dynamic_offsets);
        self.pass.draw(0..3, 0..1);
    }
}

/// Open a pass on `target`, draw once, and close it.
pub fn draw_fullscreen(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    dynamic_offsets: &[u32],
) {
    let mut pass =
        ScreenPass::begin(encoder, label, target, wgpu::Color::TRANSPARENT);
    pass.draw(pipeline, bind_group, dynamic_offsets);
}
