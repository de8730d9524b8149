//! Fullscreen kernel pass restricted to a scissor rectangle.

/// Integer pixel rectangle `[x, x + width) x [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scissor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Draws the fullscreen triangle into `targets`, keeping their contents
/// outside `scissor`. `None` leaves a fragment output location unbound.
pub fn render_kernel(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    targets: &[Option<&wgpu::TextureView>],
    scissor: Scissor,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
        .iter()
        .map(|target| {
            target.map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })
        })
        .collect();
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &attachments,
        depth_stencil_attachment: None,
        ..Default::default()
    });

    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
    pass.draw(0..3, 0..1);
}
