/// Clear every view to its own (already encoded) color. No draw.
pub fn render_clear(encoder: &mut wgpu::CommandEncoder, targets: &[(&wgpu::TextureView, wgpu::Color)]) {
    let attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
        .iter()
        .map(|&(view, color)| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })
        })
        .collect();
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Pass"),
        color_attachments: &attachments,
        depth_stencil_attachment: None,
        ..Default::default()
    });
}
