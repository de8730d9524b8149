//! Bind group layouts and render pipelines for the compositor kernels.

use aperture_gpu_shared::{shaders, Kernel};

fn fullscreen_vertex_state(module: &wgpu::ShaderModule) -> wgpu::VertexState<'_> {
    wgpu::VertexState {
        module,
        entry_point: Some("vs_main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        buffers: &[],
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        // Kernels only use textureLoad, so every float format binds.
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

// ============================================================
// Kernel pipelines
// ============================================================

/// 0: params, 1: slot encodings, 2..: one texture per slot.
pub fn create_kernel_bgl(device: &wgpu::Device, kernel: Kernel) -> wgpu::BindGroupLayout {
    let mut entries = vec![uniform_entry(0), uniform_entry(1)];
    for i in 0..kernel.texture_slots().len() {
        entries.push(texture_entry(2 + i as u32));
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{kernel} BGL")),
        entries: &entries,
    })
}

/// Fullscreen kernel pipeline writing one target per output location.
pub fn create_kernel_pipeline(
    device: &wgpu::Device,
    kernel: Kernel,
    bgl: &wgpu::BindGroupLayout,
    output_formats: &[Option<wgpu::TextureFormat>],
) -> wgpu::RenderPipeline {
    let label = kernel.name();
    let vert_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Fullscreen Triangle Vert"),
        source: wgpu::ShaderSource::Wgsl(shaders::FULLSCREEN_TRIANGLE_VERT.into()),
    });

    let frag_source = format!("{}\n{}", shaders::KERNEL_COMMON, kernel.fragment_source());
    let frag_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(frag_source.into()),
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Layout")),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });

    let targets: Vec<Option<wgpu::ColorTargetState>> = output_formats
        .iter()
        .map(|format| {
            format.map(|format| wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: fullscreen_vertex_state(&vert_module),
        fragment: Some(wgpu::FragmentState {
            module: &frag_module,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
