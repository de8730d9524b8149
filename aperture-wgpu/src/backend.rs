//! Headless WebGPU implementation of [`RenderDevice`].
//!
//! Every launch records one render pass and submits it immediately. A kernel
//! that reads a texture it also writes reads a snapshot taken before the pass.

use std::collections::HashMap;

use aperture_gpu_shared::uniforms::{CopyParams, KernelEncodings, MAX_KERNEL_INPUTS, MAX_KERNEL_OUTPUTS};
use aperture_gpu_shared::Kernel;
use aperture_render::handle::HandleStore;
use aperture_render::{
    Args, AttachmentPoint, FramebufferId, ImageFormat, Rect2D, RenderDevice, TextureDesc, TextureEncoding,
    TextureId, TextureInfo,
};
use glam::{IVec2, Vec2, Vec4};
use wgpu::util::DeviceExt;

use crate::passes::clear::render_clear;
use crate::passes::kernel::{render_kernel, Scissor};
use crate::pipeline::{create_kernel_bgl, create_kernel_pipeline};
use crate::render_targets::{
    create_gpu_texture, encode_channels, gpu_format, pack_texels, texel_bytes, unpack_texel, GpuTexture,
};

struct GpuFramebuffer {
    label: String,
    attachments: [Option<TextureId>; 2],
}

#[derive(Clone, Copy, Default)]
struct Scope {
    framebuffer: Option<FramebufferId>,
    guard_band: IVec2,
}

type PipelineKey = (Kernel, [Option<wgpu::TextureFormat>; MAX_KERNEL_OUTPUTS]);

/// One kernel dispatch, resolved to textures.
struct KernelJob<'a> {
    kernel: Kernel,
    params: &'a [u8],
    inputs: [Option<TextureId>; MAX_KERNEL_INPUTS],
    outputs: [Option<TextureId>; MAX_KERNEL_OUTPUTS],
    scissor: Scissor,
}

pub struct WgpuDevice {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,

    textures: HandleStore<GpuTexture>,
    framebuffers: HandleStore<GpuFramebuffer>,
    scope: Scope,
    scope_stack: Vec<Scope>,
    debug_groups: Vec<String>,

    bind_group_layouts: HashMap<Kernel, wgpu::BindGroupLayout>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    /// Bound to optional slots the caller left empty.
    placeholder: GpuTexture,
}

impl WgpuDevice {
    /// Creates a device with no surface. Fails when no adapter is available.
    pub fn new_headless() -> Result<Self, String> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or("Failed to find suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Aperture WebGPU Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| format!("Failed to create device: {e}"))?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let placeholder = create_gpu_texture(
            &device,
            "Placeholder",
            1,
            1,
            ImageFormat::R32F,
            TextureEncoding::IDENTITY,
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            textures: HandleStore::new(),
            framebuffers: HandleStore::new(),
            scope: Scope::default(),
            scope_stack: Vec::new(),
            debug_groups: Vec::new(),
            bind_group_layouts: HashMap::new(),
            pipelines: HashMap::new(),
            placeholder,
        })
    }

    fn texture(&self, texture: TextureId) -> &GpuTexture {
        match self.textures.get(texture.0) {
            Some(t) => t,
            None => panic!("unknown texture {texture:?}"),
        }
    }

    fn framebuffer_ref(&self, framebuffer: FramebufferId) -> &GpuFramebuffer {
        match self.framebuffers.get(framebuffer.0) {
            Some(fb) => fb,
            None => panic!("unknown framebuffer {framebuffer:?}"),
        }
    }

    fn bound_attachments(&self) -> [Option<TextureId>; 2] {
        self.scope
            .framebuffer
            .map_or([None, None], |fb| self.framebuffer_ref(fb).attachments)
    }

    /// Viewport minus the guard band, intersected with `rect`. `None` when
    /// nothing is left to shade.
    fn scissor(&self, rect: Option<Rect2D>) -> Option<Scissor> {
        let viewport = self.viewport();
        let mut region = viewport.inset(self.scope.guard_band.as_vec2());
        if let Some(rect) = rect {
            region = region.intersect(&rect);
        }
        let region = region.intersect(&viewport);
        let min = region.min.max(Vec2::ZERO).ceil().as_ivec2();
        let max = region.max.floor().as_ivec2();
        if max.x <= min.x || max.y <= min.y {
            return None;
        }
        Some(Scissor {
            x: min.x as u32,
            y: min.y as u32,
            width: (max.x - min.x) as u32,
            height: (max.y - min.y) as u32,
        })
    }

    fn label(&self, kernel: Kernel) -> String {
        match self.debug_groups.last() {
            Some(group) => format!("{group}/{kernel}"),
            None => kernel.name().to_string(),
        }
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        let kernel = key.0;
        if !self.bind_group_layouts.contains_key(&kernel) {
            let bgl = create_kernel_bgl(&self.device, kernel);
            self.bind_group_layouts.insert(kernel, bgl);
        }
        if !self.pipelines.contains_key(&key) {
            log::info!("Creating pipeline {kernel} for {:?}", key.1);
            let pipeline = create_kernel_pipeline(&self.device, kernel, &self.bind_group_layouts[&kernel], &key.1);
            self.pipelines.insert(key, pipeline);
        }
    }

    fn encodings(&self, inputs: &[Option<TextureId>], outputs: &[Option<TextureId>]) -> KernelEncodings {
        let mut encodings = KernelEncodings::default();
        for (i, texture) in inputs.iter().enumerate() {
            if let Some(texture) = texture {
                let t = self.texture(*texture);
                let (multiply, add) = channel_encoding(t.format, t.encoding);
                encodings.input_multiply[i] = multiply;
                encodings.input_add[i] = add;
            }
        }
        for (i, texture) in outputs.iter().enumerate() {
            if let Some(texture) = texture {
                let t = self.texture(*texture);
                let (multiply, add) = channel_encoding(t.format, t.encoding);
                encodings.output_multiply[i] = multiply;
                encodings.output_add[i] = add;
            }
        }
        encodings
    }

    fn run(&mut self, job: KernelJob) {
        let formats = job.outputs.map(|output| output.map(|t| gpu_format(self.texture(t).format)));
        self.ensure_pipeline((job.kernel, formats));
        let pipeline = &self.pipelines[&(job.kernel, formats)];
        let bgl = &self.bind_group_layouts[&job.kernel];
        let label = self.label(job.kernel);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&label),
        });

        // Inputs that alias an output are read from a copy.
        let slot_count = job.kernel.texture_slots().len();
        let mut snapshots: Vec<(usize, GpuTexture)> = Vec::new();
        for (i, input) in job.inputs.iter().enumerate().take(slot_count) {
            let Some(input) = input else { continue };
            if !job.outputs.contains(&Some(*input)) {
                continue;
            }
            let source = self.texture(*input);
            log::trace!("{} reads its own target {}; snapshotting", job.kernel, source.label);
            let snapshot = create_gpu_texture(
                &self.device,
                &format!("{} snapshot", source.label),
                source.width,
                source.height,
                source.format,
                source.encoding,
            );
            encoder.copy_texture_to_texture(
                source.texture.as_image_copy(),
                snapshot.texture.as_image_copy(),
                source.texture.size(),
            );
            snapshots.push((i, snapshot));
        }

        let encodings = self.encodings(&job.inputs[..slot_count], &job.outputs);
        let params = if job.params.is_empty() { &[0u8; 16][..] } else { job.params };
        let params_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Params"),
            contents: params,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let encodings_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Encodings"),
            contents: bytemuck::bytes_of(&encodings),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: encodings_buffer.as_entire_binding(),
            },
        ];
        for (i, input) in job.inputs.iter().enumerate().take(slot_count) {
            let view = match (snapshots.iter().find(|(slot, _)| *slot == i), input) {
                (Some((_, snapshot)), _) => &snapshot.view,
                (None, Some(texture)) => &self.texture(*texture).view,
                (None, None) => &self.placeholder.view,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} BG", job.kernel)),
            layout: bgl,
            entries: &entries,
        });

        let targets = job.outputs.map(|output| output.map(|t| &self.texture(t).view));
        render_kernel(&mut encoder, &label, &targets, job.scissor, pipeline, &bind_group);
        self.queue.submit(Some(encoder.finish()));
    }
}

/// Slot encoding restricted to the channels the format stores, identity
/// elsewhere.
fn channel_encoding(format: ImageFormat, encoding: TextureEncoding) -> ([f32; 4], [f32; 4]) {
    let mut multiply = Vec4::ONE;
    let mut add = Vec4::ZERO;
    for c in 0..format.channels() {
        multiply[c] = encoding.read_multiply_first[c];
        add[c] = encoding.read_add_second[c];
    }
    (multiply.to_array(), add.to_array())
}

impl RenderDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        log::trace!("Creating {} ({}x{} {:?})", desc.label, desc.width, desc.height, desc.format);
        let texture = create_gpu_texture(
            &self.device,
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.encoding,
        );
        TextureId(self.textures.insert(texture))
    }

    fn resize_texture(&mut self, texture: TextureId, width: u32, height: u32) {
        let old = self.texture(texture);
        let resized = create_gpu_texture(&self.device, &old.label, width, height, old.format, old.encoding);
        if let Some(slot) = self.textures.get_mut(texture.0) {
            *slot = resized;
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(texture.0) {
            t.texture.destroy();
        }
    }

    fn texture_info(&self, texture: TextureId) -> TextureInfo {
        self.texture(texture).info()
    }

    fn write_texture(&mut self, texture: TextureId, texels: &[f32]) {
        let t = self.texture(texture);
        assert_eq!(
            texels.len(),
            (t.width * t.height) as usize * t.format.channels(),
            "upload to {} has the wrong length",
            t.label
        );
        if t.width == 0 || t.height == 0 {
            return;
        }
        let bytes = pack_texels(t.format, t.encoding, texels);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(texel_bytes(t.format) * t.width),
                rows_per_image: Some(t.height),
            },
            wgpu::Extent3d {
                width: t.width,
                height: t.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId {
        FramebufferId(self.framebuffers.insert(GpuFramebuffer {
            label: label.to_string(),
            attachments: [None, None],
        }))
    }

    fn set_attachment(&mut self, framebuffer: FramebufferId, point: AttachmentPoint, texture: Option<TextureId>) {
        match self.framebuffers.get_mut(framebuffer.0) {
            Some(fb) => fb.attachments[point.index()] = texture,
            None => panic!("unknown framebuffer {framebuffer:?}"),
        }
    }

    fn attachment(&self, framebuffer: FramebufferId, point: AttachmentPoint) -> Option<TextureId> {
        self.framebuffer_ref(framebuffer).attachments[point.index()]
    }

    fn set_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.scope.framebuffer = framebuffer;
    }

    fn framebuffer(&self) -> Option<FramebufferId> {
        self.scope.framebuffer
    }

    fn push_2d(&mut self, framebuffer: Option<FramebufferId>) {
        self.scope_stack.push(self.scope);
        self.scope = Scope {
            framebuffer: framebuffer.or(self.scope.framebuffer),
            guard_band: IVec2::ZERO,
        };
    }

    fn pop_2d(&mut self) {
        match self.scope_stack.pop() {
            Some(scope) => self.scope = scope,
            None => panic!("pop_2d without a matching push_2d"),
        }
    }

    fn set_guard_band_clip(&mut self, thickness: IVec2) {
        self.scope.guard_band = thickness;
    }

    fn viewport(&self) -> Rect2D {
        match self.bound_attachments()[0] {
            Some(texture) => {
                let t = self.texture(texture);
                Rect2D::from_size(t.width, t.height)
            }
            None => Rect2D::from_size(0, 0),
        }
    }

    fn clear(&mut self, color: Vec4) {
        let targets: Vec<(&wgpu::TextureView, wgpu::Color)> = self
            .bound_attachments()
            .into_iter()
            .flatten()
            .map(|texture| {
                let t = self.texture(texture);
                let mut stored = encode_channels(t.format, t.encoding, color);
                if t.format.channels() == 3 {
                    stored.w = 1.0;
                }
                let clear = wgpu::Color {
                    r: stored.x as f64,
                    g: stored.y as f64,
                    b: stored.z as f64,
                    a: stored.w as f64,
                };
                (&t.view, clear)
            })
            .collect();
        if targets.is_empty() {
            return;
        }
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear"),
        });
        render_clear(&mut encoder, &targets);
        self.queue.submit(Some(encoder.finish()));
    }

    fn launch(&mut self, kernel: Kernel, args: &Args) {
        let Some(framebuffer) = self.scope.framebuffer else {
            panic!("{kernel} launched with no framebuffer bound");
        };
        log::trace!("{kernel} -> {}", self.framebuffer_ref(framebuffer).label);

        let mut inputs = [None; MAX_KERNEL_INPUTS];
        for (i, slot) in kernel.texture_slots().iter().enumerate() {
            match args.get_texture(slot) {
                Some(texture) => inputs[i] = Some(texture),
                None if kernel.is_optional_slot(slot) => {}
                None => panic!("{kernel} requires a texture in slot `{slot}`"),
            }
        }

        let Some(scissor) = self.scissor(args.launch_rect()) else {
            log::trace!("{kernel} has an empty launch region");
            return;
        };

        let mut outputs = self.bound_attachments();
        for output in outputs.iter_mut().skip(kernel.color_outputs()) {
            *output = None;
        }
        self.run(KernelJob {
            kernel,
            params: args.uniform_bytes(),
            inputs,
            outputs,
            scissor,
        });
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId, offset: IVec2) {
        let target = self.texture(dst);
        if target.width == 0 || target.height == 0 {
            return;
        }
        let scissor = Scissor {
            x: 0,
            y: 0,
            width: target.width,
            height: target.height,
        };
        let params = CopyParams {
            offset: offset.to_array(),
            ..Default::default()
        };
        let mut inputs = [None; MAX_KERNEL_INPUTS];
        inputs[0] = Some(src);
        self.run(KernelJob {
            kernel: Kernel::Copy,
            params: bytemuck::bytes_of(&params),
            inputs,
            outputs: [Some(dst), None],
            scissor,
        });
    }

    fn read_pixel(&self, texture: TextureId, x: u32, y: u32) -> Vec4 {
        let t = self.texture(texture);
        if t.width == 0 || t.height == 0 {
            return Vec4::ZERO;
        }
        let x = x.min(t.width - 1);
        let y = y.min(t.height - 1);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => panic!("readback of {} failed: {e}", t.label),
            Err(e) => panic!("readback of {} was dropped: {e}", t.label),
        }
        let texel = {
            let data = slice.get_mapped_range();
            unpack_texel(t.format, t.encoding, &data[..texel_bytes(t.format) as usize])
        };
        buffer.unmap();
        texel
    }

    fn push_debug_group(&mut self, label: &str) {
        log::debug!("Begin {label}");
        self.debug_groups.push(label.to_string());
    }

    fn pop_debug_group(&mut self) {
        if let Some(label) = self.debug_groups.pop() {
            log::debug!("End {label}");
        }
    }
}
