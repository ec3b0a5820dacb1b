//! Weighted composite of the accumulation surface onto the destination.
//!
//! The running mean lives in a pair of `rgba32float` textures owned by the destination.
//! Each composite reads the kernel's raw sample and the previous mean, writes
//! `previous * (1 - weight) + sample * weight` into the other texture of the pair, and
//! writes the same value into the destination in one pass. The pair is then swapped.
//! The destination format only needs to be renderable; it never feeds back into the mean.

use std::collections::HashMap;

use super::GpuTarget;

/// Composite shader, embedded at compile time.
pub const COMPOSITE_WGSL: &str = include_str!("composite.wgsl");

/// Format of the running mean.
pub const MEAN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Ping-pong pair holding the f32 running mean for one destination.
pub(super) struct MeanHistory {
    // Kept alive alongside their views
    _textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    front: usize,
}

impl MeanHistory {
    pub(super) fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let create = |label: &'static str| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: MEAN_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        };
        let textures = [create("tracer_mean_a"), create("tracer_mean_b")];
        let views = [
            textures[0].create_view(&wgpu::TextureViewDescriptor::default()),
            textures[1].create_view(&wgpu::TextureViewDescriptor::default()),
        ];
        Self { _textures: textures, views, front: 0 }
    }

    fn previous(&self) -> &wgpu::TextureView {
        &self.views[self.front]
    }

    fn next(&self) -> &wgpu::TextureView {
        &self.views[1 - self.front]
    }

    /// Make the texture written by the last composite the previous mean.
    pub(super) fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}

fn attachment(view: &wgpu::TextureView) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
        depth_slice: None,
    })
}

pub(super) struct Compositor {
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    params: wgpu::Buffer,
    // One pipeline per destination format
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

fn texel_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            // rgba32float is not filterable; the shader uses textureLoad
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
        },
        count: None,
    }
}

impl Compositor {
    pub(super) fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tracer_composite_shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITE_WGSL.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tracer_composite_bgl"),
            entries: &[
                texel_entry(0),
                texel_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tracer_composite_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tracer_composite_params"),
            size: std::mem::size_of::<[f32; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            shader,
            bind_group_layout,
            pipeline_layout,
            params,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let (shader, layout) = (&self.shader, &self.pipeline_layout);
        self.pipelines.entry(format).or_insert_with(|| {
            tracing::debug!("creating composite pipeline for {format:?}");
            let replace = |format| {
                Some(wgpu::ColorTargetState { format, blend: None, write_mask: wgpu::ColorWrites::ALL })
            };
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("tracer_composite_pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[replace(MEAN_FORMAT), replace(format)],
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })
    }

    /// Record and submit one running-mean update of `target` with `source`.
    ///
    /// The caller swaps `target`'s history once the submission is known to be valid.
    pub(super) fn blend(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::TextureView,
        target: &GpuTarget,
        weight: f32,
    ) {
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&[weight, 0.0, 0.0, 0.0]));

        let history = &target.history;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tracer_composite_bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(source) },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(history.previous()),
                },
                wgpu::BindGroupEntry { binding: 2, resource: self.params.as_entire_binding() },
            ],
        });
        let pipeline = self.pipeline(device, target.format());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tracer_composite"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tracer_composite_pass"),
                color_attachments: &[attachment(history.next()), attachment(target.view())],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1); // fullscreen triangle
        }
        queue.submit(Some(encoder.finish()));
    }
}
