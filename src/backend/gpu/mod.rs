//! wgpu backend: WGSL compute kernel, storage-texture accumulation surface,
//! f32 running-mean compositing.
//!
//! ## Usage
//! ```ignore
//! let mut gpu = GpuBackend::headless()?;
//! let program = gpu.create_program(KERNEL_WGSL, "main")?;
//! let skybox = gpu.load_skybox("sky.hdr")?;
//! let mut target = gpu.create_target(width, height)?;
//!
//! let mut driver = FrameDriver::new(settings)?;
//! driver.set_program(program);
//! driver.set_skybox(skybox);
//! driver.render_frame(&mut gpu, &camera, &mut target)?;
//! let pixels = gpu.read_target(&target)?;
//! ```
//!
//! Every dispatch and composite is its own submission on one queue. wgpu tracks the
//! accumulation texture going from storage-write to sampled-read and inserts the
//! barrier between them, so no explicit fences are needed here.

mod composite;
mod kernel;
mod readback;
mod skybox;

pub use composite::{COMPOSITE_WGSL, MEAN_FORMAT};
pub use kernel::{KernelProgram, SURFACE_FORMAT};
pub use skybox::GpuTexture;

use wgpu::util::DeviceExt;

use super::{ComputeBackend, DispatchGrid, KernelBindings, KernelUniforms};
use crate::scene::SPHERE_STRIDE;
use crate::util::{Error, Result};
use composite::{Compositor, MeanHistory};

/// Default destination format. The mean itself is kept in [`MEAN_FORMAT`], so the
/// destination only rounds the value shown, never the value accumulated.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Scene storage buffer token.
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
}

impl GpuBuffer {
    pub fn size(&self) -> u64 {
        self.buffer.size()
    }
}

/// Accumulation surface token (rgba32float storage texture).
pub struct GpuSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Destination showing the running average, plus the f32 history it is resolved from.
pub struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    history: MeanHistory,
    width: u32,
    height: u32,
}

impl GpuTarget {
    /// Wrap an existing texture. It must be a float or unorm color format with
    /// `RENDER_ATTACHMENT` usage, and `COPY_SRC` for readback.
    pub fn from_texture(device: &wgpu::Device, texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let (width, height) = (texture.width(), texture.height());
        let history = MeanHistory::new(device, width, height);
        Self { texture, view, history, width, height }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

/// Map a caught wgpu error onto the crate's error kinds.
///
/// Validation failures come from a mismatched kernel or destination and will not pass on
/// a retry, so they are configuration errors.
fn classify(what: &'static str, err: wgpu::Error) -> Error {
    match err {
        wgpu::Error::OutOfMemory { .. } => Error::allocation(what, err.to_string()),
        wgpu::Error::Validation { .. } => Error::config(format!("{what} rejected: {err}")),
        other => Error::Backend(format!("{what} failed: {other}")),
    }
}

/// wgpu implementation of [`ComputeBackend`].
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: Option<wgpu::AdapterInfo>,
    kernel_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    // Bound in place of the scene when it is empty; `sphere_count` is 0 then
    placeholder_scene: wgpu::Buffer,
    compositor: Compositor,
}

impl GpuBackend {
    /// Backend on an existing device (e.g. one owned by a windowing layer).
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let kernel_layout = kernel::create_bind_group_layout(&device);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tracer_uniforms"),
            size: std::mem::size_of::<KernelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let placeholder_scene = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tracer_empty_scene"),
            contents: &[0u8; SPHERE_STRIDE],
            usage: wgpu::BufferUsages::STORAGE,
        });

        let compositor = Compositor::new(&device);

        Self {
            device,
            queue,
            adapter_info: None,
            kernel_layout,
            uniform_buffer,
            placeholder_scene,
            compositor,
        }
    }

    /// Create a device on the best available adapter, without a window.
    pub fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::Backend(format!("no suitable adapter: {e}")))?;

        let info = adapter.get_info();
        tracing::info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("progressive-tracer device"),
            ..Default::default()
        }))
        .map_err(|e| Error::Backend(format!("failed to create device: {e}")))?;

        let mut backend = Self::new(device, queue);
        backend.adapter_info = Some(info);
        Ok(backend)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Adapter details when the device was created by [`headless`](Self::headless).
    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.adapter_info.as_ref()
    }

    /// Compile a WGSL kernel against the fixed binding layout.
    pub fn create_program(&self, source: &str, entry_point: &str) -> Result<KernelProgram> {
        self.scoped(wgpu::ErrorFilter::Validation, |device| {
            KernelProgram::new(device, &self.kernel_layout, source, entry_point)
        })
        .map_err(|e| Error::config(format!("kernel program rejected: {e}")))
    }

    /// Allocate a destination texture in [`TARGET_FORMAT`].
    pub fn create_target(&self, width: u32, height: u32) -> Result<GpuTarget> {
        if width == 0 || height == 0 {
            return Err(Error::config(format!("cannot create a {width}x{height} destination")));
        }
        self.scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("tracer_destination"),
                size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            GpuTarget::from_texture(device, texture)
        })
        .map_err(|e| classify("destination", e))
    }

    /// Run `f` inside an error scope and report whatever the scope caught.
    fn scoped<T>(
        &self,
        filter: wgpu::ErrorFilter,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> std::result::Result<T, wgpu::Error> {
        self.device.push_error_scope(filter);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

impl ComputeBackend for GpuBackend {
    type Buffer = GpuBuffer;
    type Surface = GpuSurface;
    type Program = KernelProgram;
    type Texture = GpuTexture;
    type Target = GpuTarget;

    fn create_scene_buffer(&mut self, bytes: &[u8]) -> Result<GpuBuffer> {
        let buffer = self
            .scoped(wgpu::ErrorFilter::OutOfMemory, |device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("tracer_scene"),
                    contents: bytes,
                    usage: wgpu::BufferUsages::STORAGE,
                })
            })
            .map_err(|e| classify("scene buffer", e))?;
        Ok(GpuBuffer { buffer })
    }

    fn release_buffer(&mut self, buffer: GpuBuffer) {
        buffer.buffer.destroy();
    }

    fn create_surface(&mut self, width: u32, height: u32) -> Result<GpuSurface> {
        if width == 0 || height == 0 {
            return Err(Error::config(format!("cannot create a {width}x{height} surface")));
        }
        let texture = self
            .scoped(wgpu::ErrorFilter::OutOfMemory, |device| kernel::create_surface_texture(device, width, height))
            .map_err(|e| classify("accumulation surface", e))?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuSurface { texture, view, width, height })
    }

    fn release_surface(&mut self, surface: GpuSurface) {
        surface.texture.destroy();
    }

    fn surface_size(&self, surface: &GpuSurface) -> (u32, u32) {
        (surface.width, surface.height)
    }

    fn target_size(&self, target: &GpuTarget) -> (u32, u32) {
        (target.width, target.height)
    }

    fn dispatch(
        &mut self,
        program: &KernelProgram,
        bindings: &KernelBindings<'_, Self>,
        grid: DispatchGrid,
    ) -> Result<()> {
        self.queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&bindings.uniforms));
        let scene = bindings.scene.map_or(&self.placeholder_scene, |b| &b.buffer);

        self.scoped(wgpu::ErrorFilter::Validation, |device| {
            let bind_group = kernel::create_bind_group(
                device,
                &self.kernel_layout,
                &self.uniform_buffer,
                bindings.skybox,
                scene,
                &bindings.result.view,
            );

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tracer_dispatch"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("tracer_compute_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(program.pipeline());
                pass.set_bind_group(0, &bind_group, &[]);
                let [x, y, z] = grid.groups;
                pass.dispatch_workgroups(x, y, z);
            }
            self.queue.submit(Some(encoder.finish()));
        })
        .map_err(|e| classify("dispatch", e))
    }

    fn composite(&mut self, source: &GpuSurface, target: &mut GpuTarget, weight: f32) -> Result<()> {
        if (source.width, source.height) != (target.width, target.height) {
            return Err(Error::config(format!(
                "composite size mismatch: surface {}x{}, destination {}x{}",
                source.width, source.height, target.width, target.height
            )));
        }

        let compositor = &mut self.compositor;
        let queue = &self.queue;
        let device = &self.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        compositor.blend(device, queue, &source.view, target, weight);
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(classify("composite", e));
        }
        target.history.swap();
        Ok(())
    }
}
