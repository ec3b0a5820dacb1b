//! CPU reference backend.
//!
//! Runs the kernel as a Rust closure, one invocation per pixel covered by the dispatch
//! grid, rows in parallel on the rayon pool. Compositing uses the same [`blend`] as the
//! accumulation math, so this backend is the ground truth the GPU path is checked against.
//!
//! An optional memory budget makes allocation failures reproducible.

use parking_lot::Mutex;
use rayon::prelude::*;

use super::{ComputeBackend, DispatchGrid, KernelBindings, KernelUniforms};
use crate::accumulator::blend;
use crate::scene::{decode, Sphere};
use crate::util::{Error, Result};

const BYTES_PER_PIXEL: usize = std::mem::size_of::<[f32; 4]>();

/// Linear RGBA image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Image {
    /// Transparent black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; 4])
    }

    pub fn filled(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self { width, height, pixels: vec![color; width as usize * height as usize] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }
}

/// Scene buffer token: the packed bytes exactly as a GPU would receive them.
#[derive(Debug)]
pub struct SoftwareBuffer {
    bytes: Vec<u8>,
}

impl SoftwareBuffer {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Accumulation surface token. Written by dispatch through a shared borrow, like a
/// storage texture.
#[derive(Debug)]
pub struct SoftwareSurface {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<[f32; 4]>>,
}

impl SoftwareSurface {
    /// Copy of the current contents.
    pub fn snapshot(&self) -> Image {
        Image { width: self.width, height: self.height, pixels: self.pixels.lock().clone() }
    }
}

/// Per-pixel view handed to the software kernel.
pub struct KernelInvocation<'a> {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub uniforms: &'a KernelUniforms,
    /// Decoded scene records, empty when no scene is bound
    pub spheres: &'a [Sphere],
    pub skybox: &'a Image,
}

type KernelFn = dyn Fn(&KernelInvocation<'_>) -> [f32; 4] + Send + Sync;

/// Kernel program for the software backend.
pub struct SoftwareKernel {
    func: Box<KernelFn>,
}

impl SoftwareKernel {
    pub fn new(func: impl Fn(&KernelInvocation<'_>) -> [f32; 4] + Send + Sync + 'static) -> Self {
        Self { func: Box::new(func) }
    }

    /// Kernel that writes the same color everywhere.
    pub fn constant(color: [f32; 4]) -> Self {
        Self::new(move |_| color)
    }
}

impl std::fmt::Debug for SoftwareKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKernel").finish_non_exhaustive()
    }
}

/// Resource and work counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendStats {
    pub buffers_created: usize,
    pub live_buffers: usize,
    pub surfaces_created: usize,
    pub live_surfaces: usize,
    pub bytes_in_use: usize,
    pub dispatches: usize,
    pub composites: usize,
}

/// CPU implementation of [`ComputeBackend`].
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    memory_budget: Option<usize>,
    stats: BackendStats,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose allocations fail once `budget` bytes are in use.
    pub fn with_memory_budget(budget: usize) -> Self {
        Self { memory_budget: Some(budget), ..Self::default() }
    }

    pub fn set_memory_budget(&mut self, budget: Option<usize>) {
        self.memory_budget = budget;
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Destination surface for [`FrameDriver::render_frame`](crate::FrameDriver::render_frame).
    pub fn create_target(&self, width: u32, height: u32) -> Image {
        Image::new(width, height)
    }

    fn reserve(&mut self, what: &'static str, bytes: usize) -> Result<()> {
        if let Some(budget) = self.memory_budget {
            let requested = self.stats.bytes_in_use + bytes;
            if requested > budget {
                return Err(Error::allocation(
                    what,
                    format!("out of memory ({requested} bytes requested, budget {budget})"),
                ));
            }
        }
        self.stats.bytes_in_use += bytes;
        Ok(())
    }
}

impl ComputeBackend for SoftwareBackend {
    type Buffer = SoftwareBuffer;
    type Surface = SoftwareSurface;
    type Program = SoftwareKernel;
    type Texture = Image;
    type Target = Image;

    fn create_scene_buffer(&mut self, bytes: &[u8]) -> Result<SoftwareBuffer> {
        self.reserve("scene buffer", bytes.len())?;
        self.stats.buffers_created += 1;
        self.stats.live_buffers += 1;
        Ok(SoftwareBuffer { bytes: bytes.to_vec() })
    }

    fn release_buffer(&mut self, buffer: SoftwareBuffer) {
        self.stats.bytes_in_use -= buffer.len();
        self.stats.live_buffers -= 1;
    }

    fn create_surface(&mut self, width: u32, height: u32) -> Result<SoftwareSurface> {
        if width == 0 || height == 0 {
            return Err(Error::config(format!("cannot create a {width}x{height} surface")));
        }
        let count = width as usize * height as usize;
        self.reserve("accumulation surface", count * BYTES_PER_PIXEL)?;
        self.stats.surfaces_created += 1;
        self.stats.live_surfaces += 1;
        Ok(SoftwareSurface { width, height, pixels: Mutex::new(vec![[0.0; 4]; count]) })
    }

    fn release_surface(&mut self, surface: SoftwareSurface) {
        self.stats.bytes_in_use -= surface.width as usize * surface.height as usize * BYTES_PER_PIXEL;
        self.stats.live_surfaces -= 1;
    }

    fn surface_size(&self, surface: &SoftwareSurface) -> (u32, u32) {
        (surface.width, surface.height)
    }

    fn target_size(&self, target: &Image) -> (u32, u32) {
        (target.width, target.height)
    }

    fn dispatch(
        &mut self,
        program: &SoftwareKernel,
        bindings: &KernelBindings<'_, Self>,
        grid: DispatchGrid,
    ) -> Result<()> {
        let spheres = match bindings.scene {
            Some(buffer) => decode(buffer.bytes())?,
            None => Vec::new(),
        };
        let surface = bindings.result;
        let (width, height) = (surface.width, surface.height);
        let (span_w, span_h) = grid.span();
        let (cols, rows) = (span_w.min(width), span_h.min(height));

        let mut pixels = surface.pixels.lock();
        pixels
            .par_chunks_mut(width as usize)
            .take(rows as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..cols {
                    let invocation = KernelInvocation {
                        x,
                        y: y as u32,
                        width,
                        height,
                        uniforms: &bindings.uniforms,
                        spheres: &spheres,
                        skybox: bindings.skybox,
                    };
                    row[x as usize] = (program.func)(&invocation);
                }
            });

        self.stats.dispatches += 1;
        Ok(())
    }

    fn composite(&mut self, source: &SoftwareSurface, target: &mut Image, weight: f32) -> Result<()> {
        if (source.width, source.height) != (target.width, target.height) {
            return Err(Error::config(format!(
                "composite size mismatch: surface {}x{}, destination {}x{}",
                source.width, source.height, target.width, target.height
            )));
        }
        let pixels = source.pixels.lock();
        for (dst, &src) in target.pixels.iter_mut().zip(pixels.iter()) {
            *dst = blend(*dst, src, weight);
        }
        self.stats.composites += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec2};

    fn uniforms() -> KernelUniforms {
        KernelUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec2::ZERO)
    }

    #[test]
    fn test_dispatch_covers_partial_groups() {
        let mut backend = SoftwareBackend::new();
        let surface = backend.create_surface(13, 5).unwrap();
        let skybox = Image::new(1, 1);
        let kernel = SoftwareKernel::new(|inv| [inv.x as f32, inv.y as f32, 0.0, 1.0]);
        let bindings = KernelBindings { uniforms: uniforms(), skybox: &skybox, scene: None, result: &surface };

        backend.dispatch(&kernel, &bindings, DispatchGrid::covering(13, 5, 8)).unwrap();
        let image = surface.snapshot();
        assert_eq!(image.pixel(12, 4), [12.0, 4.0, 0.0, 1.0]);
        assert_eq!(image.pixel(0, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_dispatch_sees_scene() {
        let mut backend = SoftwareBackend::new();
        let spheres = [Sphere::new([1.0, 2.0, 3.0], 0.5, [0.1; 3], [0.04; 3])];
        let buffer = backend.create_scene_buffer(crate::scene::encode(&spheres)).unwrap();
        let surface = backend.create_surface(2, 2).unwrap();
        let skybox = Image::new(1, 1);
        let kernel = SoftwareKernel::new(|inv| [inv.spheres.len() as f32, inv.spheres[0].radius, 0.0, 1.0]);
        let bindings = KernelBindings { uniforms: uniforms(), skybox: &skybox, scene: Some(&buffer), result: &surface };

        backend.dispatch(&kernel, &bindings, DispatchGrid::covering(2, 2, 8)).unwrap();
        assert_eq!(surface.snapshot().pixel(1, 1), [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_memory_budget() {
        let mut backend = SoftwareBackend::with_memory_budget(4 * 4 * BYTES_PER_PIXEL);
        let surface = backend.create_surface(4, 4).unwrap();
        let err = backend.create_surface(1, 1).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));

        backend.release_surface(surface);
        assert_eq!(backend.stats().bytes_in_use, 0);
        assert!(backend.create_surface(4, 4).is_ok());
    }

    #[test]
    fn test_zero_sized_surface_rejected() {
        let mut backend = SoftwareBackend::new();
        assert!(matches!(backend.create_surface(0, 10), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_composite_size_mismatch() {
        let mut backend = SoftwareBackend::new();
        let surface = backend.create_surface(2, 2).unwrap();
        let mut target = backend.create_target(3, 2);
        assert!(backend.composite(&surface, &mut target, 1.0).is_err());
    }
}
