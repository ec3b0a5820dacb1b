//! Compute backend seam.
//!
//! The ray tracing kernel itself is external: the core only hands it uniforms and
//! bindings and reads back one color per pixel. A backend owns the device and hands
//! out opaque tokens for buffers, surfaces, programs and textures. Tokens are
//! created and released explicitly by whoever owns them.
//!
//! - [`software`] - CPU reference backend, runs a Rust closure as the kernel
//! - [`gpu`] - wgpu backend, runs a WGSL compute shader (feature `gpu`)

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

use crate::util::Result;

pub mod software;

#[cfg(feature = "gpu")]
pub mod gpu;

/// Uniform block pushed to the kernel every frame (144 bytes, matches the WGSL struct).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelUniforms {
    /// Camera-to-world matrix, column-major
    pub camera_to_world: [[f32; 4]; 4],
    /// Inverse projection matrix, column-major
    pub inverse_projection: [[f32; 4]; 4],
    /// Sub-pixel jitter in [0, 1)²
    pub pixel_offset: [f32; 2],
    /// Number of records bound in the scene buffer (0 = no geometry)
    pub sphere_count: u32,
    /// Samples already blended into the destination
    pub sample_index: u32,
}

const _: () = assert!(std::mem::size_of::<KernelUniforms>() == 144);

impl KernelUniforms {
    pub fn new(camera_to_world: Mat4, inverse_projection: Mat4, pixel_offset: Vec2) -> Self {
        Self {
            camera_to_world: camera_to_world.to_cols_array_2d(),
            inverse_projection: inverse_projection.to_cols_array_2d(),
            pixel_offset: pixel_offset.to_array(),
            sphere_count: 0,
            sample_index: 0,
        }
    }
}

/// Workgroup counts for a 2D dispatch over the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    pub groups: [u32; 3],
    /// Threads per group along x and y (z is always 1)
    pub group_size: u32,
}

impl DispatchGrid {
    /// Cover `width × height` pixels with square groups of `group_size`.
    pub fn covering(width: u32, height: u32, group_size: u32) -> Self {
        Self {
            groups: [width.div_ceil(group_size), height.div_ceil(group_size), 1],
            group_size,
        }
    }

    /// Number of pixels the grid spans, including padding in edge groups.
    pub fn span(&self) -> (u32, u32) {
        (self.groups[0] * self.group_size, self.groups[1] * self.group_size)
    }
}

/// Everything a dispatch binds, as non-owning borrows of the owners' tokens.
pub struct KernelBindings<'a, B: ComputeBackend + ?Sized> {
    pub uniforms: KernelUniforms,
    pub skybox: &'a B::Texture,
    /// `None` when the scene is empty
    pub scene: Option<&'a B::Buffer>,
    pub result: &'a B::Surface,
}

/// Device operations the frame driver needs.
pub trait ComputeBackend {
    /// Scene storage buffer
    type Buffer;
    /// Accumulation surface the kernel writes into
    type Surface;
    /// Compiled kernel
    type Program;
    /// Skybox / environment texture
    type Texture;
    /// Destination that holds the running average
    type Target;

    /// Allocate a storage buffer holding `bytes`. `bytes` is never empty.
    fn create_scene_buffer(&mut self, bytes: &[u8]) -> Result<Self::Buffer>;

    fn release_buffer(&mut self, buffer: Self::Buffer);

    /// Allocate a `width × height` surface writable by the kernel and readable by
    /// [`composite`](Self::composite).
    fn create_surface(&mut self, width: u32, height: u32) -> Result<Self::Surface>;

    fn release_surface(&mut self, surface: Self::Surface);

    fn surface_size(&self, surface: &Self::Surface) -> (u32, u32);

    fn target_size(&self, target: &Self::Target) -> (u32, u32);

    /// Run the kernel over `grid`, writing one color per pixel into `bindings.result`.
    fn dispatch(
        &mut self,
        program: &Self::Program,
        bindings: &KernelBindings<'_, Self>,
        grid: DispatchGrid,
    ) -> Result<()>;

    /// `target = target * (1 - weight) + source * weight`, per pixel.
    ///
    /// Must observe every write of the preceding dispatch into `source`.
    fn composite(&mut self, source: &Self::Surface, target: &mut Self::Target, weight: f32) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_rounds_up() {
        let grid = DispatchGrid::covering(1920, 1080, 8);
        assert_eq!(grid.groups, [240, 135, 1]);

        let grid = DispatchGrid::covering(17, 9, 8);
        assert_eq!(grid.groups, [3, 2, 1]);
        assert_eq!(grid.span(), (24, 16));
    }

    #[test]
    fn test_uniform_layout() {
        let u = KernelUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec2::new(0.25, 0.75));
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&u));
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[5], 1.0);
        assert_eq!(&floats[32..34], &[0.25, 0.75]);
    }
}
