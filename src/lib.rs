//! # Progressive Tracer
//!
//! Host-side driver for a compute-kernel ray tracer with progressive accumulation.
//!
//! The ray tracing kernel is external. Each frame this crate pushes camera matrices, a
//! sub-pixel jitter and the scene buffer to the kernel, dispatches it into an
//! accumulation surface, and blends the result into the destination with weight
//! `1 / (samples + 1)`. After `N` undisturbed frames the destination is the exact mean
//! of `N` kernel samples. Camera motion, a resize, or a scene rebuild restarts the mean.
//!
//! ## Modules
//!
//! - [`driver`] - Per-frame state machine ([`FrameDriver::render_frame`])
//! - [`accumulator`] - Sample counter and weighted compositing
//! - [`surface`] - Accumulation surface sized to the viewport
//! - [`scene`] - Sphere records, random generation, scene buffer
//! - [`camera`] - Camera snapshots and sources
//! - [`backend`] - Compute backend seam (software and wgpu)
//! - [`settings`] - JSON settings
//! - [`util`] - Errors and warnings
//!
//! ## Example
//!
//! ```ignore
//! use progressive_tracer::prelude::*;
//!
//! let mut backend = SoftwareBackend::new();
//! let mut driver = FrameDriver::new(Settings::default())?;
//! driver.set_program(SoftwareKernel::constant([0.2, 0.4, 0.8, 1.0]));
//! driver.set_skybox(Image::new(1, 1));
//! driver.rebuild_scene(&mut backend, 50)?;
//!
//! let mut destination = backend.create_target(640, 360);
//! for _ in 0..16 {
//!     driver.render_frame(&mut backend, &camera_pose, &mut destination)?;
//! }
//! ```

pub mod accumulator;
pub mod backend;
pub mod camera;
pub mod driver;
pub mod scene;
pub mod settings;
pub mod surface;
pub mod util;

// Re-export commonly used types
pub use accumulator::Accumulator;
pub use camera::{CameraPose, CameraSource};
pub use driver::{FrameDriver, FrameOutcome, FrameReport};
pub use settings::{SceneSettings, Settings};
pub use util::{Error, Result, Warning};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::software::{Image, SoftwareBackend, SoftwareKernel};
    pub use crate::backend::{ComputeBackend, DispatchGrid, KernelUniforms};
    pub use crate::camera::{CameraPose, CameraSource};
    pub use crate::driver::{FrameDriver, FrameOutcome, FrameReport};
    pub use crate::scene::Sphere;
    pub use crate::settings::{SceneSettings, Settings};
    pub use crate::util::{Error, Result, Warning};

    #[cfg(feature = "gpu")]
    pub use crate::backend::gpu::{GpuBackend, GpuTarget, GpuTexture, KernelProgram};
}
