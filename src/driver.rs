//! Per-frame orchestration.
//!
//! ```text
//! render_frame(camera, destination)
//!   Idle ─ change detection, uniforms ─▶ UniformsSet ─ surface check, dispatch ─▶ Dispatched
//!        ─ weighted composite, count++ ─▶ Composited ─▶ Idle
//! ```
//!
//! A frame either reaches `Composited` or returns an error; nothing is rolled back and
//! the next call starts from `Idle` again. Frames are serialized by `&mut self`.

use glam::Vec2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::accumulator::Accumulator;
use crate::backend::{ComputeBackend, DispatchGrid, KernelBindings, KernelUniforms};
use crate::camera::{CameraPose, CameraSource};
use crate::scene::{SceneBuffer, Sphere};
use crate::settings::Settings;
use crate::surface::AccumulationSurface;
use crate::util::{Error, Result, Warning};

/// Where the driver is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Idle,
    UniformsSet,
    Dispatched,
    Composited,
}

fn advance(stage: &mut FrameStage, next: FrameStage) {
    debug_assert!(
        matches!(
            (*stage, next),
            (FrameStage::Idle, FrameStage::UniformsSet)
                | (FrameStage::UniformsSet, FrameStage::Dispatched)
                | (FrameStage::Dispatched, FrameStage::Composited)
                | (_, FrameStage::Idle)
        ),
        "illegal frame transition {:?} -> {:?}",
        stage,
        next
    );
    tracing::trace!("frame stage {:?} -> {:?}", stage, next);
    *stage = next;
}

/// How a successful frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A new sample was blended into the destination
    Composited,
    /// `max_samples` reached; no dispatch, destination left as is
    Converged,
}

/// What one call to [`FrameDriver::render_frame`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub outcome: FrameOutcome,
    /// Samples in the destination after this frame
    pub sample_count: u32,
    /// Blend weight used, if a sample was composited
    pub weight: Option<f32>,
    pub pixel_offset: Vec2,
    pub grid: Option<DispatchGrid>,
    /// Camera moved since the previous frame
    pub camera_reset: bool,
    /// Accumulation surface was (re)allocated this frame
    pub surface_reallocated: bool,
    /// Kernel ran with a scene buffer bound
    pub scene_bound: bool,
    /// `EmptyScene` whenever the kernel ran (or would have run) with no geometry
    pub warning: Option<Warning>,
}

enum SceneRequest {
    Generate(usize),
    Replace(Vec<Sphere>),
}

/// Owns the accumulation surface, sample state and scene buffer, and drives the
/// external kernel once per frame.
pub struct FrameDriver<B: ComputeBackend, R: Rng = SmallRng> {
    settings: Settings,
    program: Option<B::Program>,
    skybox: Option<B::Texture>,
    scene: SceneBuffer<B>,
    pending_scene: Option<SceneRequest>,
    surface: AccumulationSurface<B>,
    accumulator: Accumulator,
    last_pose: Option<CameraPose>,
    rng: R,
    stage: FrameStage,
}

impl<B: ComputeBackend> FrameDriver<B, SmallRng> {
    /// Driver with a `SmallRng` seeded from `settings.seed`, or from entropy.
    pub fn new(settings: Settings) -> Result<Self> {
        let rng = match settings.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self::with_rng(settings, rng)
    }
}

impl<B: ComputeBackend, R: Rng> FrameDriver<B, R> {
    /// Driver drawing jitter and scene randomness from `rng`.
    pub fn with_rng(settings: Settings, rng: R) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            program: None,
            skybox: None,
            scene: SceneBuffer::new(),
            pending_scene: None,
            surface: AccumulationSurface::new(),
            accumulator: Accumulator::new(),
            last_pose: None,
            rng,
            stage: FrameStage::Idle,
        })
    }

    pub fn set_program(&mut self, program: B::Program) {
        self.program = Some(program);
        self.accumulator.reset();
    }

    pub fn set_skybox(&mut self, skybox: B::Texture) {
        self.skybox = Some(skybox);
        self.accumulator.reset();
    }

    /// Regenerate `count` random spheres now. Resets accumulation.
    pub fn rebuild_scene(&mut self, backend: &mut B, count: usize) -> Result<Option<Warning>> {
        self.accumulator.reset();
        self.scene.rebuild(backend, count, &self.settings.scene, &mut self.rng)
    }

    /// Replace the scene with `spheres` now. Resets accumulation.
    pub fn set_scene(&mut self, backend: &mut B, spheres: Vec<Sphere>) -> Result<Option<Warning>> {
        self.accumulator.reset();
        self.scene.replace(backend, spheres)
    }

    /// Regenerate the scene at the start of the next frame.
    pub fn request_scene_rebuild(&mut self, count: usize) {
        self.pending_scene = Some(SceneRequest::Generate(count));
    }

    /// Replace the scene at the start of the next frame.
    pub fn request_scene(&mut self, spheres: Vec<Sphere>) {
        self.pending_scene = Some(SceneRequest::Replace(spheres));
    }

    /// Discard accumulated samples; the next frame overwrites the destination.
    pub fn reset_accumulation(&mut self) {
        self.accumulator.reset();
    }

    /// Apply a deferred scene change. A failed request stays queued for the next frame.
    fn apply_scene_request(&mut self, backend: &mut B, request: SceneRequest) -> Result<Option<Warning>> {
        let result = match &request {
            SceneRequest::Generate(count) => self.rebuild_scene(backend, *count),
            SceneRequest::Replace(spheres) => self.set_scene(backend, spheres.clone()),
        };
        if result.is_err() {
            self.pending_scene = Some(request);
        }
        result
    }

    /// Render one progressive frame into `destination`.
    ///
    /// Fails before touching any state if the kernel program or the skybox is missing.
    #[tracing::instrument(skip_all, fields(sample = self.accumulator.sample_count()))]
    pub fn render_frame<C: CameraSource + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &C,
        destination: &mut B::Target,
    ) -> Result<FrameReport> {
        let result = self.run_frame(backend, camera, destination);
        if let Err(e) = &result {
            tracing::debug!("frame abandoned: {e}");
        }
        advance(&mut self.stage, FrameStage::Idle);
        result
    }

    fn run_frame<C: CameraSource + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &C,
        destination: &mut B::Target,
    ) -> Result<FrameReport> {
        if self.program.is_none() {
            return Err(Error::config("kernel program not set"));
        }
        if self.skybox.is_none() {
            return Err(Error::config("skybox texture not set"));
        }

        let mut warning = match self.pending_scene.take() {
            Some(request) => self.apply_scene_request(backend, request)?,
            None => None,
        };
        if self.scene.is_empty() {
            warning = Some(Warning::EmptyScene);
        }

        // Change detection against the last recorded pose
        let pose = camera.snapshot();
        let camera_reset = match &self.last_pose {
            Some(last) => last.differs(&pose, self.settings.camera_epsilon),
            None => true,
        };
        if camera_reset {
            self.accumulator.reset();
            self.last_pose = Some(pose);
        }
        let pose = self.last_pose.unwrap_or(pose);

        let pixel_offset = Vec2::new(self.rng.gen(), self.rng.gen());
        let mut uniforms = KernelUniforms::new(pose.camera_to_world, pose.inverse_projection, pixel_offset);
        uniforms.sphere_count = self.scene.len() as u32;
        advance(&mut self.stage, FrameStage::UniformsSet);

        let (width, height) = backend.target_size(destination);
        let surface_reallocated = match self.surface.ensure_valid(backend, width, height) {
            Ok(reallocated) => reallocated,
            Err(e) => {
                self.accumulator.reset();
                return Err(e);
            }
        };
        if surface_reallocated {
            self.accumulator.reset();
        }

        let mut report = FrameReport {
            outcome: FrameOutcome::Converged,
            sample_count: self.accumulator.sample_count(),
            weight: None,
            pixel_offset,
            grid: None,
            camera_reset,
            surface_reallocated,
            scene_bound: self.scene.binding().is_some(),
            warning,
        };

        let max_samples = self.settings.max_samples;
        if max_samples > 0 && self.accumulator.sample_count() >= max_samples {
            return Ok(report);
        }

        let (Some(program), Some(skybox), Some(surface)) = (&self.program, &self.skybox, self.surface.get())
        else {
            return Err(Error::config("frame inputs missing after surface check"));
        };

        uniforms.sample_index = self.accumulator.sample_count();
        let grid = DispatchGrid::covering(width, height, self.settings.group_size);
        let bindings = KernelBindings { uniforms, skybox, scene: self.scene.binding(), result: surface };
        backend.dispatch(program, &bindings, grid)?;
        advance(&mut self.stage, FrameStage::Dispatched);

        let weight = self.accumulator.composite(backend, surface, destination)?;
        advance(&mut self.stage, FrameStage::Composited);

        report.outcome = FrameOutcome::Composited;
        report.sample_count = self.accumulator.sample_count();
        report.weight = Some(weight);
        report.grid = Some(grid);
        Ok(report)
    }

    /// Release the accumulation surface and scene buffer.
    pub fn shutdown(mut self, backend: &mut B) {
        self.surface.release(backend);
        self.scene.release(backend);
    }

    pub fn sample_count(&self) -> u32 {
        self.accumulator.sample_count()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scene(&self) -> &SceneBuffer<B> {
        &self.scene
    }

    pub fn surface(&self) -> &AccumulationSurface<B> {
        &self.surface
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn has_skybox(&self) -> bool {
        self.skybox.is_some()
    }
}
