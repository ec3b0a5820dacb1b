//! GPU-resident scene buffer.

use rand::Rng;

use super::generate::generate;
use super::sphere::{encode, Sphere, SPHERE_STRIDE};
use crate::backend::ComputeBackend;
use crate::settings::SceneSettings;
use crate::util::{Result, Warning};

/// Owns the flat sphere list and the device buffer it was uploaded to.
///
/// The list is replaced wholesale; the old device buffer is released before the new
/// one is allocated. An empty list holds no device buffer at all.
pub struct SceneBuffer<B: ComputeBackend> {
    spheres: Vec<Sphere>,
    buffer: Option<B::Buffer>,
}

impl<B: ComputeBackend> SceneBuffer<B> {
    pub fn new() -> Self {
        Self { spheres: Vec::new(), buffer: None }
    }

    /// Regenerate `count` random spheres and upload them.
    #[tracing::instrument(skip(self, backend, settings, rng))]
    pub fn rebuild<R: Rng + ?Sized>(
        &mut self,
        backend: &mut B,
        count: usize,
        settings: &SceneSettings,
        rng: &mut R,
    ) -> Result<Option<Warning>> {
        let spheres = generate(count, settings, rng);
        self.replace(backend, spheres)
    }

    /// Replace the scene with `spheres` and upload them.
    ///
    /// On allocation failure the scene is left empty with no device buffer.
    pub fn replace(&mut self, backend: &mut B, spheres: Vec<Sphere>) -> Result<Option<Warning>> {
        self.release(backend);

        if spheres.is_empty() {
            tracing::warn!("{}", Warning::EmptyScene);
            return Ok(Some(Warning::EmptyScene));
        }

        let buffer = backend.create_scene_buffer(encode(&spheres))?;
        tracing::debug!(
            count = spheres.len(),
            bytes = spheres.len() * SPHERE_STRIDE,
            "scene buffer uploaded"
        );
        self.buffer = Some(buffer);
        self.spheres = spheres;
        Ok(None)
    }

    /// Release the device buffer and forget the spheres.
    pub fn release(&mut self, backend: &mut B) {
        self.spheres.clear();
        if let Some(buffer) = self.buffer.take() {
            backend.release_buffer(buffer);
        }
    }

    /// Device buffer to bind, if the scene has any geometry.
    pub fn binding(&self) -> Option<&B::Buffer> {
        self.buffer.as_ref()
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }
}

impl<B: ComputeBackend> Default for SceneBuffer<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_rebuild_allocates_exact_size() {
        let mut backend = SoftwareBackend::new();
        let mut scene = SceneBuffer::new();
        let mut rng = SmallRng::seed_from_u64(1);

        let warning = scene.rebuild(&mut backend, 12, &SceneSettings::default(), &mut rng).unwrap();
        assert_eq!(warning, None);
        assert_eq!(scene.len(), 12);
        assert_eq!(scene.binding().map(|b| b.len()), Some(12 * SPHERE_STRIDE));
        assert_eq!(backend.stats().live_buffers, 1);
    }

    #[test]
    fn test_rebuild_releases_previous() {
        let mut backend = SoftwareBackend::new();
        let mut scene = SceneBuffer::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let settings = SceneSettings::default();

        scene.rebuild(&mut backend, 4, &settings, &mut rng).unwrap();
        scene.rebuild(&mut backend, 9, &settings, &mut rng).unwrap();
        assert_eq!(backend.stats().live_buffers, 1);
        assert_eq!(backend.stats().buffers_created, 2);
        assert_eq!(scene.binding().map(|b| b.len()), Some(9 * SPHERE_STRIDE));
    }

    #[test]
    fn test_empty_scene_has_no_buffer() {
        let mut backend = SoftwareBackend::new();
        let mut scene = SceneBuffer::new();
        let mut rng = SmallRng::seed_from_u64(3);
        let settings = SceneSettings::default();

        scene.rebuild(&mut backend, 3, &settings, &mut rng).unwrap();
        let warning = scene.rebuild(&mut backend, 0, &settings, &mut rng).unwrap();
        assert_eq!(warning, Some(Warning::EmptyScene));
        assert!(scene.binding().is_none());
        assert_eq!(backend.stats().live_buffers, 0);
    }

    #[test]
    fn test_failed_upload_leaves_scene_empty() {
        let mut backend = SoftwareBackend::with_memory_budget(SPHERE_STRIDE * 2);
        let mut scene = SceneBuffer::new();
        let spheres = vec![Sphere::new([0.0; 3], 1.0, [0.5; 3], [0.04; 3]); 3];

        assert!(scene.replace(&mut backend, spheres).is_err());
        assert!(scene.is_empty());
        assert!(scene.binding().is_none());
    }
}
