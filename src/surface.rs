//! Off-screen accumulation surface the kernel writes into.

use crate::backend::ComputeBackend;
use crate::util::Result;

/// Backend surface sized exactly to the output viewport.
pub struct AccumulationSurface<B: ComputeBackend> {
    surface: Option<B::Surface>,
}

impl<B: ComputeBackend> AccumulationSurface<B> {
    pub fn new() -> Self {
        Self { surface: None }
    }

    /// Make sure a `width × height` surface exists. Returns `true` if it was (re)allocated,
    /// in which case the caller must restart accumulation.
    ///
    /// Any existing surface of a different size is released before allocating. If the
    /// allocation fails the surface stays empty and the next call retries.
    pub fn ensure_valid(&mut self, backend: &mut B, width: u32, height: u32) -> Result<bool> {
        if let Some(surface) = &self.surface {
            if backend.surface_size(surface) == (width, height) {
                return Ok(false);
            }
        }

        if let Some(old) = self.surface.take() {
            let (old_w, old_h) = backend.surface_size(&old);
            tracing::debug!("accumulation surface resize {old_w}x{old_h} -> {width}x{height}");
            backend.release_surface(old);
        }

        self.surface = Some(backend.create_surface(width, height)?);
        Ok(true)
    }

    pub fn get(&self) -> Option<&B::Surface> {
        self.surface.as_ref()
    }

    /// Current dimensions, if allocated.
    pub fn size(&self, backend: &B) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| backend.surface_size(s))
    }

    pub fn release(&mut self, backend: &mut B) {
        if let Some(surface) = self.surface.take() {
            backend.release_surface(surface);
        }
    }
}

impl<B: ComputeBackend> Default for AccumulationSurface<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    #[test]
    fn test_allocates_once_per_size() {
        let mut backend = SoftwareBackend::new();
        let mut surface = AccumulationSurface::new();

        assert!(surface.ensure_valid(&mut backend, 64, 32).unwrap());
        assert!(!surface.ensure_valid(&mut backend, 64, 32).unwrap());
        assert_eq!(surface.size(&backend), Some((64, 32)));
        assert_eq!(backend.stats().surfaces_created, 1);

        assert!(surface.ensure_valid(&mut backend, 32, 64).unwrap());
        assert_eq!(backend.stats().surfaces_created, 2);
        assert_eq!(backend.stats().live_surfaces, 1);
    }

    #[test]
    fn test_failed_allocation_retries() {
        let mut backend = SoftwareBackend::with_memory_budget(16 * 16 * 16);
        let mut surface = AccumulationSurface::new();

        surface.ensure_valid(&mut backend, 16, 16).unwrap();
        assert!(surface.ensure_valid(&mut backend, 32, 32).is_err());
        assert!(surface.get().is_none());
        assert_eq!(backend.stats().live_surfaces, 0);

        backend.set_memory_budget(None);
        assert!(surface.ensure_valid(&mut backend, 32, 32).unwrap());
    }
}
