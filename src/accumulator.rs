//! Progressive sample accumulation.
//!
//! The destination holds the running mean of every kernel sample since the last reset.
//! Compositing sample `k` (0-based) with weight `1 / (k + 1)`:
//!
//! ```text
//! avg_k = avg_{k-1} * (1 - 1/(k+1)) + sample_k / (k+1)
//!       = (k * avg_{k-1} + sample_k) / (k + 1)
//! ```
//!
//! With `avg_{k-1} = (s_0 + .. + s_{k-1}) / k` this is exactly `(s_0 + .. + s_k) / (k + 1)`.
//! Weight is 1 at `k = 0`, so whatever the destination held before a reset is discarded.

use crate::backend::ComputeBackend;
use crate::util::Result;

/// Owns the sample counter and performs the weighted composite.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    sample_count: u32,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples blended into the destination since the last reset.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Blend weight for the next sample.
    pub fn weight(&self) -> f32 {
        1.0 / (self.sample_count as f32 + 1.0)
    }

    /// Restart accumulation; the next composite overwrites the destination.
    pub fn reset(&mut self) {
        if self.sample_count != 0 {
            tracing::debug!(samples = self.sample_count, "accumulation reset");
        }
        self.sample_count = 0;
    }

    /// Blend `source` into `target` and count the sample. Returns the weight used.
    ///
    /// The counter only advances when the backend reports success.
    pub fn composite<B: ComputeBackend>(
        &mut self,
        backend: &mut B,
        source: &B::Surface,
        target: &mut B::Target,
    ) -> Result<f32> {
        let weight = self.weight();
        backend.composite(source, target, weight)?;
        self.sample_count = self.sample_count.saturating_add(1);
        Ok(weight)
    }
}

/// `previous * (1 - weight) + sample * weight`, per channel. Exact `sample` at weight 1.
#[inline]
pub fn blend(previous: [f32; 4], sample: [f32; 4], weight: f32) -> [f32; 4] {
    std::array::from_fn(|i| previous[i] * (1.0 - weight) + sample[i] * weight)
}
