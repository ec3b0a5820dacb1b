//! Sphere primitive and its packed GPU record.
//!
//! Record layout (40 bytes, tightly packed f32s, little-endian on every target wgpu runs on):
//! ```text
//! offset  0: center   vec3<f32>
//! offset 12: radius   f32
//! offset 16: diffuse  vec3<f32>
//! offset 28: specular vec3<f32>
//! ```
//! WGSL aligns `vec3` to 16 bytes inside structs, so kernels read the buffer as
//! `array<f32>` and unpack [`SPHERE_FLOATS`] floats per record. Changing this layout
//! means changing every kernel in lockstep.

use bytemuck::{Pod, Zeroable};

use crate::util::{Error, Result};

/// Byte stride of one sphere record in the scene buffer.
pub const SPHERE_STRIDE: usize = 40;

/// Number of f32 values per record.
pub const SPHERE_FLOATS: usize = SPHERE_STRIDE / 4;

/// Traceable sphere with a diffuse/specular material split.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub center: [f32; 3],
    pub radius: f32,
    /// Lambertian albedo; zero for metals
    pub diffuse: [f32; 3],
    /// Specular reflectance (F0)
    pub specular: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<Sphere>() == SPHERE_STRIDE);

impl Sphere {
    pub fn new(center: [f32; 3], radius: f32, diffuse: [f32; 3], specular: [f32; 3]) -> Self {
        Self { center, radius, diffuse, specular }
    }

    /// Whether this sphere uses the metal split (no diffuse term).
    pub fn is_metal(&self) -> bool {
        self.diffuse == [0.0; 3]
    }
}

/// Pack spheres into the scene buffer byte layout.
pub fn encode(spheres: &[Sphere]) -> &[u8] {
    bytemuck::cast_slice(spheres)
}

/// Unpack a scene buffer back into spheres.
///
/// Accepts unaligned input, so bytes read back from a mapped buffer or a `Vec<u8>`
/// decode without copying into an aligned allocation first.
pub fn decode(bytes: &[u8]) -> Result<Vec<Sphere>> {
    if bytes.len() % SPHERE_STRIDE != 0 {
        return Err(Error::config(format!(
            "scene buffer length {} is not a multiple of the {SPHERE_STRIDE}-byte sphere stride",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(SPHERE_STRIDE)
        .map(bytemuck::pod_read_unaligned::<Sphere>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_offsets() {
        let s = Sphere::new([1.0, 2.0, 3.0], 4.0, [5.0, 6.0, 7.0], [8.0, 9.0, 10.0]);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&s));
        assert_eq!(floats.len(), SPHERE_FLOATS);
        assert_eq!(floats, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_decode_unaligned() {
        let spheres = [
            Sphere::new([0.5, 1.0, -3.0], 1.0, [0.2, 0.4, 0.6], [0.04; 3]),
            Sphere::new([-7.0, 0.3, 12.5], 0.3, [0.0; 3], [0.9, 0.1, 0.3]),
        ];
        // Shift by one byte to force a misaligned view.
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(encode(&spheres));
        let decoded = decode(&shifted[1..]).unwrap();
        assert_eq!(decoded, spheres);
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        assert!(decode(&[0u8; SPHERE_STRIDE + 4]).is_err());
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_is_metal() {
        assert!(Sphere::new([0.0; 3], 1.0, [0.0; 3], [0.5; 3]).is_metal());
        assert!(!Sphere::new([0.0; 3], 1.0, [0.5; 3], [0.04; 3]).is_metal());
    }
}
