//! Scene description: a flat list of spheres uploaded verbatim.
//!
//! ```text
//! SceneSettings + rng → generate() → Vec<Sphere> → encode() → SceneBuffer (device buffer)
//! ```

pub mod buffer;
pub mod generate;
pub mod sphere;

pub use buffer::SceneBuffer;
pub use generate::{generate, make_sphere};
pub use sphere::{decode, encode, Sphere, SPHERE_FLOATS, SPHERE_STRIDE};
