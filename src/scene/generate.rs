//! Random sphere scene generation.
//!
//! Spheres rest on the plane `y = height_offset`, scattered uniformly over a square
//! of half-size `placement_extent`. Overlap between spheres is not checked.

use rand::Rng;

use super::sphere::Sphere;
use crate::settings::SceneSettings;

/// Generate `count` spheres using the ranges in `settings`.
#[tracing::instrument(skip(settings, rng))]
pub fn generate<R: Rng + ?Sized>(count: usize, settings: &SceneSettings, rng: &mut R) -> Vec<Sphere> {
    let [r_min, r_max] = settings.radius;
    let extent = settings.placement_extent;

    (0..count)
        .map(|_| {
            let radius = if r_max > r_min { rng.gen_range(r_min..=r_max) } else { r_min };
            let x = if extent > 0.0 { rng.gen_range(-extent..=extent) } else { 0.0 };
            let z = if extent > 0.0 { rng.gen_range(-extent..=extent) } else { 0.0 };
            let color: [f32; 3] = rng.gen();
            let metal = rng.gen_bool(settings.metal_probability.clamp(0.0, 1.0) as f64);
            make_sphere([x, z], radius, color, metal, settings)
        })
        .collect()
}

/// Build one sphere from already-drawn random values.
///
/// Metals get the color as specular and no diffuse; everything else gets the color as
/// diffuse and the fixed dielectric reflectance as specular.
pub fn make_sphere(
    position_xz: [f32; 2],
    radius: f32,
    color: [f32; 3],
    metal: bool,
    settings: &SceneSettings,
) -> Sphere {
    let center = [position_xz[0], radius + settings.height_offset, position_xz[1]];
    if metal {
        Sphere::new(center, radius, [0.0; 3], color)
    } else {
        Sphere::new(center, radius, color, [settings.dielectric_specular; 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_ranges() {
        let settings = SceneSettings::default();
        let mut rng = SmallRng::seed_from_u64(7);
        let spheres = generate(500, &settings, &mut rng);
        assert_eq!(spheres.len(), 500);

        for s in &spheres {
            assert!((0.3..=1.5).contains(&s.radius), "radius {}", s.radius);
            assert!(s.center[0].abs() <= 20.0 && s.center[2].abs() <= 20.0);
            assert_eq!(s.center[1], s.radius);
        }
        // Roughly half metal at the default probability
        let metals = spheres.iter().filter(|s| s.is_metal()).count();
        assert!((150..350).contains(&metals), "metals = {metals}");
    }

    #[test]
    fn test_same_seed_same_scene() {
        let settings = SceneSettings::default();
        let a = generate(32, &settings, &mut SmallRng::seed_from_u64(42));
        let b = generate(32, &settings, &mut SmallRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_height_offset() {
        let settings = SceneSettings { height_offset: 2.0, ..Default::default() };
        let s = make_sphere([1.0, -1.0], 0.5, [0.1, 0.2, 0.3], false, &settings);
        assert_eq!(s.center, [1.0, 2.5, -1.0]);
    }

    #[test]
    fn test_zero_count() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(generate(0, &SceneSettings::default(), &mut rng).is_empty());
    }
}
