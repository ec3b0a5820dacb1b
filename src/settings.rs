//! Tracer settings, persisted as JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;

use crate::util::{Error, Result};

/// Random scene parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub sphere_count: usize,
    /// Inclusive radius range [min, max]
    pub radius: [f32; 2],
    /// Spheres are placed in [-extent, extent]² on the XZ plane
    pub placement_extent: f32,
    /// Height of the plane the spheres rest on
    pub height_offset: f32,
    /// Chance that a sphere gets the metal split
    pub metal_probability: f32,
    /// Specular reflectance of non-metals
    pub dielectric_specular: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            sphere_count: 100,
            radius: [0.3, 1.5],
            placement_extent: 20.0,
            height_offset: 0.0,
            metal_probability: 0.5,
            dielectric_specular: 0.04,
        }
    }
}

/// Driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Workgroup edge length; must match the kernel's @workgroup_size
    pub group_size: u32,
    /// Stop dispatching after this many samples (0 = never)
    pub max_samples: u32,
    /// Largest per-element matrix change that does not count as camera motion.
    ///
    /// Drift within this bound keeps accumulating, and the kernel keeps receiving the
    /// pose recorded at the last reset rather than each frame's snapshot, so every
    /// blended sample comes from the same camera.
    pub camera_epsilon: f32,
    /// Seed for jitter and scene generation (None = entropy)
    pub seed: Option<u64>,
    pub scene: SceneSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            group_size: 8,
            max_samples: 0,
            camera_epsilon: 0.0,
            seed: None,
            scene: SceneSettings::default(),
        }
    }
}

impl Settings {
    /// Check ranges the driver relies on.
    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(Error::config("group_size must be at least 1"));
        }
        if !(self.camera_epsilon >= 0.0) {
            return Err(Error::config("camera_epsilon must be non-negative"));
        }

        let scene = &self.scene;
        let [r_min, r_max] = scene.radius;
        if !(r_min > 0.0 && r_min <= r_max) {
            return Err(Error::config(format!("invalid radius range [{r_min}, {r_max}]")));
        }
        if !(scene.placement_extent >= 0.0) {
            return Err(Error::config("placement_extent must be non-negative"));
        }
        if !(0.0..=1.0).contains(&scene.metal_probability) {
            return Err(Error::config("metal_probability must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&scene.dielectric_specular) {
            return Err(Error::config("dielectric_specular must be in [0, 1]"));
        }
        Ok(())
    }

    /// Load and validate settings from a JSON file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings as pretty JSON.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Default settings file location
    #[cfg(feature = "cli")]
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("progressive-tracer");
            p.push("settings.json");
            p
        })
    }

    /// Load from the user config dir, falling back to defaults on a missing or bad file.
    #[cfg(feature = "cli")]
    pub fn load() -> Self {
        let Some(path) = Self::path().filter(|p| p.exists()) else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "seed": 9, "scene": { "sphere_count": 3 } }"#).unwrap();
        assert_eq!(settings.seed, Some(9));
        assert_eq!(settings.group_size, 8);
        assert_eq!(settings.scene.sphere_count, 3);
        assert_eq!(settings.scene.radius, [0.3, 1.5]);
    }

    #[test]
    fn test_validate_rejects() {
        let mut s = Settings { group_size: 0, ..Default::default() };
        assert!(s.validate().is_err());

        s.group_size = 8;
        s.scene.radius = [2.0, 1.0];
        assert!(s.validate().is_err());

        s.scene.radius = [0.3, 1.5];
        s.scene.metal_probability = 1.5;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings { max_samples: 256, seed: Some(1234), ..Default::default() };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load_from(&path), Err(Error::Settings(_))));

        std::fs::write(&path, r#"{ "group_size": 0 }"#).unwrap();
        assert!(matches!(Settings::load_from(&path), Err(Error::Configuration(_))));
    }
}
