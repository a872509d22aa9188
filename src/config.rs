//! Gallery configuration, loadable from JSON.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes:
//!
//! ```json
//! { "building": { "root_url": "exhibits/", "file_name": "hall.glb" } }
//! ```

use std::path::Path;

use anyhow::Context as _;
use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    camera::{CameraOptions, ControlAttachment},
    data_structures::mesh::GroundOptions,
    engine::EngineOptions,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Id of the canvas element the scene is drawn into.
    pub canvas_id: String,
    pub antialias: bool,
    pub adapt_to_device_ratio: bool,
    pub engine: EngineOptions,
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub ground: GroundConfig,
    pub building: BuildingConfig,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            canvas_id: "rendererCanvas".to_string(),
            antialias: true,
            adapt_to_device_ratio: true,
            engine: EngineOptions::default(),
            camera: CameraConfig::default(),
            light: LightConfig::default(),
            ground: GroundConfig::default(),
            building: BuildingConfig::default(),
        }
    }
}

impl GalleryConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid gallery configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub ellipsoid: [f32; 3],
    pub check_collisions: bool,
    pub apply_gravity: bool,
    pub speed: f32,
    pub no_prevent_default: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.0, 18.0],
            target: [0.0, 0.0, 0.0],
            ellipsoid: [1.5, 1.5, 1.5],
            check_collisions: true,
            apply_gravity: true,
            speed: 0.2,
            no_prevent_default: false,
        }
    }
}

impl CameraConfig {
    pub fn position(&self) -> Point3<f32> {
        self.position.into()
    }

    /// Camera options with input bound to `canvas_id`.
    pub fn options(&self, canvas_id: &str) -> CameraOptions {
        CameraOptions {
            set_target: Some(self.target.into()),
            attach_control: Some(ControlAttachment {
                element: canvas_id.to_string(),
                no_prevent_default: self.no_prevent_default,
            }),
            ellipsoid: Some(self.ellipsoid.into()),
            check_collisions: self.check_collisions,
            apply_gravity: self.apply_gravity,
            speed: Some(self.speed),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub name: String,
    pub direction: [f32; 3],
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            name: "light1".to_string(),
            direction: [0.0, 1.0, 0.0],
        }
    }
}

impl LightConfig {
    pub fn direction(&self) -> Vector3<f32> {
        self.direction.into()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    pub name: String,
    pub width: f32,
    pub height: f32,
    pub subdivisions: u32,
    pub check_collisions: bool,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            name: "ground".to_string(),
            width: 100.0,
            height: 100.0,
            subdivisions: 1,
            check_collisions: true,
        }
    }
}

impl GroundConfig {
    pub fn options(&self) -> GroundOptions {
        GroundOptions {
            subdivisions: self.subdivisions,
            check_collisions: Some(self.check_collisions),
            ..GroundOptions::sized(self.width, self.height)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    pub root_url: String,
    pub file_name: String,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            root_url: "assets/".to_string(),
            file_name: "building.babylon".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_the_gallery_defaults() {
        let config = GalleryConfig::from_json("{}").unwrap();
        assert_eq!(config, GalleryConfig::default());
        assert_eq!(config.camera.position(), Point3::new(0.0, 2.0, 18.0));
        assert_eq!(config.light.name, "light1");
        assert_eq!(config.building.file_name, "building.babylon");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config =
            GalleryConfig::from_json(r#"{ "camera": { "speed": 0.5 }, "ground": { "width": 20 } }"#)
                .unwrap();
        assert_eq!(config.camera.speed, 0.5);
        assert_eq!(config.camera.ellipsoid, [1.5, 1.5, 1.5]);
        assert_eq!(config.ground.width, 20.0);
        assert_eq!(config.ground.height, 100.0);
    }

    #[test]
    fn camera_options_attach_to_the_canvas() {
        let options = CameraConfig::default().options("rendererCanvas");
        let attachment = options.attach_control.unwrap();
        assert_eq!(attachment.element, "rendererCanvas");
        assert!(!attachment.no_prevent_default);
        assert_eq!(options.speed, Some(0.2));
        assert!(options.set_active_on_scene_if_none_active);
    }

    #[test]
    fn ground_options_collide() {
        let options = GroundConfig::default().options();
        assert_eq!(options.check_collisions, Some(true));
        assert_eq!((options.width, options.height), (100.0, 100.0));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(GalleryConfig::from_json(r#"{ "antialias": "yes" }"#).is_err());
    }
}
