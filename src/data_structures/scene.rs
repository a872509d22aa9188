//! The scene: an arena of meshes, cameras and lights drawn by one engine.

use std::{cell::RefCell, rc::Rc};

use cgmath::Vector3;
use winit::event::WindowEvent;

use crate::{
    camera::Camera,
    data_structures::{
        asset::{AnimationGroup, ParticleSystem, Skeleton},
        light::HemisphericLight,
        mesh::Mesh,
    },
    engine::Engine,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CameraId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId(pub(crate) usize);

pub type SharedScene = Rc<RefCell<Scene>>;

#[derive(Clone, Debug, PartialEq)]
pub struct SceneOptions {
    /// Stored for a collision system to consume, in units per frame. Cameras
    /// only record their `apply_gravity` flag.
    pub gravity: Vector3<f32>,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81 / 60.0, 0.0),
        }
    }
}

pub struct Scene {
    engine: Engine,
    pub collisions_enabled: bool,
    pub clear_color: wgpu::Color,
    pub gravity: Vector3<f32>,
    meshes: Vec<Mesh>,
    cameras: Vec<Camera>,
    lights: Vec<HemisphericLight>,
    active_camera: Option<CameraId>,
    pub skeletons: Vec<Skeleton>,
    pub particle_systems: Vec<ParticleSystem>,
    pub animation_groups: Vec<AnimationGroup>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("collisions_enabled", &self.collisions_enabled)
            .field("meshes", &self.meshes.len())
            .field("cameras", &self.cameras.len())
            .field("lights", &self.lights.len())
            .field("active_camera", &self.active_camera)
            .finish()
    }
}

impl Scene {
    pub fn new(engine: &Engine, options: SceneOptions) -> Self {
        Self {
            engine: engine.clone(),
            collisions_enabled: false,
            clear_color: wgpu::Color {
                r: 0.2,
                g: 0.2,
                b: 0.3,
                a: 1.0,
            },
            gravity: options.gravity,
            meshes: Vec::new(),
            cameras: Vec::new(),
            lights: Vec::new(),
            active_camera: None,
            skeletons: Vec::new(),
            particle_systems: Vec::new(),
            animation_groups: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.get_mut(id.0)
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn find_mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes.iter().position(|m| m.name == name).map(MeshId)
    }

    /// Adds `camera`, making it active if `activate_if_none` is set and no
    /// camera is active yet.
    pub fn add_camera(&mut self, camera: Camera, activate_if_none: bool) -> CameraId {
        self.cameras.push(camera);
        let id = CameraId(self.cameras.len() - 1);
        if activate_if_none && self.active_camera.is_none() {
            self.active_camera = Some(id);
        }
        id
    }

    pub fn camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(id.0)
    }

    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(id.0)
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn active_camera_id(&self) -> Option<CameraId> {
        self.active_camera
    }

    pub fn active_camera(&self) -> Option<&Camera> {
        self.active_camera.and_then(|id| self.camera(id))
    }

    pub fn add_light(&mut self, light: HemisphericLight) -> LightId {
        self.lights.push(light);
        LightId(self.lights.len() - 1)
    }

    pub fn light(&self, id: LightId) -> Option<&HemisphericLight> {
        self.lights.get(id.0)
    }

    pub fn lights(&self) -> &[HemisphericLight] {
        &self.lights
    }

    /// First enabled light, the one the shader uses.
    pub fn main_light(&self) -> Option<&HemisphericLight> {
        self.lights.iter().find(|l| l.enabled)
    }

    /// Route an input event from `element` to the active camera.
    pub fn handle_input(&mut self, element: &str, event: &WindowEvent, viewport: (u32, u32)) -> bool {
        let Some(id) = self.active_camera else {
            return false;
        };
        self.cameras[id.0].handle_window_event(element, event, viewport)
    }

    /// Advance the active camera and draw one frame.
    pub fn render(&mut self) -> anyhow::Result<()> {
        let dt = self.engine.delta_time();
        if let Some(id) = self.active_camera {
            self.cameras[id.0].update(dt);
        }
        let engine = self.engine.clone();
        engine.draw(self)
    }
}
