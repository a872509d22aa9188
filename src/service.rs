//! Scene-setup service: thin factory functions over the engine object model.
//!
//! [`SceneService`] holds no scene state of its own. It builds engines,
//! scenes, cameras, lights and ground meshes, imports asset files into a scene
//! and wires the render loop to the host window's lifecycle events.

use std::{cell::RefCell, rc::Rc};

use cgmath::{InnerSpace, Point3, Vector3};

use crate::{
    camera::{Camera, CameraOptions, CameraVariant},
    data_structures::{
        asset::{AnimationGroup, ParticleSystem, Skeleton},
        light::HemisphericLight,
        mesh::{GroundOptions, MAX_GROUND_VERTICES, create_ground, create_lines, create_plane},
        scene::{CameraId, LightId, MeshId, Scene, SceneOptions, SharedScene},
    },
    engine::{Canvas, Engine, EngineError, EngineOptions},
    resources::{ImportError, import_asset},
    window::{HostEvent, ReadyState, WindowService},
};

/// Where per-frame work is scheduled.
///
/// Hosts that track changes (a UI framework's change detection, a profiler)
/// provide a zone that keeps render-loop registration out of their tracking.
pub trait Zone {
    fn run_outside(&self, work: Box<dyn FnOnce() + '_>);
}

/// Runs everything in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct RootZone;

impl Zone for RootZone {
    fn run_outside(&self, work: Box<dyn FnOnce() + '_>) {
        work()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("invalid ground `{name}`: {reason}")]
    InvalidGround { name: String, reason: String },
    #[error("invalid light `{name}`: {reason}")]
    InvalidLight { name: String, reason: String },
    #[error("invalid camera `{name}`: {reason}")]
    InvalidCamera { name: String, reason: String },
}

/// What an import added to the scene.
#[derive(Clone, Debug, Default)]
pub struct ImportResult {
    pub meshes: Vec<MeshId>,
    pub particle_systems: Vec<ParticleSystem>,
    pub skeletons: Vec<Skeleton>,
    pub animation_groups: Vec<AnimationGroup>,
}

const AXIS_COLORS: [[f32; 4]; 3] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0, 1.0],
    [0.0, 0.0, 1.0, 1.0],
];

pub struct SceneService {
    zone: Rc<dyn Zone>,
    window_ref: WindowService,
}

impl std::fmt::Debug for SceneService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneService")
            .field("window_ref", &self.window_ref)
            .finish()
    }
}

impl SceneService {
    pub fn new(zone: Rc<dyn Zone>, window_ref: WindowService) -> Self {
        Self { zone, window_ref }
    }

    pub fn with_root_zone(window_ref: WindowService) -> Self {
        Self::new(Rc::new(RootZone), window_ref)
    }

    pub fn window_ref(&self) -> &WindowService {
        &self.window_ref
    }

    pub async fn create_engine(
        &self,
        canvas: Canvas,
        antialias: bool,
        options: EngineOptions,
        adapt_to_device_ratio: bool,
    ) -> Result<Engine, EngineError> {
        Engine::new(canvas, antialias, options, adapt_to_device_ratio).await
    }

    /// A scene with collisions on, a fully transparent clear colour and the
    /// world axes drawn 8 units long.
    pub fn create_scene(&self, engine: &Engine, options: SceneOptions) -> SharedScene {
        let mut scene = Scene::new(engine, options);
        scene.collisions_enabled = true;
        scene.clear_color = wgpu::Color {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 0.0,
        };
        self.show_world_axis(8.0, &mut scene);
        Rc::new(RefCell::new(scene))
    }

    /// Render `scene` on every engine frame, starting once the host document
    /// has loaded, and keep the engine sized to its canvas.
    pub fn animate(&self, scene: &SharedScene) {
        let engine = scene.borrow().engine().clone();
        let weak_scene = Rc::downgrade(scene);
        let window = self.window_ref.window().clone();
        let ready_state = self.window_ref.document().ready_state();

        self.zone.run_outside(Box::new(move || {
            let render_loop = move || {
                let Some(scene) = weak_scene.upgrade() else {
                    return;
                };
                // Frames driven while the scene is being edited are skipped.
                let Ok(mut scene) = scene.try_borrow_mut() else {
                    return;
                };
                if let Err(e) = scene.render() {
                    log::error!("Frame failed: {e:#}");
                }
            };

            if ready_state != ReadyState::Loading {
                engine.run_render_loop(render_loop);
            } else {
                log::info!("Document still loading, deferring the render loop");
                let weak_engine = engine.downgrade();
                let mut pending = Some(render_loop);
                window.add_event_listener(
                    HostEvent::DomContentLoaded,
                    Box::new(move || {
                        if let (Some(engine), Some(render_loop)) =
                            (weak_engine.upgrade(), pending.take())
                        {
                            engine.run_render_loop(render_loop);
                        }
                    }),
                );
            }

            let weak_engine = engine.downgrade();
            window.add_event_listener(
                HostEvent::Resize,
                Box::new(move || {
                    if let Some(engine) = weak_engine.upgrade() {
                        engine.resize();
                    }
                }),
            );
        }));
    }

    /// Red X, green Y and blue Z axis arrows of length `size`, each with a
    /// coloured label plane near its tip. The plane keeps its axis letter in
    /// [`Mesh::label`](crate::data_structures::mesh::Mesh::label); no glyphs
    /// are drawn.
    pub fn show_world_axis(&self, size: f32, scene: &mut Scene) {
        let tip = 0.95 * size;
        let barb = 0.05 * size;
        let axes = [
            (
                "axisX",
                "X",
                [
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(size, 0.0, 0.0),
                    Vector3::new(tip, barb, 0.0),
                    Vector3::new(size, 0.0, 0.0),
                    Vector3::new(tip, -barb, 0.0),
                ],
                Vector3::new(0.9 * size, -barb, 0.0),
            ),
            (
                "axisY",
                "Y",
                [
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(0.0, size, 0.0),
                    Vector3::new(-barb, tip, 0.0),
                    Vector3::new(0.0, size, 0.0),
                    Vector3::new(barb, tip, 0.0),
                ],
                Vector3::new(0.0, 0.9 * size, -barb),
            ),
            (
                "axisZ",
                "Z",
                [
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(0.0, 0.0, size),
                    Vector3::new(0.0, -barb, tip),
                    Vector3::new(0.0, 0.0, size),
                    Vector3::new(0.0, barb, tip),
                ],
                Vector3::new(0.0, barb, 0.9 * size),
            ),
        ];

        for ((name, label, points, label_position), color) in axes.into_iter().zip(AXIS_COLORS) {
            scene.add_mesh(create_lines(name, &points, color));

            let mut plane = create_plane("TextPlane", size / 10.0);
            plane.set_color(color);
            plane.label = Some(label.to_string());
            plane.position = label_position;
            scene.add_mesh(plane);
        }
    }

    pub fn create_free_camera(
        &self,
        name: &str,
        position: Point3<f32>,
        scene: &SharedScene,
        options: &CameraOptions,
    ) -> Result<CameraId, SceneError> {
        let camera = build_camera(name, CameraVariant::Free, position, options)?;
        Ok(scene
            .borrow_mut()
            .add_camera(camera, options.set_active_on_scene_if_none_active))
    }

    /// Like [`create_free_camera`](Self::create_free_camera), but driven by
    /// touch joysticks. It always becomes the active camera of a scene
    /// without one.
    pub fn create_virtual_joysticks_camera(
        &self,
        name: &str,
        position: Point3<f32>,
        scene: &SharedScene,
        options: &CameraOptions,
    ) -> Result<CameraId, SceneError> {
        let camera = build_camera(name, CameraVariant::VirtualJoysticks, position, options)?;
        Ok(scene.borrow_mut().add_camera(camera, true))
    }

    pub fn create_hemispheric_light(
        &self,
        name: &str,
        direction: Vector3<f32>,
        scene: &SharedScene,
    ) -> Result<LightId, SceneError> {
        let finite = direction.x.is_finite() && direction.y.is_finite() && direction.z.is_finite();
        if !finite || direction.magnitude2() <= f32::EPSILON {
            return Err(SceneError::InvalidLight {
                name: name.to_string(),
                reason: format!("direction {:?} has no orientation", direction),
            });
        }
        Ok(scene
            .borrow_mut()
            .add_light(HemisphericLight::new(name, direction)))
    }

    /// A flat ground mesh; it only collides when `check_collisions` says so.
    pub fn create_ground(
        &self,
        name: &str,
        scene: &SharedScene,
        options: &GroundOptions,
    ) -> Result<MeshId, SceneError> {
        let invalid = |reason: String| SceneError::InvalidGround {
            name: name.to_string(),
            reason,
        };
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !(positive(options.width) && positive(options.height)) {
            return Err(invalid(format!(
                "size {}x{} is not positive and finite",
                options.width, options.height
            )));
        }
        let (sx, sy) = options.subdivisions();
        if sx == 0 || sy == 0 {
            return Err(invalid(format!("{}x{} subdivisions", sx, sy)));
        }
        match options.vertex_count() {
            Some(count) if count <= MAX_GROUND_VERTICES => {}
            _ => {
                return Err(invalid(format!(
                    "{}x{} subdivisions exceed {} vertices",
                    sx, sy, MAX_GROUND_VERTICES
                )));
            }
        }

        let mut ground = create_ground(name, options);
        ground.check_collisions = options.check_collisions.unwrap_or(false);
        Ok(scene.borrow_mut().add_mesh(ground))
    }

    /// Load `file_name` from `root_url` and add its meshes to `scene`.
    ///
    /// The scene is only borrowed after loading finished, so it keeps
    /// rendering while the file is fetched.
    pub async fn import_mesh_async(
        &self,
        root_url: &str,
        file_name: &str,
        scene: &SharedScene,
    ) -> Result<ImportResult, ImportError> {
        let bundle = import_asset(root_url, file_name).await?;

        let mut scene = scene.borrow_mut();
        let meshes = bundle
            .meshes
            .into_iter()
            .map(|mesh| scene.add_mesh(mesh))
            .collect();
        scene.skeletons.extend(bundle.skeletons.iter().cloned());
        scene
            .particle_systems
            .extend(bundle.particle_systems.iter().cloned());
        scene
            .animation_groups
            .extend(bundle.animation_groups.iter().cloned());

        Ok(ImportResult {
            meshes,
            particle_systems: bundle.particle_systems,
            skeletons: bundle.skeletons,
            animation_groups: bundle.animation_groups,
        })
    }
}

fn build_camera(
    name: &str,
    variant: CameraVariant,
    position: Point3<f32>,
    options: &CameraOptions,
) -> Result<Camera, SceneError> {
    let invalid = |reason: String| SceneError::InvalidCamera {
        name: name.to_string(),
        reason,
    };
    if let Some(speed) = options.speed {
        if !speed.is_finite() || speed < 0.0 {
            return Err(invalid(format!("speed {speed} is not a finite non-negative number")));
        }
    }
    if let Some(ellipsoid) = options.ellipsoid {
        let axes = [ellipsoid.x, ellipsoid.y, ellipsoid.z];
        if axes.iter().any(|a| !a.is_finite() || *a <= 0.0) {
            return Err(invalid(format!("ellipsoid {:?} is not positive", ellipsoid)));
        }
    }

    let mut camera = Camera::new(name, variant, position);
    if let Some(target) = options.set_target {
        camera.set_target(target);
    }
    if let Some(attachment) = &options.attach_control {
        camera.attach_control(&attachment.element, attachment.no_prevent_default);
    }
    if let Some(ellipsoid) = options.ellipsoid {
        camera.ellipsoid = ellipsoid;
    }
    if let Some(speed) = options.speed {
        camera.speed = speed;
    }
    camera.check_collisions = options.check_collisions;
    camera.apply_gravity = options.apply_gravity;
    Ok(camera)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures::executor::block_on;

    use super::*;
    use crate::{
        camera::ControlAttachment,
        data_structures::mesh::Topology,
        window::WindowMock,
    };

    fn service() -> (SceneService, Rc<WindowMock>) {
        let window = Rc::new(WindowMock::new());
        let service = SceneService::with_root_zone(WindowService::from_window(window.clone()));
        (service, window)
    }

    fn scene(service: &SceneService) -> SharedScene {
        let engine = Engine::headless(Canvas::offscreen("canvas", 32, 32));
        service.create_scene(&engine, SceneOptions::default())
    }

    #[test]
    fn created_scene_is_transparent_and_collidable() {
        let (service, _) = service();
        let scene = scene(&service);
        let scene = scene.borrow();
        assert!(scene.collisions_enabled);
        assert_eq!(scene.clear_color.a, 0.0);
    }

    #[test]
    fn world_axis_has_three_lines_and_labels() {
        let (service, _) = service();
        let scene = scene(&service);
        let scene = scene.borrow();
        let lines: Vec<_> = scene
            .meshes()
            .iter()
            .filter(|m| m.topology == Topology::Lines)
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].vertices[1].position, [8.0, 0.0, 0.0]);
        assert_eq!(lines[2].vertices[0].color, [0.0, 0.0, 1.0, 1.0]);

        let labels: Vec<_> = scene.meshes().iter().filter_map(|m| m.label.as_deref()).collect();
        assert_eq!(labels, ["X", "Y", "Z"]);
        let y = &scene.meshes()[scene.find_mesh("axisY").unwrap().0 + 1];
        assert_eq!(y.position, Vector3::new(0.0, 0.9 * 8.0, -0.05 * 8.0));
    }

    #[test]
    fn ground_collisions_default_to_off() {
        let (service, _) = service();
        let scene = scene(&service);
        let id = service
            .create_ground("ground", &scene, &GroundOptions::sized(100.0, 100.0))
            .unwrap();
        assert!(!scene.borrow().mesh(id).unwrap().check_collisions);

        let options = GroundOptions {
            check_collisions: Some(true),
            ..GroundOptions::sized(100.0, 100.0)
        };
        let id = service.create_ground("ground", &scene, &options).unwrap();
        assert!(scene.borrow().mesh(id).unwrap().check_collisions);
    }

    #[test]
    fn degenerate_ground_is_rejected() {
        let (service, _) = service();
        let scene = scene(&service);
        let flat = GroundOptions::sized(0.0, 10.0);
        assert!(matches!(
            service.create_ground("ground", &scene, &flat),
            Err(SceneError::InvalidGround { .. })
        ));
        let no_cells = GroundOptions {
            subdivisions: 0,
            ..GroundOptions::sized(10.0, 10.0)
        };
        assert!(service.create_ground("ground", &scene, &no_cells).is_err());
    }

    #[test]
    fn unbounded_ground_is_rejected() {
        let (service, _) = service();
        let scene = scene(&service);
        let endless = GroundOptions::sized(f32::INFINITY, 100.0);
        assert!(matches!(
            service.create_ground("ground", &scene, &endless),
            Err(SceneError::InvalidGround { .. })
        ));

        for subdivisions in [65_536, 20_000, u32::MAX] {
            let dense = GroundOptions {
                subdivisions,
                ..GroundOptions::sized(100.0, 100.0)
            };
            assert!(matches!(
                service.create_ground("ground", &scene, &dense),
                Err(SceneError::InvalidGround { .. })
            ));
        }
        let meshes = scene.borrow().meshes().len();

        let largest = GroundOptions {
            subdivisions: 1023,
            ..GroundOptions::sized(100.0, 100.0)
        };
        let id = service.create_ground("ground", &scene, &largest).unwrap();
        assert_eq!(scene.borrow().meshes().len(), meshes + 1);
        assert_eq!(scene.borrow().mesh(id).unwrap().vertices.len(), 1024 * 1024);
    }

    #[test]
    fn zero_light_direction_is_rejected() {
        let (service, _) = service();
        let scene = scene(&service);
        assert!(matches!(
            service.create_hemispheric_light("light1", Vector3::new(0.0, 0.0, 0.0), &scene),
            Err(SceneError::InvalidLight { .. })
        ));
        let id = service
            .create_hemispheric_light("light1", Vector3::new(0.0, 1.0, 0.0), &scene)
            .unwrap();
        assert_eq!(scene.borrow().light(id).unwrap().name, "light1");
    }

    #[test]
    fn free_camera_applies_options() {
        let (service, _) = service();
        let scene = scene(&service);
        let options = CameraOptions {
            set_target: Some(Point3::new(0.0, 0.0, 0.0)),
            attach_control: Some(ControlAttachment {
                element: "canvas".to_string(),
                no_prevent_default: false,
            }),
            ellipsoid: Some(Vector3::new(1.5, 1.5, 1.5)),
            check_collisions: true,
            apply_gravity: true,
            speed: Some(0.2),
            ..Default::default()
        };
        let id = service
            .create_free_camera("FreeCamera", Point3::new(0.0, 2.0, 18.0), &scene, &options)
            .unwrap();
        let scene = scene.borrow();
        let camera = scene.camera(id).unwrap();
        assert_eq!(scene.active_camera_id(), Some(id));
        assert!(camera.is_attached_to("canvas"));
        assert_eq!(camera.ellipsoid, Vector3::new(1.5, 1.5, 1.5));
        assert_eq!(camera.speed, 0.2);
        assert!(camera.check_collisions && camera.apply_gravity);
    }

    #[test]
    fn free_camera_can_stay_inactive() {
        let (service, _) = service();
        let scene = scene(&service);
        let options = CameraOptions {
            set_active_on_scene_if_none_active: false,
            ..Default::default()
        };
        let id = service
            .create_free_camera("FreeCamera", Point3::new(0.0, 0.0, 0.0), &scene, &options)
            .unwrap();
        assert!(scene.borrow().active_camera_id().is_none());
        assert!(!scene.borrow().camera(id).unwrap().is_attached_to("canvas"));
    }

    #[test]
    fn joystick_camera_always_activates() {
        let (service, _) = service();
        let scene = scene(&service);
        let options = CameraOptions {
            set_active_on_scene_if_none_active: false,
            ..Default::default()
        };
        let id = service
            .create_virtual_joysticks_camera("VirtualJoysticksCamera", Point3::new(0.0, 2.0, 18.0), &scene, &options)
            .unwrap();
        assert_eq!(scene.borrow().active_camera_id(), Some(id));
    }

    #[test]
    fn invalid_camera_options_are_rejected() {
        let (service, _) = service();
        let scene = scene(&service);
        let options = CameraOptions {
            speed: Some(f32::NAN),
            ..Default::default()
        };
        assert!(matches!(
            service.create_free_camera("FreeCamera", Point3::new(0.0, 0.0, 0.0), &scene, &options),
            Err(SceneError::InvalidCamera { .. })
        ));
        let options = CameraOptions {
            ellipsoid: Some(Vector3::new(1.0, 0.0, 1.0)),
            ..Default::default()
        };
        assert!(service
            .create_virtual_joysticks_camera("VirtualJoysticksCamera", Point3::new(0.0, 0.0, 0.0), &scene, &options)
            .is_err());
        assert!(scene.borrow().cameras().is_empty());
    }

    #[test]
    fn animate_waits_for_the_document() {
        let (service, window) = service();
        let scene = scene(&service);
        let engine = scene.borrow().engine().clone();

        service.animate(&scene);
        assert_eq!(engine.render_loop_count(), 0);
        assert_eq!(window.listener_count(HostEvent::Resize), 1);

        assert_eq!(window.dispatch(HostEvent::DomContentLoaded), 1);
        assert_eq!(engine.render_loop_count(), 1);
        engine.frame();
        let log = engine.canvas().frame_log().unwrap();
        assert_eq!(log.borrow().frames, 1);
        assert_eq!(log.borrow().last_clear_color.map(|c| c.a), Some(0.0));
    }

    #[test]
    fn resize_listener_resizes_the_engine() {
        let (service, window) = service();
        let scene = scene(&service);
        let engine = scene.borrow().engine().clone();
        service.animate(&scene);

        engine.canvas().set_size(64, 48);
        window.dispatch(HostEvent::Resize);
        assert_eq!(engine.backend_size(), Some((64, 48)));
    }

    #[test]
    fn zone_runs_the_registration() {
        struct Counting(Rc<Cell<usize>>);
        impl Zone for Counting {
            fn run_outside(&self, work: Box<dyn FnOnce() + '_>) {
                self.0.set(self.0.get() + 1);
                work()
            }
        }
        let runs = Rc::new(Cell::new(0));
        let service = SceneService::new(
            Rc::new(Counting(runs.clone())),
            WindowService::from_window(Rc::new(WindowMock::new())),
        );
        let scene = scene(&service);
        service.animate(&scene);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn import_adds_meshes_to_the_scene() {
        let (service, _) = service();
        let scene = scene(&service);
        let before = scene.borrow().meshes().len();
        let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/assets/");
        let result = block_on(service.import_mesh_async(fixtures, "building.babylon", &scene)).unwrap();
        assert!(!result.meshes.is_empty());
        assert_eq!(scene.borrow().meshes().len(), before + result.meshes.len());
    }

    #[test]
    fn import_errors_leave_the_scene_alone() {
        let (service, _) = service();
        let scene = scene(&service);
        let before = scene.borrow().meshes().len();
        let result = block_on(service.import_mesh_async("nowhere/", "building.babylon", &scene));
        assert!(matches!(result, Err(ImportError::Io { .. })));
        assert_eq!(scene.borrow().meshes().len(), before);
    }
}
