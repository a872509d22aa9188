//! The gallery view: puts engine, scene, camera, light, ground and the
//! building together in a fixed order.
//!
//! ```text
//! Uninitialized -> EngineReady -> SceneReady -> CameraReady -> LightReady
//!     -> GroundReady -> AssetPending -> AssetReady | AssetFailed
//! ```
//!
//! Any state can end in `Disposed`. The building import is the only step that
//! completes after [`Gallery::init`] returns; the scene is already rendering
//! while it loads.

use std::{
    cell::{Cell, RefCell},
    future::Future,
    pin::Pin,
    rc::Rc,
};

use winit::event::WindowEvent;

use crate::{
    camera::CameraVariant,
    config::GalleryConfig,
    device::{DeviceClass, MobileOptions},
    data_structures::scene::{CameraId, LightId, MeshId, SceneOptions, SharedScene},
    engine::{Canvas, Engine, EngineError},
    resources::ImportError,
    service::{SceneError, SceneService},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    EngineReady,
    SceneReady,
    CameraReady,
    LightReady,
    GroundReady,
    AssetPending,
    AssetReady,
    AssetFailed,
    Disposed,
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("could not create the engine")]
    Engine(#[from] EngineError),
    #[error("scene setup failed after {stage:?}")]
    Scene {
        stage: BootstrapState,
        #[source]
        source: SceneError,
    },
    #[error("gallery already started ({state:?})")]
    AlreadyStarted { state: BootstrapState },
}

/// Completes once the building is in the scene, yielding its mesh count.
pub type BuildingImport = Pin<Box<dyn Future<Output = Result<usize, ImportError>>>>;

pub struct Gallery {
    service: Rc<SceneService>,
    canvas: Canvas,
    config: GalleryConfig,
    device_class: DeviceClass,
    state: Rc<Cell<BootstrapState>>,
    engine: Option<Engine>,
    scene: Option<SharedScene>,
    camera: Option<CameraId>,
    light: Option<LightId>,
    ground: Option<MeshId>,
    building: Rc<RefCell<Vec<MeshId>>>,
}

impl std::fmt::Debug for Gallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery")
            .field("canvas", &self.canvas.id())
            .field("device_class", &self.device_class)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Gallery {
    /// Probes the host once; phones and tablets get the joystick camera.
    pub fn new(service: Rc<SceneService>, canvas: Canvas, config: GalleryConfig) -> Self {
        let device_class = DeviceClass::detect(service.window_ref(), MobileOptions::with_tablets());
        Self::with_device_class(service, canvas, config, device_class)
    }

    pub fn with_device_class(
        service: Rc<SceneService>,
        canvas: Canvas,
        config: GalleryConfig,
        device_class: DeviceClass,
    ) -> Self {
        Self {
            service,
            canvas,
            config,
            device_class,
            state: Rc::new(Cell::new(BootstrapState::Uninitialized)),
            engine: None,
            scene: None,
            camera: None,
            light: None,
            ground: None,
            building: Rc::default(),
        }
    }

    /// Build the scene and start rendering. The returned future imports the
    /// building; drive it on the local executor.
    ///
    /// If a step fails once the engine exists, the engine is disposed and the
    /// gallery ends up `Disposed`.
    pub async fn init(&mut self) -> Result<BuildingImport, BootstrapError> {
        let state = self.state();
        if state != BootstrapState::Uninitialized {
            return Err(BootstrapError::AlreadyStarted { state });
        }

        let engine = self
            .service
            .create_engine(
                self.canvas.clone(),
                self.config.antialias,
                self.config.engine.clone(),
                self.config.adapt_to_device_ratio,
            )
            .await
            .inspect_err(|e| log::error!("Gallery engine failed: {e}"))?;
        self.engine = Some(engine.clone());
        self.set_state(BootstrapState::EngineReady);

        let scene = self.service.create_scene(&engine, SceneOptions::default());
        self.scene = Some(scene.clone());
        self.set_state(BootstrapState::SceneReady);
        self.service.animate(&scene);

        if let Err(source) = self.populate(&scene) {
            let stage = self.state();
            log::error!("Gallery setup failed after {stage:?}: {source}");
            self.dispose();
            return Err(BootstrapError::Scene { stage, source });
        }

        self.set_state(BootstrapState::AssetPending);
        Ok(self.import_building(scene))
    }

    fn populate(&mut self, scene: &SharedScene) -> Result<(), SceneError> {
        let camera = &self.config.camera;
        let options = camera.options(self.canvas.id());
        let camera = match self.camera_variant() {
            CameraVariant::VirtualJoysticks => self.service.create_virtual_joysticks_camera(
                "VirtualJoysticksCamera",
                camera.position(),
                scene,
                &options,
            )?,
            CameraVariant::Free => {
                self.service
                    .create_free_camera("FreeCamera", camera.position(), scene, &options)?
            }
        };
        self.camera = Some(camera);
        self.set_state(BootstrapState::CameraReady);

        let light = &self.config.light;
        self.light = Some(
            self.service
                .create_hemispheric_light(&light.name, light.direction(), scene)?,
        );
        self.set_state(BootstrapState::LightReady);

        let ground = &self.config.ground;
        self.ground = Some(
            self.service
                .create_ground(&ground.name, scene, &ground.options())?,
        );
        self.set_state(BootstrapState::GroundReady);
        Ok(())
    }

    fn import_building(&self, scene: SharedScene) -> BuildingImport {
        let service = self.service.clone();
        let state = self.state.clone();
        let building = self.building.clone();
        let root_url = self.config.building.root_url.clone();
        let file_name = self.config.building.file_name.clone();

        Box::pin(async move {
            let import = match service.import_mesh_async(&root_url, &file_name, &scene).await {
                Ok(import) => import,
                Err(e) => {
                    log::error!("Building import failed: {e}");
                    if state.get() != BootstrapState::Disposed {
                        state.set(BootstrapState::AssetFailed);
                    }
                    return Err(e);
                }
            };

            {
                let mut scene = scene.borrow_mut();
                for id in &import.meshes {
                    if let Some(mesh) = scene.mesh_mut(*id) {
                        mesh.check_collisions = true;
                    }
                }
            }
            building.borrow_mut().extend(import.meshes.iter().copied());
            if state.get() != BootstrapState::Disposed {
                state.set(BootstrapState::AssetReady);
            }
            log::info!("Building ready with {} meshes", import.meshes.len());
            Ok(import.meshes.len())
        })
    }

    /// Stop rendering and release the scene.
    pub fn dispose(&mut self) {
        if let Some(engine) = &self.engine {
            engine.dispose();
        }
        self.scene = None;
        self.camera = None;
        self.light = None;
        self.ground = None;
        self.set_state(BootstrapState::Disposed);
    }

    /// Forward input received by the canvas to the active camera.
    pub fn handle_input(&self, event: &WindowEvent) -> bool {
        let (Some(scene), Some(engine)) = (&self.scene, &self.engine) else {
            return false;
        };
        let viewport = engine.render_size();
        match scene.try_borrow_mut() {
            Ok(mut scene) => scene.handle_input(self.canvas.id(), event, viewport),
            Err(_) => false,
        }
    }

    fn set_state(&self, state: BootstrapState) {
        log::debug!("Gallery {:?} -> {:?}", self.state.get(), state);
        self.state.set(state);
    }

    pub fn state(&self) -> BootstrapState {
        self.state.get()
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    pub fn camera_variant(&self) -> CameraVariant {
        if self.device_class.is_mobile() {
            CameraVariant::VirtualJoysticks
        } else {
            CameraVariant::Free
        }
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn scene(&self) -> Option<&SharedScene> {
        self.scene.as_ref()
    }

    pub fn camera(&self) -> Option<CameraId> {
        self.camera
    }

    pub fn light(&self) -> Option<LightId> {
        self.light
    }

    pub fn ground(&self) -> Option<MeshId> {
        self.ground
    }

    /// Meshes of the building, empty until the import finished.
    pub fn building_meshes(&self) -> Vec<MeshId> {
        self.building.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::window::{WindowMock, WindowService};

    fn gallery(device_class: DeviceClass) -> Gallery {
        let service = SceneService::with_root_zone(WindowService::from_window(Rc::new(WindowMock::new())));
        let mut config = GalleryConfig::default();
        config.building.root_url = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/assets/").to_string();
        Gallery::with_device_class(
            Rc::new(service),
            Canvas::offscreen("rendererCanvas", 320, 200),
            config,
            device_class,
        )
    }

    #[test]
    fn init_walks_every_state() {
        let mut gallery = gallery(DeviceClass::Desktop);
        assert_eq!(gallery.state(), BootstrapState::Uninitialized);
        let import = block_on(gallery.init()).unwrap();
        assert_eq!(gallery.state(), BootstrapState::AssetPending);
        assert!(gallery.building_meshes().is_empty());

        let count = block_on(import).unwrap();
        assert_eq!(gallery.state(), BootstrapState::AssetReady);
        assert_eq!(gallery.building_meshes().len(), count);
    }

    #[test]
    fn init_only_runs_once() {
        let mut gallery = gallery(DeviceClass::Desktop);
        let _import = block_on(gallery.init()).unwrap();
        assert!(matches!(
            block_on(gallery.init()),
            Err(BootstrapError::AlreadyStarted {
                state: BootstrapState::AssetPending
            })
        ));
    }

    #[test]
    fn dispose_before_import_keeps_disposed() {
        let mut gallery = gallery(DeviceClass::Mobile);
        let import = block_on(gallery.init()).unwrap();
        gallery.dispose();
        block_on(import).unwrap();
        assert_eq!(gallery.state(), BootstrapState::Disposed);
        assert!(gallery.engine().unwrap().is_disposed());
    }
}
