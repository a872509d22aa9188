//! The engine handle: a canvas, a drawing backend and the render loops.
//!
//! An [`Engine`] is a cheap `Rc` handle. Render loops are plain callbacks run
//! by [`Engine::frame`], which the host calls once per display frame; they run
//! until [`Engine::dispose`] removes them.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
    sync::Arc,
};

use instant::{Duration, Instant};
use serde::{Deserialize, Serialize};
use winit::window::Window;

use crate::{context::GpuContext, data_structures::scene::Scene};

/// Something that can put a scene on screen.
pub trait Backend {
    /// Current drawing buffer size in physical pixels.
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);
    fn draw(&mut self, scene: &Scene) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("canvas `{canvas}` has no drawable area")]
    UnusableCanvas { canvas: String },
    #[error("failed to create a surface for canvas `{canvas}`")]
    Surface {
        canvas: String,
        #[source]
        source: wgpu::CreateSurfaceError,
    },
    #[error("no suitable graphics adapter")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open the graphics device")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("the adapter cannot present to canvas `{canvas}`")]
    UnsupportedSurface { canvas: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub high_performance: bool,
    pub force_fallback_adapter: bool,
    /// Composite the canvas with premultiplied alpha so a transparent clear
    /// colour shows the page behind it.
    pub premultiplied_alpha: bool,
    pub vsync: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            high_performance: false,
            force_fallback_adapter: false,
            premultiplied_alpha: true,
            vsync: true,
        }
    }
}

impl EngineOptions {
    pub fn power_preference(&self) -> wgpu::PowerPreference {
        if self.high_performance {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::default()
        }
    }
}

/// What the headless backend saw, shared with whoever created the canvas.
#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    pub frames: u64,
    pub resizes: u64,
    pub last_size: (u32, u32),
    pub last_clear_color: Option<wgpu::Color>,
    pub last_mesh_count: usize,
    pub last_camera: Option<String>,
}

pub type FrameLog = Rc<RefCell<FrameStats>>;

#[derive(Clone, Debug)]
enum CanvasSurface {
    Window(Arc<Window>),
    Offscreen {
        size: Rc<Cell<(u32, u32)>>,
        log: FrameLog,
    },
}

/// The element the engine draws into.
#[derive(Clone, Debug)]
pub struct Canvas {
    id: String,
    surface: CanvasSurface,
}

impl Canvas {
    pub fn from_window(id: impl Into<String>, window: Arc<Window>) -> Self {
        Self {
            id: id.into(),
            surface: CanvasSurface::Window(window),
        }
    }

    /// A canvas without a window, drawn by the headless backend.
    pub fn offscreen(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            surface: CanvasSurface::Offscreen {
                size: Rc::new(Cell::new((width, height))),
                log: FrameLog::default(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.surface {
            CanvasSurface::Window(window) => Some(window),
            CanvasSurface::Offscreen { .. } => None,
        }
    }

    pub fn physical_size(&self) -> (u32, u32) {
        match &self.surface {
            CanvasSurface::Window(window) => {
                let size = window.inner_size();
                (size.width, size.height)
            }
            CanvasSurface::Offscreen { size, .. } => size.get(),
        }
    }

    pub fn scale_factor(&self) -> f64 {
        match &self.surface {
            CanvasSurface::Window(window) => window.scale_factor(),
            CanvasSurface::Offscreen { .. } => 1.0,
        }
    }

    /// Resize an offscreen canvas. Window canvases follow their window.
    pub fn set_size(&self, width: u32, height: u32) {
        if let CanvasSurface::Offscreen { size, .. } = &self.surface {
            size.set((width, height));
        }
    }

    pub fn frame_log(&self) -> Option<FrameLog> {
        match &self.surface {
            CanvasSurface::Window(_) => None,
            CanvasSurface::Offscreen { log, .. } => Some(log.clone()),
        }
    }
}

/// Size of the drawing buffer for `canvas`: physical pixels when adapting to
/// the device ratio, logical pixels otherwise.
pub fn render_size(canvas: &Canvas, adapt_to_device_ratio: bool) -> (u32, u32) {
    let (width, height) = canvas.physical_size();
    let scale = canvas.scale_factor();
    if adapt_to_device_ratio || scale <= 1.0 {
        (width, height)
    } else {
        (
            (width as f64 / scale).round() as u32,
            (height as f64 / scale).round() as u32,
        )
    }
}

/// Records frames instead of drawing them.
#[derive(Debug)]
pub struct HeadlessBackend {
    size: (u32, u32),
    log: FrameLog,
}

impl HeadlessBackend {
    pub fn new(size: (u32, u32), log: FrameLog) -> Self {
        log.borrow_mut().last_size = size;
        Self { size, log }
    }
}

impl Backend for HeadlessBackend {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        let mut log = self.log.borrow_mut();
        log.resizes += 1;
        log.last_size = self.size;
    }

    fn draw(&mut self, scene: &Scene) -> anyhow::Result<()> {
        let mut log = self.log.borrow_mut();
        log.frames += 1;
        log.last_clear_color = Some(scene.clear_color);
        log.last_mesh_count = scene.meshes().iter().filter(|m| m.is_visible).count();
        log.last_camera = scene.active_camera().map(|c| c.name.clone());
        Ok(())
    }
}

pub type RenderCallback = Box<dyn FnMut()>;

struct EngineInner {
    canvas: Canvas,
    adapt_to_device_ratio: bool,
    backend: RefCell<Option<Box<dyn Backend>>>,
    render_loops: RefCell<Vec<RenderCallback>>,
    last_frame: Cell<Option<Instant>>,
    delta: Cell<Duration>,
    frame_count: Cell<u64>,
    disposed: Cell<bool>,
}

#[derive(Clone)]
pub struct Engine(Rc<EngineInner>);

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("canvas", &self.0.canvas.id)
            .field("render_loops", &self.render_loop_count())
            .field("frames", &self.frame_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Engine {
    /// Open the canvas: a GPU backend for window canvases, the headless one for
    /// offscreen canvases with a non-zero size.
    pub async fn new(
        canvas: Canvas,
        antialias: bool,
        options: EngineOptions,
        adapt_to_device_ratio: bool,
    ) -> Result<Self, EngineError> {
        let size = render_size(&canvas, adapt_to_device_ratio);
        let backend: Box<dyn Backend> = match canvas.window() {
            Some(window) => Box::new(
                GpuContext::new(canvas.id(), window.clone(), size, antialias, &options).await?,
            ),
            None => {
                if size.0 == 0 || size.1 == 0 {
                    return Err(EngineError::UnusableCanvas {
                        canvas: canvas.id.clone(),
                    });
                }
                let log = canvas.frame_log().unwrap_or_default();
                Box::new(HeadlessBackend::new(size, log))
            }
        };
        log::info!(
            "Engine ready on canvas `{}` ({}x{}, antialias: {})",
            canvas.id,
            size.0,
            size.1,
            antialias
        );
        Ok(Self::with_backend(canvas, backend, adapt_to_device_ratio))
    }

    pub fn with_backend(
        canvas: Canvas,
        backend: Box<dyn Backend>,
        adapt_to_device_ratio: bool,
    ) -> Self {
        Self(Rc::new(EngineInner {
            canvas,
            adapt_to_device_ratio,
            backend: RefCell::new(Some(backend)),
            render_loops: RefCell::new(Vec::new()),
            last_frame: Cell::new(None),
            delta: Cell::new(Duration::ZERO),
            frame_count: Cell::new(0),
            disposed: Cell::new(false),
        }))
    }

    /// Headless engine over an offscreen canvas, whatever its size.
    pub fn headless(canvas: Canvas) -> Self {
        let size = canvas.physical_size();
        let log = canvas.frame_log().unwrap_or_default();
        Self::with_backend(canvas, Box::new(HeadlessBackend::new(size, log)), true)
    }

    pub fn canvas(&self) -> &Canvas {
        &self.0.canvas
    }

    pub fn render_size(&self) -> (u32, u32) {
        render_size(&self.0.canvas, self.0.adapt_to_device_ratio)
    }

    /// Size of the backend's drawing buffer, `None` once disposed.
    pub fn backend_size(&self) -> Option<(u32, u32)> {
        self.0.backend.borrow().as_ref().map(|b| b.size())
    }

    pub fn run_render_loop(&self, callback: impl FnMut() + 'static) {
        if self.is_disposed() {
            log::warn!("Ignoring render loop on disposed engine");
            return;
        }
        self.0.render_loops.borrow_mut().push(Box::new(callback));
    }

    pub fn render_loop_count(&self) -> usize {
        self.0.render_loops.borrow().len()
    }

    /// Run every render loop once.
    pub fn frame(&self) {
        if self.is_disposed() {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.0.last_frame.replace(Some(now)) {
            self.0.delta.set(now - last);
        }

        // Callbacks may register loops or dispose the engine while running.
        let mut callbacks = std::mem::take(&mut *self.0.render_loops.borrow_mut());
        for callback in callbacks.iter_mut() {
            callback();
            if self.is_disposed() {
                return;
            }
        }
        let mut loops = self.0.render_loops.borrow_mut();
        let added = std::mem::take(&mut *loops);
        *loops = callbacks;
        loops.extend(added);
        self.0.frame_count.set(self.0.frame_count.get() + 1);
    }

    /// Match the drawing buffer to the canvas.
    pub fn resize(&self) {
        let (width, height) = self.render_size();
        if width == 0 || height == 0 {
            return;
        }
        if let Some(backend) = self.0.backend.borrow_mut().as_mut() {
            if backend.size() != (width, height) {
                log::info!("Resizing canvas `{}` to {}x{}", self.0.canvas.id, width, height);
                backend.resize(width, height);
            }
        }
    }

    pub fn draw(&self, scene: &Scene) -> anyhow::Result<()> {
        match self.0.backend.borrow_mut().as_mut() {
            Some(backend) => backend.draw(scene),
            None => Ok(()),
        }
    }

    /// Time between the last two frames.
    pub fn delta_time(&self) -> Duration {
        self.0.delta.get()
    }

    pub fn frame_count(&self) -> u64 {
        self.0.frame_count.get()
    }

    /// Stop all render loops and release the backend.
    pub fn dispose(&self) {
        if self.0.disposed.replace(true) {
            return;
        }
        let loops = std::mem::take(&mut *self.0.render_loops.borrow_mut());
        let backend = self.0.backend.borrow_mut().take();
        drop(loops);
        drop(backend);
        log::info!("Engine on canvas `{}` disposed", self.0.canvas.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn downgrade(&self) -> WeakEngine {
        WeakEngine(Rc::downgrade(&self.0))
    }
}

/// Engine reference that does not keep the engine alive.
#[derive(Clone)]
pub struct WeakEngine(Weak<EngineInner>);

impl WeakEngine {
    pub fn upgrade(&self) -> Option<Engine> {
        self.0.upgrade().map(Engine)
    }
}
