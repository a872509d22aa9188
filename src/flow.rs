//! Application event loop hosting one gallery.
//!
//! The loop creates the window (natively) or wraps the page's canvas (on the
//! web), boots the [`Gallery`] and then drives engine frames on every redraw.
//!
//! # Lifecycle Flow
//!
//! 1. `resumed`: create the window and start [`Gallery::init`]
//! 2. Once initialised, spawn the building import on the local executor
//! 3. Forward window input to the gallery's active camera
//! 4. On `RedrawRequested`, poll pending local tasks and run one engine frame
//! 5. On `CloseRequested`, dispose the gallery and leave the loop
//!
//! Natively there is no browser to announce `DOMContentLoaded` or `resize`,
//! so the loop plays that part on a [`WindowMock`].

use std::{fmt::Debug, rc::Rc, sync::Arc};

#[cfg(not(target_arch = "wasm32"))]
use futures::task::LocalSpawnExt;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

#[cfg(not(target_arch = "wasm32"))]
use crate::window::{HostEvent, WindowMock};
use crate::{
    config::GalleryConfig,
    device::DeviceClass,
    engine::Canvas,
    gallery::{BootstrapError, BuildingImport, Gallery},
    service::SceneService,
    window::WindowService,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub enum FlowEvent {
    #[allow(dead_code)]
    Initialized(Result<(Gallery, BuildingImport), BootstrapError>),
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(Ok((gallery, _))) => {
                f.debug_tuple("Initialized").field(gallery).finish()
            }
            Self::Initialized(Err(e)) => f.debug_tuple("Initialized").field(e).finish(),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[cfg(not(target_arch = "wasm32"))]
    local_pool: futures::executor::LocalPool,
    #[cfg(not(target_arch = "wasm32"))]
    host: Rc<WindowMock>,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<FlowEvent>,
    service: Rc<SceneService>,
    // Taken when the gallery is created.
    config: Option<GalleryConfig>,
    device_override: Option<DeviceClass>,
    window: Option<Arc<Window>>,
    gallery: Option<Gallery>,
}

impl App {
    fn new(
        event_loop: &EventLoop<FlowEvent>,
        config: GalleryConfig,
        device_override: Option<DeviceClass>,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();

        #[cfg(not(target_arch = "wasm32"))]
        let host = Rc::new(WindowMock::new());
        #[cfg(not(target_arch = "wasm32"))]
        let window_ref = WindowService::from_window(host.clone());
        #[cfg(target_arch = "wasm32")]
        let window_ref = WindowService::root();

        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            #[cfg(not(target_arch = "wasm32"))]
            local_pool: futures::executor::LocalPool::new(),
            #[cfg(not(target_arch = "wasm32"))]
            host,
            proxy,
            service: Rc::new(SceneService::with_root_zone(window_ref)),
            config: Some(config),
            device_override,
            window: None,
            gallery: None,
        })
    }

    fn build_gallery(&self, canvas: Canvas, config: GalleryConfig) -> Gallery {
        match self.device_override {
            Some(device_class) => {
                Gallery::with_device_class(self.service.clone(), canvas, config, device_class)
            }
            None => Gallery::new(self.service.clone(), canvas, config),
        }
    }

    fn on_initialized(&mut self, result: Result<(Gallery, BuildingImport), BootstrapError>) {
        let (gallery, import) = match result {
            Ok(initialized) => initialized,
            Err(e) => {
                log::error!("Gallery could not start: {e}");
                return;
            }
        };
        let task = async move {
            // Failures are logged and recorded by the gallery itself.
            let _ = import.await;
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Err(e) = self.local_pool.spawner().spawn_local(task) {
                log::error!("Could not schedule the building import: {e}");
            }
            // The mock document starts out loading; the window exists now.
            self.host.dispatch(HostEvent::DomContentLoaded);
        }
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(task);

        self.gallery = Some(gallery);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<FlowEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("Gallery");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(&config.canvas_id))
                .and_then(|element| element.dyn_into::<web_sys::HtmlCanvasElement>().ok());
            if canvas.is_none() {
                log::warn!("No <canvas id=\"{}\"> on the page, creating one", config.canvas_id);
            }
            window_attributes = window_attributes.with_canvas(canvas);
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create a window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let canvas = Canvas::from_window(config.canvas_id.clone(), window);
        let mut gallery = self.build_gallery(canvas, config);

        #[cfg(not(target_arch = "wasm32"))]
        {
            let result = self
                .async_runtime
                .block_on(gallery.init())
                .map(|import| (gallery, import));
            self.on_initialized(result);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let result = gallery.init().await.map(|import| (gallery, import));
                if proxy.send_event(FlowEvent::Initialized(result)).is_err() {
                    log::error!("Event loop closed before the gallery was ready");
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            FlowEvent::Initialized(result) => self.on_initialized(result),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(gallery) = &mut self.gallery else {
            if let WindowEvent::CloseRequested = event {
                event_loop.exit();
            }
            return;
        };

        gallery.handle_input(&event);

        match event {
            WindowEvent::CloseRequested => {
                gallery.dispose();
                event_loop.exit();
            }
            #[cfg(not(target_arch = "wasm32"))]
            WindowEvent::Resized(_) => {
                self.host.dispatch(HostEvent::Resize);
            }
            WindowEvent::RedrawRequested => {
                #[cfg(not(target_arch = "wasm32"))]
                self.local_pool.run_until_stalled();

                if let Some(engine) = gallery.engine() {
                    engine.frame();
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Open a window (or take over the page's canvas) and show the gallery until
/// it is closed. `device_override` skips the user-agent probe.
pub fn run(config: GalleryConfig, device_override: Option<DeviceClass>) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            eprintln!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Could not initialize logger: {e}").into());
        }
    }

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config, device_override)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Web entry point: show the gallery on the canvas with id `canvas_id`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start_gallery(canvas_id: String) -> Result<(), JsValue> {
    let config = GalleryConfig {
        canvas_id,
        ..Default::default()
    };
    run(config, None).map_err(|e| JsValue::from_str(&format!("{e:#}")))
}
