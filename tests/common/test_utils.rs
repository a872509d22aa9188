use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use gallery_ngin::{
    config::GalleryConfig,
    engine::Canvas,
    service::{SceneService, Zone},
    window::{
        HostDocument, HostEvent, HostWindow, Listener, ReadyState, Storage, StorageMock,
        WindowService,
    },
};

pub const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/assets/");
pub const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
pub const DESKTOP: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

pub struct TestDocument(Cell<ReadyState>);

impl HostDocument for TestDocument {
    fn ready_state(&self) -> ReadyState {
        self.0.get()
    }
}

/// A browser-like window whose ready state and user agent the test picks.
pub struct RecordingWindow {
    document: TestDocument,
    storage: StorageMock,
    user_agent: Option<String>,
    listeners: RefCell<HashMap<HostEvent, Vec<Listener>>>,
}

impl RecordingWindow {
    pub fn new(ready_state: ReadyState, user_agent: Option<&str>) -> Rc<Self> {
        Rc::new(Self {
            document: TestDocument(Cell::new(ready_state)),
            storage: StorageMock,
            user_agent: user_agent.map(str::to_string),
            listeners: RefCell::default(),
        })
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.document.0.set(ready_state);
    }

    /// Fire `event` like the browser would and return how many listeners ran.
    pub fn dispatch(&self, event: HostEvent) -> usize {
        let mut listeners = self
            .listeners
            .borrow_mut()
            .remove(&event)
            .unwrap_or_default();
        listeners.iter_mut().for_each(|listener| listener());
        let invoked = listeners.len();
        if !event.fires_once() {
            self.listeners
                .borrow_mut()
                .entry(event)
                .or_default()
                .extend(listeners);
        }
        invoked
    }

    pub fn listener_count(&self, event: HostEvent) -> usize {
        self.listeners.borrow().get(&event).map_or(0, Vec::len)
    }
}

impl HostWindow for RecordingWindow {
    fn document(&self) -> &dyn HostDocument {
        &self.document
    }

    fn local_storage(&self) -> &dyn Storage {
        &self.storage
    }

    fn session_storage(&self) -> &dyn Storage {
        &self.storage
    }

    fn add_event_listener(&self, event: HostEvent, listener: Listener) {
        self.listeners
            .borrow_mut()
            .entry(event)
            .or_default()
            .push(listener);
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }
}

/// Counts the work it is asked to run outside change detection.
#[derive(Default)]
pub struct CountingZone {
    pub runs: Cell<usize>,
}

impl Zone for CountingZone {
    fn run_outside(&self, work: Box<dyn FnOnce() + '_>) {
        self.runs.set(self.runs.get() + 1);
        work()
    }
}

pub struct Harness {
    pub window: Rc<RecordingWindow>,
    pub zone: Rc<CountingZone>,
    pub service: Rc<SceneService>,
    pub canvas: Canvas,
}

pub fn harness(ready_state: ReadyState, user_agent: Option<&str>) -> Harness {
    let window = RecordingWindow::new(ready_state, user_agent);
    let zone = Rc::new(CountingZone::default());
    let service = Rc::new(SceneService::new(
        zone.clone(),
        WindowService::from_window(window.clone()),
    ));
    Harness {
        window,
        zone,
        service,
        canvas: Canvas::offscreen("rendererCanvas", 640, 360),
    }
}

/// Default gallery config reading the building from the test fixtures.
pub fn fixture_config(file_name: &str) -> GalleryConfig {
    let mut config = GalleryConfig::default();
    config.building.root_url = FIXTURES.to_string();
    config.building.file_name = file_name.to_string();
    config
}
