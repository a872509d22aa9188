//! Host environment access.
//!
//! Everything that would otherwise reach for the global `window`, `document`,
//! `localStorage` or `sessionStorage` goes through a [`WindowService`]. In a
//! browser the service wraps the real window (via `web-sys`); everywhere else
//! (native hosts, tests) it falls back to a [`WindowMock`] whose document is
//! still `loading` and whose storages silently do nothing.
//!
//! # User-facing types
//!
//! - [`HostWindow`], [`HostDocument`] and [`Storage`] are the capabilities a host provides
//! - [`WindowService`] hands those capabilities out and is shared per thread via [`WindowService::root`]
//! - [`WindowMock`] is the inert fallback; native hosts drive it with [`WindowMock::dispatch`]

use std::{cell::RefCell, collections::HashMap, fmt::Debug, rc::Rc};

/// Loading progress of the host document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// Parse `document.readyState`. Anything unknown counts as loaded.
    pub fn from_dom(state: &str) -> Self {
        match state {
            "loading" => ReadyState::Loading,
            "interactive" => ReadyState::Interactive,
            _ => ReadyState::Complete,
        }
    }
}

/// Window-level events the scene setup listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostEvent {
    DomContentLoaded,
    Resize,
}

impl HostEvent {
    /// The DOM event name.
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::DomContentLoaded => "DOMContentLoaded",
            HostEvent::Resize => "resize",
        }
    }

    /// `DOMContentLoaded` fires once per document, `resize` any number of times.
    pub fn fires_once(&self) -> bool {
        matches!(self, HostEvent::DomContentLoaded)
    }
}

pub type Listener = Box<dyn FnMut()>;

pub trait HostDocument {
    fn ready_state(&self) -> ReadyState;
}

/// Key/value storage in the shape of the Web Storage API.
///
/// Implementations never fail: unavailable storage behaves like an empty one.
pub trait Storage {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&self);
    fn get_item(&self, key: &str) -> Option<String>;
    fn key(&self, index: usize) -> Option<String>;
    fn remove_item(&self, key: &str);
    fn set_item(&self, key: &str, value: &str);
}

/// The window capability set a host has to provide.
pub trait HostWindow {
    fn document(&self) -> &dyn HostDocument;
    fn local_storage(&self) -> &dyn Storage;
    fn session_storage(&self) -> &dyn Storage;
    fn add_event_listener(&self, event: HostEvent, listener: Listener);

    /// The navigator's user agent, if the host has one.
    fn user_agent(&self) -> Option<String> {
        None
    }

    fn max_touch_points(&self) -> u32 {
        0
    }
}

/// Document of a host without a DOM. It never leaves the `Loading` state.
#[derive(Debug)]
pub struct DocumentMock {
    ready_state: ReadyState,
}

impl Default for DocumentMock {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::Loading,
        }
    }
}

impl HostDocument for DocumentMock {
    fn ready_state(&self) -> ReadyState {
        self.ready_state
    }
}

#[derive(Debug, Default)]
pub struct StorageMock;

impl Storage for StorageMock {
    fn len(&self) -> usize {
        0
    }

    fn clear(&self) {}

    fn get_item(&self, _: &str) -> Option<String> {
        None
    }

    fn key(&self, _: usize) -> Option<String> {
        None
    }

    fn remove_item(&self, _: &str) {}

    fn set_item(&self, _: &str, _: &str) {}
}

/// Fallback window used whenever no real browser window exists.
///
/// Listeners are kept so that a native host can play the browser's part and
/// deliver `DOMContentLoaded` / `resize` itself through [`WindowMock::dispatch`].
#[derive(Default)]
pub struct WindowMock {
    document: DocumentMock,
    local_storage: StorageMock,
    session_storage: StorageMock,
    listeners: RefCell<HashMap<HostEvent, Vec<Listener>>>,
}

impl WindowMock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every listener registered for `event` and return how many ran.
    ///
    /// Listeners may register further listeners while being invoked. Those are
    /// kept for the next dispatch. One-shot events drop their listeners after
    /// firing.
    pub fn dispatch(&self, event: HostEvent) -> usize {
        let mut listeners = self
            .listeners
            .borrow_mut()
            .remove(&event)
            .unwrap_or_default();
        listeners.iter_mut().for_each(|listener| listener());
        let invoked = listeners.len();

        if !event.fires_once() {
            let mut registry = self.listeners.borrow_mut();
            let added = registry.remove(&event).unwrap_or_default();
            listeners.extend(added);
            registry.insert(event, listeners);
        }
        invoked
    }

    pub fn listener_count(&self, event: HostEvent) -> usize {
        self.listeners.borrow().get(&event).map_or(0, Vec::len)
    }
}

impl Debug for WindowMock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowMock")
            .field("document", &self.document)
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl HostWindow for WindowMock {
    fn document(&self) -> &dyn HostDocument {
        &self.document
    }

    fn local_storage(&self) -> &dyn Storage {
        &self.local_storage
    }

    fn session_storage(&self) -> &dyn Storage {
        &self.session_storage
    }

    fn add_event_listener(&self, event: HostEvent, listener: Listener) {
        self.listeners
            .borrow_mut()
            .entry(event)
            .or_default()
            .push(listener);
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::{JsCast, closure::Closure};

    use super::{HostDocument, HostEvent, HostWindow, Listener, ReadyState, Storage};

    pub(super) struct BrowserDocument(web_sys::Document);

    impl HostDocument for BrowserDocument {
        fn ready_state(&self) -> ReadyState {
            ReadyState::from_dom(&self.0.ready_state())
        }
    }

    /// Storage that may be unavailable (private mode, sandboxed iframes).
    pub(super) struct BrowserStorage(Option<web_sys::Storage>);

    impl Storage for BrowserStorage {
        fn len(&self) -> usize {
            self.0
                .as_ref()
                .and_then(|s| s.length().ok())
                .map_or(0, |len| len as usize)
        }

        fn clear(&self) {
            if let Some(Err(e)) = self.0.as_ref().map(|s| s.clear()) {
                log::warn!("storage clear failed: {:?}", e);
            }
        }

        fn get_item(&self, key: &str) -> Option<String> {
            self.0.as_ref()?.get_item(key).ok().flatten()
        }

        fn key(&self, index: usize) -> Option<String> {
            self.0.as_ref()?.key(index as u32).ok().flatten()
        }

        fn remove_item(&self, key: &str) {
            if let Some(Err(e)) = self.0.as_ref().map(|s| s.remove_item(key)) {
                log::warn!("storage remove_item({}) failed: {:?}", key, e);
            }
        }

        fn set_item(&self, key: &str, value: &str) {
            if let Some(Err(e)) = self.0.as_ref().map(|s| s.set_item(key, value)) {
                log::warn!("storage set_item({}) failed: {:?}", key, e);
            }
        }
    }

    pub(super) struct BrowserWindow {
        window: web_sys::Window,
        document: BrowserDocument,
        local_storage: BrowserStorage,
        session_storage: BrowserStorage,
    }

    impl BrowserWindow {
        /// `None` if the window has no document (e.g. inside a worker).
        pub(super) fn new(window: web_sys::Window) -> Option<Self> {
            let document = BrowserDocument(window.document()?);
            let local_storage = BrowserStorage(window.local_storage().ok().flatten());
            let session_storage = BrowserStorage(window.session_storage().ok().flatten());
            Some(Self {
                window,
                document,
                local_storage,
                session_storage,
            })
        }
    }

    impl HostWindow for BrowserWindow {
        fn document(&self) -> &dyn HostDocument {
            &self.document
        }

        fn local_storage(&self) -> &dyn Storage {
            &self.local_storage
        }

        fn session_storage(&self) -> &dyn Storage {
            &self.session_storage
        }

        fn add_event_listener(&self, event: HostEvent, listener: Listener) {
            let closure = Closure::<dyn FnMut()>::wrap(listener);
            if let Err(e) = self
                .window
                .add_event_listener_with_callback(event.name(), closure.as_ref().unchecked_ref())
            {
                log::error!("could not listen to {}: {:?}", event.name(), e);
                return;
            }
            // Listeners live as long as the page.
            closure.forget();
        }

        fn user_agent(&self) -> Option<String> {
            self.window.navigator().user_agent().ok()
        }

        fn max_touch_points(&self) -> u32 {
            self.window.navigator().max_touch_points().max(0) as u32
        }
    }
}

fn get_window() -> Rc<dyn HostWindow> {
    #[cfg(target_arch = "wasm32")]
    {
        if let Some(window) = web_sys::window().and_then(web::BrowserWindow::new) {
            return Rc::new(window);
        }
    }
    log::info!("No host window available, falling back to an inert window");
    Rc::new(WindowMock::new())
}

thread_local! {
    static ROOT: WindowService = WindowService::new();
}

/// Hands out the host window, document and storages.
///
/// The real-or-fallback decision is taken once in [`WindowService::new`]; clones
/// share the same handle.
#[derive(Clone)]
pub struct WindowService {
    window_object: Rc<dyn HostWindow>,
}

impl WindowService {
    pub fn new() -> Self {
        Self {
            window_object: get_window(),
        }
    }

    /// The service shared by everything running on this thread.
    pub fn root() -> Self {
        ROOT.with(Clone::clone)
    }

    /// Use `window` instead of probing the execution context.
    pub fn from_window(window: Rc<dyn HostWindow>) -> Self {
        Self {
            window_object: window,
        }
    }

    pub fn window(&self) -> &Rc<dyn HostWindow> {
        &self.window_object
    }

    pub fn document(&self) -> &dyn HostDocument {
        self.window_object.document()
    }

    pub fn local_store(&self) -> &dyn Storage {
        self.window_object.local_storage()
    }

    pub fn session_storage(&self) -> &dyn Storage {
        self.window_object.session_storage()
    }
}

impl Default for WindowService {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for WindowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowService")
            .field("ready_state", &self.document().ready_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn should_fall_back_to_mock_without_browser() {
        let service = WindowService::new();
        assert_eq!(service.document().ready_state(), ReadyState::Loading);
        assert_eq!(service.local_store().len(), 0);
        assert!(service.session_storage().is_empty());
    }

    #[test]
    fn dom_ready_states_map_to_variants() {
        assert_eq!(ReadyState::from_dom("loading"), ReadyState::Loading);
        assert_eq!(ReadyState::from_dom("interactive"), ReadyState::Interactive);
        assert_eq!(ReadyState::from_dom("complete"), ReadyState::Complete);
        assert_eq!(ReadyState::from_dom(""), ReadyState::Complete);
    }

    #[test]
    fn should_hand_out_injected_window_unmodified() {
        let injected: Rc<dyn HostWindow> = Rc::new(WindowMock::new());
        let service = WindowService::from_window(injected.clone());
        assert!(Rc::ptr_eq(service.window(), &injected));
        assert!(Rc::ptr_eq(service.clone().window(), &injected));
    }

    #[test]
    fn mock_storage_is_inert() {
        let storage = StorageMock;
        storage.set_item("key", "value");
        assert_eq!(storage.get_item("key"), None);
        assert_eq!(storage.key(0), None);
        assert_eq!(storage.len(), 0);
        storage.remove_item("key");
        storage.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn dom_content_loaded_listeners_fire_once() {
        let window = WindowMock::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        window.add_event_listener(
            HostEvent::DomContentLoaded,
            Box::new(move || counter.set(counter.get() + 1)),
        );

        assert_eq!(window.dispatch(HostEvent::DomContentLoaded), 1);
        assert_eq!(window.dispatch(HostEvent::DomContentLoaded), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn resize_listeners_stay_registered() {
        let window = WindowMock::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        window.add_event_listener(
            HostEvent::Resize,
            Box::new(move || counter.set(counter.get() + 1)),
        );

        window.dispatch(HostEvent::Resize);
        window.dispatch(HostEvent::Resize);
        assert_eq!(calls.get(), 2);
        assert_eq!(window.listener_count(HostEvent::Resize), 1);
    }

    #[test]
    fn root_service_is_shared() {
        let a = WindowService::root();
        let b = WindowService::root();
        assert!(Rc::ptr_eq(a.window(), b.window()));
    }
}
