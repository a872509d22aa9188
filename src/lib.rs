//! gallery-ngin
//!
//! A navigable 3D gallery: a ground plane, an imported building and a camera
//! that walks through it, rendered with wgpu into a native window or a WASM
//! canvas. Phones and tablets get a virtual-joystick camera, everything else a
//! keyboard and mouse free camera.
//!
//! High-level modules
//! - `window`: access to the hosting window, document and storages
//! - `device`: mobile detection from the user agent
//! - `service`: the scene service, a facade over engine and scene creation
//! - `gallery`: the bootstrapper that assembles the gallery scene
//! - `engine`: canvas, render loop and backend selection
//! - `context`: the wgpu backend that owns device, queue and pipelines
//! - `camera`: free and virtual-joystick cameras plus their uniforms
//! - `data_structures`: scene, meshes, lights and loaded asset records
//! - `resources`: `.babylon`, glTF and OBJ importers
//! - `pipelines` / `render`: GPU pipelines and per-frame scene drawing
//! - `config`: JSON gallery configuration
//! - `flow`: the winit event loop hosting a gallery
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod engine;
pub mod flow;
pub mod gallery;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod service;
pub mod window;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use winit::event::WindowEvent;
