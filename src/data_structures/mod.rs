//! Scene data: what the renderer draws and what importers produce.
//!
//! - `scene` owns meshes, cameras and lights and hands out typed ids
//! - `mesh` holds vertex data and the ground/line/plane builders
//! - `light` is the hemispheric light
//! - `asset` holds the skeleton, animation and particle records of imports
//! - `texture` wraps the depth and multisample targets

pub mod asset;
pub mod light;
pub mod mesh;
pub mod scene;
pub mod texture;
