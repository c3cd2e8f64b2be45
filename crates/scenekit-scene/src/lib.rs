//! Scenekit Scene - Object registry for the 3D viewport
//!
//! This crate owns the scene objects shown in the viewport: a [`SceneRoot`]
//! acting as the render parent, and [`Scene3DService`], a registry that keeps
//! objects addressable by id. Service operations never panic or return errors;
//! they report a uniform [`SceneOpResult`] that UI handlers can inspect.

pub mod root;
pub mod service;

pub use root::SceneRoot;
pub use service::{Scene3DService, SceneObjectEntry, SceneOpResult, SceneState};
