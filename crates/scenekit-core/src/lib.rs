//! Scenekit Core - Scene node model and history record store
//!
//! This crate provides the foundational types shared by the rest of Scenekit:
//! - Scene nodes with local transforms, meshes, materials and bounding boxes
//! - The linear undo/redo history record store with its console log feed
//! - A recorder that turns editor actions into history records

pub mod history;
pub mod node;
pub mod recorder;

pub use history::{
    ActionType, HistoryAction, HistoryConfig, HistoryFilter, HistoryRecord, HistoryStore,
    LogEntry, LogLevel, NewRecord, TargetType,
};
pub use node::{Aabb, Material, Mesh, ModelNode, TextureRef, Transform, TransformUpdate};
pub use recorder::HistoryRecorder;
