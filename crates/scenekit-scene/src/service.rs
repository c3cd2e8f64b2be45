//! Scene object registry
//!
//! [`Scene3DService`] maps ids to scene objects and keeps the render root in
//! step with the registry. Ids are unique: adding an id that already exists
//! fails instead of overwriting, so callers must remove explicitly first.

use std::collections::HashMap;

use glam::DVec3;
use scenekit_core::{ModelNode, Transform, TransformUpdate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::root::SceneRoot;

/// Uniform outcome of a service operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneOpResult<T = ()> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> SceneOpResult<T> {
    pub fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(reason = %message, "Scene operation failed");
        Self {
            success: false,
            message,
            data: None,
        }
    }
}

/// A registered scene object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObjectEntry {
    pub id: String,
    pub object: ModelNode,
}

impl SceneObjectEntry {
    pub fn transform(&self) -> &Transform {
        &self.object.transform
    }
}

/// Aggregate service state for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SceneState {
    pub is_initialized: bool,
    pub object_count: usize,
    pub loaded_count: usize,
}

/// Registry of the objects placed in the 3D scene
#[derive(Debug, Default)]
pub struct Scene3DService {
    root: Option<SceneRoot>,
    objects: HashMap<String, SceneObjectEntry>,
    loaded_count: usize,
}

impl Scene3DService {
    /// Create an uninitialised service; call [`Scene3DService::initialize`] before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the service to a render root
    pub fn initialize(&mut self, root: SceneRoot) -> SceneOpResult {
        info!(scene = %root.name, "Scene service initialized");
        self.root = Some(root);
        SceneOpResult::ok("Scene initialized", None)
    }

    pub fn is_initialized(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&SceneRoot> {
        self.root.as_ref()
    }

    /// Attach an unregistered fixture (grid, lights, helpers) to the root
    pub fn add_fixture(&mut self, name: &str) -> SceneOpResult {
        let Some(root) = self.root.as_mut() else {
            return SceneOpResult::fail("Scene not initialized");
        };
        if self.objects.contains_key(name) {
            return SceneOpResult::fail(format!("Id {name} is used by a registered object"));
        }
        root.attach(name);
        SceneOpResult::ok(format!("Fixture {name} attached"), None)
    }

    /// Register an object and attach it to the render root
    pub fn add_object(
        &mut self,
        id: &str,
        mut object: ModelNode,
        transform: Option<TransformUpdate>,
    ) -> SceneOpResult {
        let Some(root) = self.root.as_mut() else {
            return SceneOpResult::fail("Scene not initialized");
        };
        if self.objects.contains_key(id) || root.contains(id) {
            return SceneOpResult::fail(format!("Object {id} already exists"));
        }
        if let Some(update) = transform {
            if !update_is_finite(&update) {
                return SceneOpResult::fail(format!("Invalid transform for object {id}"));
            }
            object.transform.apply(&update);
        }

        root.attach(id);
        self.objects.insert(
            id.to_string(),
            SceneObjectEntry {
                id: id.to_string(),
                object,
            },
        );
        self.loaded_count += 1;
        debug!(id = %id, count = self.objects.len(), "Object added");
        SceneOpResult::ok(format!("Object {id} added"), None)
    }

    /// Detach an object from the root and drop it from the registry
    ///
    /// The removed object is handed back in `data`.
    pub fn remove_object(&mut self, id: &str) -> SceneOpResult<ModelNode> {
        let Some(entry) = self.objects.remove(id) else {
            return SceneOpResult::fail(format!("Object {id} not found"));
        };
        if let Some(root) = self.root.as_mut() {
            root.detach(id);
        }
        debug!(id = %id, count = self.objects.len(), "Object removed");
        SceneOpResult::ok(format!("Object {id} removed"), Some(entry.object))
    }

    /// Apply the fields present in `update` to an object's transform
    pub fn update_object_transform(
        &mut self,
        id: &str,
        update: &TransformUpdate,
    ) -> SceneOpResult<Transform> {
        if !update_is_finite(update) {
            return SceneOpResult::fail(format!("Invalid transform for object {id}"));
        }
        let Some(entry) = self.objects.get_mut(id) else {
            return SceneOpResult::fail(format!("Object {id} not found"));
        };
        entry.object.transform.apply(update);
        SceneOpResult::ok(
            format!("Object {id} transform updated"),
            Some(entry.object.transform),
        )
    }

    pub fn get_object(&self, id: &str) -> Option<&SceneObjectEntry> {
        self.objects.get(id)
    }

    /// Copy of the registry; changes to it do not affect the service
    pub fn get_all_objects(&self) -> HashMap<String, SceneObjectEntry> {
        self.objects.clone()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Detach every root child, fixtures included, and drop all objects
    pub fn clear(&mut self) -> SceneOpResult<usize> {
        let removed = self.objects.len();
        if let Some(root) = self.root.as_mut() {
            root.detach_all();
        }
        self.objects.clear();
        self.loaded_count = 0;
        info!(removed, "Scene cleared");
        SceneOpResult::ok(format!("Removed {removed} objects"), Some(removed))
    }

    /// Detach and drop registered objects only, leaving fixtures attached
    pub fn clear_scene_objects_only(&mut self) -> SceneOpResult<usize> {
        let removed = self.objects.len();
        if let Some(root) = self.root.as_mut() {
            for id in self.objects.keys() {
                root.detach(id);
            }
        }
        self.objects.clear();
        self.loaded_count = 0;
        info!(removed, "Scene objects cleared");
        SceneOpResult::ok(format!("Removed {removed} objects"), Some(removed))
    }

    pub fn get_state(&self) -> SceneState {
        SceneState {
            is_initialized: self.is_initialized(),
            object_count: self.objects.len(),
            loaded_count: self.loaded_count,
        }
    }
}

fn update_is_finite(update: &TransformUpdate) -> bool {
    [update.position, update.rotation, update.scale]
        .iter()
        .flatten()
        .all(|v: &DVec3| v.is_finite())
}
