//! Render root of the scene graph
//!
//! The root keeps its children in attachment order. Children are referenced by
//! id: registered objects use their registry id, while fixtures such as the
//! grid or default lights use a fixed name and are never registered.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneRoot {
    pub name: String,
    children: Vec<String>,
}

impl SceneRoot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    /// Attach a child; attaching twice is a no-op
    pub fn attach(&mut self, id: &str) {
        if !self.contains(id) {
            self.children.push(id.to_string());
        }
    }

    /// Detach a child, returning whether it was attached
    pub fn detach(&mut self, id: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c != id);
        self.children.len() != before
    }

    pub fn detach_all(&mut self) {
        self.children.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.children.iter().any(|c| c == id)
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }
}
