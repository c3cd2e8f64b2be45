//! Scene node model
//!
//! Decoded models are represented as a tree of [`ModelNode`]s. Every node has a
//! local [`Transform`] and may carry a [`Mesh`] with its materials and
//! local-space bounding box. Rendering is handled elsewhere; this model only
//! keeps what the import pipeline and the scene registry need to reason about.

use glam::{DMat4, DQuat, DVec3, EulerRot};
use serde::{Deserialize, Serialize};

/// Local transform: position, Euler XYZ rotation in radians, and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DVec3,
    pub scale: DVec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: DVec3::ZERO,
        scale: DVec3::ONE,
    };

    /// Identity rotation and scale at the given position
    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Build from translation, quaternion rotation and scale
    pub fn from_trs(translation: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        let (x, y, z) = rotation.normalize().to_euler(EulerRot::XYZ);
        Self {
            position: translation,
            rotation: DVec3::new(x, y, z),
            scale,
        }
    }

    /// Decompose an affine matrix
    pub fn from_matrix(matrix: DMat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self::from_trs(translation, rotation, scale)
    }

    pub fn quaternion(&self) -> DQuat {
        DQuat::from_euler(
            EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        )
    }

    pub fn matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.quaternion(), self.position)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Apply the fields present in `update`, leaving the others untouched
    pub fn apply(&mut self, update: &TransformUpdate) {
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(rotation) = update.rotation {
            self.rotation = rotation;
        }
        if let Some(scale) = update.scale {
            self.scale = scale;
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Partial transform update; `None` fields are left as they are
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformUpdate {
    #[serde(default)]
    pub position: Option<DVec3>,
    #[serde(default)]
    pub rotation: Option<DVec3>,
    #[serde(default)]
    pub scale: Option<DVec3>,
}

impl TransformUpdate {
    pub fn position(position: DVec3) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none() && self.scale.is_none()
    }
}

impl From<Transform> for TransformUpdate {
    fn from(t: Transform) -> Self {
        Self {
            position: Some(t.position),
            rotation: Some(t.rotation),
            scale: Some(t.scale),
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// The empty box; union with it is a no-op
    pub const EMPTY: Self = Self {
        min: DVec3::INFINITY,
        max: DVec3::NEG_INFINITY,
    };

    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<I: IntoIterator<Item = DVec3>>(points: I) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut b, p| {
            b.expand(p);
            b
        })
    }

    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn expand(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        if self.is_empty() {
            DVec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Bounds of this box after transforming its eight corners
    pub fn transformed(&self, matrix: &DMat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let (lo, hi) = (self.min, self.max);
        let corners = [
            DVec3::new(lo.x, lo.y, lo.z),
            DVec3::new(hi.x, lo.y, lo.z),
            DVec3::new(lo.x, hi.y, lo.z),
            DVec3::new(lo.x, lo.y, hi.z),
            DVec3::new(hi.x, hi.y, lo.z),
            DVec3::new(hi.x, lo.y, hi.z),
            DVec3::new(lo.x, hi.y, hi.z),
            DVec3::new(hi.x, hi.y, hi.z),
        ];
        Aabb::from_points(corners.iter().map(|c| matrix.transform_point3(*c)))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Reference to a texture image used by a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureRef {
    /// Resolved URI (blob URL, data URI or the original relative path)
    pub uri: String,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Whether the image is a GPU-compressed container (KTX2)
    #[serde(default)]
    pub compressed: bool,
}

impl TextureRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            width: None,
            height: None,
            compressed: false,
        }
    }
}

/// Surface material (metallic-roughness model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Linear RGB base colour, components in [0, 1]
    pub color: [f32; 3],
    pub opacity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub emissive: [f32; 3],
    pub map: Option<TextureRef>,
    pub transparent: bool,
    pub double_sided: bool,
}

impl Material {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when every shading parameter is finite and inside [0, 1]
    pub fn is_valid(&self) -> bool {
        let unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        self.color.iter().all(|c| unit(*c))
            && self.emissive.iter().all(|c| c.is_finite() && *c >= 0.0)
            && unit(self.opacity)
            && unit(self.metalness)
            && unit(self.roughness)
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: [1.0, 1.0, 1.0],
            opacity: 1.0,
            metalness: 0.0,
            roughness: 1.0,
            emissive: [0.0, 0.0, 0.0],
            map: None,
            transparent: false,
            double_sided: false,
        }
    }
}

/// Renderable geometry attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    /// Bounds in the owning node's local space
    pub bounds: Aabb,
    pub vertex_count: usize,
    pub materials: Vec<Material>,
    /// Compression scheme the geometry was stored with (e.g. "draco")
    pub compression: Option<String>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, bounds: Aabb, vertex_count: usize) -> Self {
        Self {
            name: name.into(),
            bounds,
            vertex_count,
            materials: Vec::new(),
            compression: None,
        }
    }
}

/// A node in a decoded model hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Mesh>,
    pub children: Vec<ModelNode>,
}

impl ModelNode {
    /// Create an empty group node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_child(&mut self, child: ModelNode) {
        self.children.push(child);
    }

    /// Visit this node and all descendants depth-first
    pub fn traverse<F: FnMut(&ModelNode)>(&self, f: &mut F) {
        f(self);
        for child in &self.children {
            child.traverse(f);
        }
    }

    pub fn traverse_mut<F: FnMut(&mut ModelNode)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            child.traverse_mut(f);
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |_| count += 1);
        count
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&mut |n| {
            if n.mesh.is_some() {
                count += 1;
            }
        });
        count
    }

    /// Find the first node with the given name
    pub fn find(&self, name: &str) -> Option<&ModelNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Bounds of this subtree expressed in this node's local frame
    ///
    /// The node's own transform is not applied; children transforms are.
    pub fn local_bounds(&self) -> Aabb {
        let mut bounds = self.mesh.as_ref().map(|m| m.bounds).unwrap_or(Aabb::EMPTY);
        for child in &self.children {
            let child_bounds = child.local_bounds();
            if !child_bounds.is_empty() {
                bounds = bounds.union(&child_bounds.transformed(&child.transform.matrix()));
            }
        }
        bounds
    }

    /// Bounds of this subtree after applying the node's own transform
    pub fn bounds(&self) -> Aabb {
        self.local_bounds().transformed(&self.transform.matrix())
    }
}
