//! Post-decode normalization and placement

use glam::DVec3;
use scenekit_core::{Aabb, Material, ModelNode, Transform};
use tracing::{debug, warn};

use crate::config::PlacementConfig;
use crate::error::{ImportError, ImportErrorCode};
use crate::file::ModelFormat;
use crate::loaders::RawAsset;

/// A decoded model ready to be added to the scene
#[derive(Debug, Clone)]
pub struct ProcessedModel {
    /// Root node with an identity transform
    pub object: ModelNode,
    /// Where the caller should place the root
    pub position: DVec3,
    pub repaired_materials: usize,
}

pub struct ModelProcessor {
    placement: PlacementConfig,
}

impl ModelProcessor {
    pub fn new(placement: PlacementConfig) -> Self {
        Self { placement }
    }

    /// Pull the usable root out of a decoder result
    ///
    /// glTF decoders hand back a document whose active scene is the root;
    /// the other decoders hand back the root directly.
    pub fn extract_object(&self, raw: RawAsset, format: ModelFormat) -> Result<ModelNode, ImportError> {
        match (format, raw) {
            (ModelFormat::Gltf | ModelFormat::Glb, RawAsset::Gltf(asset)) => Ok(asset.scene),
            (ModelFormat::Obj | ModelFormat::Fbx, RawAsset::Node(node)) => Ok(node),
            (format, _) => Err(ImportError::new(
                ImportErrorCode::ModelProcessError,
                format!("Decoder for {format} returned an unexpected result"),
            )),
        }
    }

    /// Repair materials, compute placement, then reset the root transform
    pub fn process_model(&self, mut object: ModelNode) -> Result<ProcessedModel, ImportError> {
        let mut repaired = 0;
        object.traverse_mut(&mut |node| {
            let Some(mesh) = node.mesh.as_mut() else {
                return;
            };
            if mesh.materials.is_empty() {
                mesh.materials.push(Material::default());
                repaired += 1;
            }
            for material in &mut mesh.materials {
                if repair_material(material) {
                    repaired += 1;
                }
            }
        });
        if repaired > 0 {
            warn!(object = %object.name, repaired, "Repaired invalid or missing materials");
        }

        let bounds = object.local_bounds();
        if !bounds.is_empty() && !bounds.is_finite() {
            return Err(ImportError::new(
                ImportErrorCode::ModelProcessError,
                format!("Model {} has non-finite bounds", object.name),
            ));
        }

        let position = self.compute_position(&bounds);
        object.transform = Transform::IDENTITY;
        debug!(object = %object.name, x = position.x, y = position.y, z = position.z, "Model placed");

        Ok(ProcessedModel {
            object,
            position,
            repaired_materials: repaired,
        })
    }

    /// Rest `bounds` on the grid plane, centred on the configured offset
    pub fn compute_position(&self, bounds: &Aabb) -> DVec3 {
        let [ox, oy, oz] = self.placement.offset;
        let base = self.placement.grid_height + oy;
        if bounds.is_empty() {
            return DVec3::new(ox, base, oz);
        }

        let center = bounds.center();
        let snap = |v: f64| {
            let cell = self.placement.grid_cell_size;
            if cell > 0.0 {
                (v / cell).round() * cell
            } else {
                v
            }
        };
        DVec3::new(snap(ox - center.x), base - bounds.min.y, snap(oz - center.z))
    }
}

/// Reset out-of-range shading values; returns whether anything changed
fn repair_material(material: &mut Material) -> bool {
    if material.is_valid() {
        return false;
    }
    let defaults = Material::default();
    let unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);

    if !material.color.iter().all(|c| unit(*c)) {
        material.color = defaults.color;
    }
    if !material.emissive.iter().all(|c| c.is_finite() && *c >= 0.0) {
        material.emissive = defaults.emissive;
    }
    if !unit(material.opacity) {
        material.opacity = defaults.opacity;
        material.transparent = false;
    }
    if !unit(material.metalness) {
        material.metalness = defaults.metalness;
    }
    if !unit(material.roughness) {
        material.roughness = defaults.roughness;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::GltfAsset;
    use scenekit_core::Mesh;

    fn boxed(name: &str, min: DVec3, max: DVec3) -> ModelNode {
        ModelNode::new(name).with_mesh(Mesh::new(name, Aabb::new(min, max), 8))
    }

    fn processor() -> ModelProcessor {
        ModelProcessor::new(PlacementConfig::default())
    }

    #[test]
    fn test_rests_on_grid_and_centres() {
        let node = boxed("crate", DVec3::new(2.0, -1.0, 4.0), DVec3::new(4.0, 3.0, 8.0));
        let processed = processor().process_model(node).unwrap();
        assert_eq!(processed.position, DVec3::new(-3.0, 1.0, -6.0));
    }

    #[test]
    fn test_offset_and_grid_height() {
        let processor = ModelProcessor::new(PlacementConfig {
            grid_height: 0.5,
            offset: [10.0, 1.0, -10.0],
            grid_cell_size: 0.0,
        });
        let node = boxed("cube", DVec3::splat(-1.0), DVec3::splat(1.0));
        let processed = processor.process_model(node).unwrap();
        assert_eq!(processed.position, DVec3::new(10.0, 2.5, -10.0));
    }

    #[test]
    fn test_snaps_to_grid_cells() {
        let processor = ModelProcessor::new(PlacementConfig {
            grid_cell_size: 1.0,
            ..Default::default()
        });
        let node = boxed("cube", DVec3::new(0.2, 0.0, 0.7), DVec3::new(1.0, 1.0, 1.3));
        let processed = processor.process_model(node).unwrap();
        assert_eq!(processed.position, DVec3::new(-1.0, 0.0, -1.0));
    }

    #[test]
    fn test_root_transform_reset_and_ignored_for_bounds() {
        let mut node = boxed("cube", DVec3::ZERO, DVec3::ONE);
        node.transform = Transform::from_position(DVec3::new(100.0, 100.0, 100.0));
        node.transform.scale = DVec3::splat(3.0);

        let processed = processor().process_model(node).unwrap();
        assert!(processed.object.transform.is_identity());
        assert_eq!(processed.position, DVec3::new(-0.5, 0.0, -0.5));
    }

    #[test]
    fn test_child_transforms_count_towards_bounds() {
        let mut root = ModelNode::new("root");
        root.add_child(
            boxed("lifted", DVec3::ZERO, DVec3::ONE)
                .with_transform(Transform::from_position(DVec3::new(0.0, 5.0, 0.0))),
        );
        let processed = processor().process_model(root).unwrap();
        assert_eq!(processed.position.y, -5.0);
    }

    #[test]
    fn test_empty_model_goes_to_offset() {
        let processed = processor().process_model(ModelNode::new("empty")).unwrap();
        assert_eq!(processed.position, DVec3::ZERO);
        assert_eq!(processed.repaired_materials, 0);
    }

    #[test]
    fn test_materials_repaired() {
        let mut node = boxed("cube", DVec3::ZERO, DVec3::ONE);
        let mesh = node.mesh.as_mut().unwrap();
        mesh.materials.push(Material {
            color: [f32::NAN, 0.0, 0.0],
            roughness: 4.0,
            metalness: 0.3,
            ..Material::default()
        });
        let mut bare = boxed("bare", DVec3::ZERO, DVec3::ONE);
        bare.mesh.as_mut().unwrap().materials.clear();
        node.add_child(bare);

        let processed = processor().process_model(node).unwrap();
        assert_eq!(processed.repaired_materials, 2);
        let material = &processed.object.mesh.as_ref().unwrap().materials[0];
        assert_eq!(material.color, [1.0, 1.0, 1.0]);
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.metalness, 0.3);
        assert_eq!(
            processed.object.children[0].mesh.as_ref().unwrap().materials.len(),
            1
        );
    }

    #[test]
    fn test_non_finite_bounds_rejected() {
        let node = boxed("broken", DVec3::new(f64::NEG_INFINITY, 0.0, 0.0), DVec3::ONE);
        let err = processor().process_model(node).unwrap_err();
        assert_eq!(err.code, ImportErrorCode::ModelProcessError);
    }

    #[test]
    fn test_extract_object_normalizes_results() {
        let processor = processor();
        let asset = GltfAsset {
            scene: ModelNode::new("Scene"),
            scenes: vec![ModelNode::new("Scene")],
            animations: Vec::new(),
            extensions_used: Vec::new(),
        };
        let node = processor
            .extract_object(RawAsset::Gltf(asset), ModelFormat::Glb)
            .unwrap();
        assert_eq!(node.name, "Scene");

        let node = processor
            .extract_object(RawAsset::Node(ModelNode::new("obj")), ModelFormat::Obj)
            .unwrap();
        assert_eq!(node.name, "obj");

        let err = processor
            .extract_object(RawAsset::Node(ModelNode::new("x")), ModelFormat::Gltf)
            .unwrap_err();
        assert_eq!(err.code, ImportErrorCode::ModelProcessError);
    }
}
