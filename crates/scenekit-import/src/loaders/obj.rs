//! Wavefront OBJ decoder

use glam::DVec3;
use scenekit_core::{Aabb, Material, Mesh, ModelNode, TextureRef};
use tracing::{debug, warn};

use super::{DecodeContext, DecodeError, ModelLoader, RawAsset};

pub struct ObjLoader;

impl ModelLoader for ObjLoader {
    fn decode(&self, data: &[u8], ctx: &DecodeContext<'_>) -> Result<RawAsset, DecodeError> {
        let options = tobj::LoadOptions {
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        };
        let mut reader = data;
        let (models, materials) = tobj::load_obj_buf(&mut reader, &options, |path| {
            let name = path.to_string_lossy();
            match ctx.fetch(&name) {
                Ok(bytes) => {
                    let mut mtl: &[u8] = &bytes;
                    tobj::load_mtl_buf(&mut mtl)
                }
                Err(_) => {
                    warn!(mtl = %name, "Material library not found");
                    Err(tobj::LoadError::OpenFileFailed)
                }
            }
        })?;
        let materials: Vec<Material> = materials
            .unwrap_or_else(|e| {
                warn!(error = %e, "Material library unusable, continuing without materials");
                Vec::new()
            })
            .iter()
            .map(|m| convert_material(m, ctx))
            .collect();

        let mut root = ModelNode::new("");
        for model in &models {
            let positions = &model.mesh.positions;
            let bounds = Aabb::from_points(
                positions
                    .chunks_exact(3)
                    .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64)),
            );
            let mut mesh = Mesh::new(model.name.clone(), bounds, positions.len() / 3);
            if let Some(material) = model.mesh.material_id.and_then(|id| materials.get(id)) {
                mesh.materials.push(material.clone());
            }
            root.add_child(ModelNode::new(model.name.clone()).with_mesh(mesh));
        }

        debug!(models = models.len(), materials = materials.len(), "OBJ decoded");
        Ok(RawAsset::Node(root))
    }
}

fn convert_material(material: &tobj::Material, ctx: &DecodeContext<'_>) -> Material {
    let opacity = material.dissolve.unwrap_or(1.0);
    Material {
        name: material.name.clone(),
        color: material.diffuse.unwrap_or([1.0; 3]),
        opacity,
        metalness: 0.0,
        // Phong exponent to roughness
        roughness: material
            .shininess
            .map(|s| (2.0 / (s.max(0.0) + 2.0)).sqrt())
            .unwrap_or(1.0),
        emissive: [0.0; 3],
        map: material.diffuse_texture.as_ref().map(|path| {
            let uri = ctx.resolve(path);
            if ctx.fetch(path).is_err() {
                warn!(texture = %path, "Texture could not be resolved");
            }
            TextureRef::new(uri)
        }),
        transparent: opacity < 1.0,
        double_sided: false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::archive::ResourceMap;
    use crate::blob::BlobStore;
    use crate::codec::CodecSet;
    use crate::loaders::LoadProgress;
    use crate::resolver::UrlResolver;
    use std::sync::Arc;

    pub(crate) const CUBE_OBJ: &str = "\
mtllib cube.mtl
o Cube
v -1 0 -1
v 1 0 -1
v 1 2 1
v -1 2 1
usemtl Red
f 1 2 3 4
o Marker
v 5 5 5
v 6 5 5
v 6 6 5
f 5 6 7
";

    const CUBE_MTL: &str = "\
newmtl Red
Kd 1.0 0.0 0.0
d 0.5
Ns 98
map_Kd red.png
";

    fn decode(obj: &str, blobs: &BlobStore, resolver: Option<&UrlResolver>) -> ModelNode {
        let codecs = CodecSet::new();
        let progress = |_: LoadProgress| {};
        let ctx = DecodeContext {
            url: "blob:scenekit/obj",
            blobs,
            resolver,
            codecs: &codecs,
            progress: &progress,
        };
        match ObjLoader.decode(obj.as_bytes(), &ctx).unwrap() {
            RawAsset::Node(node) => node,
            RawAsset::Gltf(_) => panic!("OBJ loader returned a glTF asset"),
        }
    }

    #[test]
    fn test_models_become_children() {
        let node = decode(CUBE_OBJ, &BlobStore::new(), None);
        assert_eq!(node.children.len(), 2);

        let cube = node.find("Cube").unwrap().mesh.as_ref().unwrap();
        assert_eq!(cube.bounds.min, DVec3::new(-1.0, 0.0, -1.0));
        assert_eq!(cube.bounds.max, DVec3::new(1.0, 2.0, 1.0));
        assert!(cube.materials.is_empty());

        let bounds = node.local_bounds();
        assert_eq!(bounds.max, DVec3::new(6.0, 6.0, 5.0));
    }

    #[test]
    fn test_material_library_from_resource_map() {
        let blobs = BlobStore::new();
        let mut map = ResourceMap::new();
        map.insert(
            "cube.mtl",
            blobs.create_object_url(Arc::from(CUBE_MTL.as_bytes())),
        );
        let texture_url = blobs.create_object_url(Arc::from(&b"png"[..]));
        map.insert("textures/red.png", texture_url.clone());
        let resolver = UrlResolver::from_resource_map(&map);

        let node = decode(CUBE_OBJ, &blobs, Some(&resolver));
        let cube = node.find("Cube").unwrap().mesh.as_ref().unwrap();
        let material = &cube.materials[0];
        assert_eq!(material.name, "Red");
        assert_eq!(material.color, [1.0, 0.0, 0.0]);
        assert_eq!(material.opacity, 0.5);
        assert!(material.transparent);
        assert!(material.roughness > 0.0 && material.roughness < 1.0);
        assert_eq!(material.map.as_ref().unwrap().uri, texture_url);
    }
}
