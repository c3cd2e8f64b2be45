//! glTF 2.0 and GLB decoder
//!
//! Documents are parsed with the `gltf` crate. Required extensions are
//! checked against what this decoder can handle before the document is
//! validated, so codec extensions the crate does not know about still load.
//! Geometry is not expanded; mesh bounds come from the POSITION accessor's
//! min/max, which validation guarantees.

use std::collections::HashSet;
use std::sync::Arc;

use glam::{DMat4, DQuat, DVec3};
use gltf::{Document, Gltf, Semantic};
use scenekit_core::{Aabb, Material, Mesh, ModelNode, TextureRef, Transform};
use serde_json::Value;
use tracing::{debug, warn};

use super::{DecodeContext, DecodeError, GltfAsset, ModelLoader, RawAsset};
use crate::codec::{BASISU_EXTENSION, DRACO_EXTENSION};

const MAX_NODE_DEPTH: usize = 256;

/// Required extensions that only affect shading or encoding of attributes
const PASSIVE_EXTENSIONS: &[&str] = &[
    "KHR_texture_transform",
    "KHR_mesh_quantization",
    "KHR_lights_punctual",
];

/// Decoder for both `.gltf` (JSON) and `.glb` (binary container) files
pub struct GltfLoader;

impl ModelLoader for GltfLoader {
    fn decode(&self, data: &[u8], ctx: &DecodeContext<'_>) -> Result<RawAsset, DecodeError> {
        let Gltf { document, blob } = Gltf::from_slice_without_validation(data)?;
        if let Some(extension) = document
            .extensions_required()
            .find(|ext| !is_supported_extension(ext, ctx))
        {
            return Err(DecodeError::UnsupportedExtension(extension.to_string()));
        }

        // Required extensions were checked above; validate everything else
        let mut json = document.into_json();
        json.extensions_required.clear();
        let document = Document::from_json(json)?;

        let buffers = load_buffers(&document, blob.as_deref(), ctx)?;
        let decoder = DocumentDecoder {
            document: &document,
            buffers,
            ctx,
        };
        let asset = decoder.build()?;
        debug!(
            scenes = asset.scenes.len(),
            nodes = asset.scene.node_count(),
            meshes = asset.scene.mesh_count(),
            animations = asset.animations.len(),
            "glTF decoded"
        );
        Ok(RawAsset::Gltf(asset))
    }
}

fn is_supported_extension(name: &str, ctx: &DecodeContext<'_>) -> bool {
    ctx.codecs.handles_extension(name)
        || name.starts_with("KHR_materials_")
        || PASSIVE_EXTENSIONS.contains(&name)
}

fn invalid(message: impl Into<String>) -> DecodeError {
    DecodeError::InvalidGltf(message.into())
}

fn load_buffers(
    document: &Document,
    blob: Option<&[u8]>,
    ctx: &DecodeContext<'_>,
) -> Result<Vec<Arc<[u8]>>, DecodeError> {
    document
        .buffers()
        .map(|buffer| {
            let bytes: Arc<[u8]> = match buffer.source() {
                gltf::buffer::Source::Bin => blob
                    .map(Arc::from)
                    .ok_or_else(|| invalid("GLB binary chunk missing"))?,
                gltf::buffer::Source::Uri(uri) => ctx.fetch(uri)?,
            };
            if bytes.len() < buffer.length() {
                return Err(invalid(format!(
                    "buffer {} holds {} bytes, expected {}",
                    buffer.index(),
                    bytes.len(),
                    buffer.length()
                )));
            }
            Ok(bytes)
        })
        .collect()
}

struct DocumentDecoder<'a> {
    document: &'a Document,
    buffers: Vec<Arc<[u8]>>,
    ctx: &'a DecodeContext<'a>,
}

impl DocumentDecoder<'_> {
    fn build(&self) -> Result<GltfAsset, DecodeError> {
        let materials: Vec<Material> = self
            .document
            .materials()
            .map(|m| self.build_material(&m))
            .collect();

        let scenes = if self.document.scenes().len() == 0 {
            let roots = self.orphan_nodes();
            vec![self.build_scene(None, roots.into_iter(), &materials)?]
        } else {
            self.document
                .scenes()
                .map(|s| self.build_scene(s.name(), s.nodes(), &materials))
                .collect::<Result<Vec<_>, _>>()?
        };
        let active = self.document.default_scene().map_or(0, |s| s.index());
        let scene = scenes
            .get(active)
            .cloned()
            .ok_or_else(|| invalid(format!("scene {active} out of range")))?;

        let animations = self
            .document
            .animations()
            .map(|a| {
                a.name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Animation {}", a.index()))
            })
            .collect();

        Ok(GltfAsset {
            scene,
            scenes,
            animations,
            extensions_used: self.document.extensions_used().map(str::to_string).collect(),
        })
    }

    /// Nodes that are nobody's child, used when the file defines no scenes
    fn orphan_nodes(&self) -> Vec<gltf::Node<'_>> {
        let children: HashSet<usize> = self
            .document
            .nodes()
            .flat_map(|n| n.children().map(|c| c.index()).collect::<Vec<_>>())
            .collect();
        self.document
            .nodes()
            .filter(|n| !children.contains(&n.index()))
            .collect()
    }

    fn build_scene<'n>(
        &self,
        name: Option<&str>,
        nodes: impl Iterator<Item = gltf::Node<'n>>,
        materials: &[Material],
    ) -> Result<ModelNode, DecodeError> {
        let mut scene = ModelNode::new(name.unwrap_or("Scene"));
        for node in nodes {
            scene.add_child(self.build_node(&node, materials, 0)?);
        }
        Ok(scene)
    }

    fn build_node(
        &self,
        node: &gltf::Node<'_>,
        materials: &[Material],
        depth: usize,
    ) -> Result<ModelNode, DecodeError> {
        if depth > MAX_NODE_DEPTH {
            return Err(invalid("node hierarchy is cyclic or too deep"));
        }
        let mut out = ModelNode::new(node.name().unwrap_or_default())
            .with_transform(node_transform(node.transform()));
        if let Some(mesh) = node.mesh() {
            out.mesh = Some(self.build_mesh(&mesh, materials)?);
        }
        for child in node.children() {
            out.add_child(self.build_node(&child, materials, depth + 1)?);
        }
        Ok(out)
    }

    fn build_mesh(&self, mesh: &gltf::Mesh<'_>, materials: &[Material]) -> Result<Mesh, DecodeError> {
        let mut out = Mesh::new(mesh.name().unwrap_or_default(), Aabb::EMPTY, 0);
        for primitive in mesh.primitives() {
            if let Some(payload) = self.draco_payload(&primitive)? {
                self.ctx.codecs.draco.inspect(payload)?;
                out.compression = Some(DRACO_EXTENSION.to_string());
            }

            if let Some(position) = primitive.get(&Semantic::Positions) {
                let bounds = primitive.bounding_box();
                out.bounds = out.bounds.union(&Aabb::new(
                    DVec3::from_array(bounds.min.map(f64::from)),
                    DVec3::from_array(bounds.max.map(f64::from)),
                ));
                out.vertex_count += position.count();
            }

            if let Some(index) = primitive.material().index() {
                match materials.get(index) {
                    Some(m) => out.materials.push(m.clone()),
                    None => warn!(mesh = mesh.index(), material = index, "Primitive references a missing material"),
                }
            }
        }
        Ok(out)
    }

    /// Bytes of the primitive's compressed geometry, if it has any
    fn draco_payload(&self, primitive: &gltf::Primitive<'_>) -> Result<Option<&[u8]>, DecodeError> {
        let Some(extension) = primitive.extensions().and_then(|e| e.get(DRACO_EXTENSION)) else {
            return Ok(None);
        };
        let view = extension
            .get("bufferView")
            .and_then(Value::as_u64)
            .and_then(|index| self.document.views().nth(index as usize))
            .ok_or_else(|| invalid("compressed primitive has no valid bufferView"))?;
        self.view_bytes(&view).map(Some)
    }

    fn view_bytes(&self, view: &gltf::buffer::View<'_>) -> Result<&[u8], DecodeError> {
        let buffer = self
            .buffers
            .get(view.buffer().index())
            .ok_or_else(|| invalid(format!("buffer {} out of range", view.buffer().index())))?;
        view.offset()
            .checked_add(view.length())
            .and_then(|end| buffer.get(view.offset()..end))
            .ok_or_else(|| invalid(format!("buffer view {} exceeds its buffer", view.index())))
    }

    fn build_material(&self, material: &gltf::Material<'_>) -> Material {
        let pbr = material.pbr_metallic_roughness();
        let [r, g, b, a] = pbr.base_color_factor();
        Material {
            name: material.name().unwrap_or_default().to_string(),
            color: [r, g, b],
            opacity: a,
            metalness: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            emissive: material.emissive_factor(),
            map: pbr
                .base_color_texture()
                .and_then(|info| self.texture_ref(&info.texture())),
            transparent: material.alpha_mode() == gltf::material::AlphaMode::Blend,
            double_sided: material.double_sided(),
        }
    }

    /// Resolve a texture to its final URI, inspecting KTX2 payloads
    fn texture_ref(&self, texture: &gltf::Texture<'_>) -> Option<TextureRef> {
        let basisu = texture
            .extensions()
            .and_then(|e| e.get(BASISU_EXTENSION))
            .and_then(|ext| ext.get("source"))
            .and_then(Value::as_u64)
            .and_then(|index| self.document.images().nth(index as usize));
        let is_basisu = basisu.is_some();
        let image = basisu.unwrap_or_else(|| texture.source());

        let (uri, mime_type, bytes): (String, Option<&str>, Option<Arc<[u8]>>) = match image.source() {
            gltf::image::Source::Uri { uri, mime_type } => {
                let resolved = if uri.starts_with("data:") {
                    uri.to_string()
                } else {
                    self.ctx.resolve(uri)
                };
                (resolved, mime_type, self.ctx.fetch(uri).ok())
            }
            gltf::image::Source::View { view, mime_type } => (
                format!("{}#image{}", self.ctx.url, image.index()),
                Some(mime_type),
                self.view_bytes(&view).ok().map(Arc::from),
            ),
        };

        let is_ktx2 = is_basisu || mime_type == Some("image/ktx2") || uri.ends_with(".ktx2");
        let mut texture_ref = TextureRef::new(uri);
        texture_ref.mime_type = mime_type
            .map(str::to_string)
            .or_else(|| is_ktx2.then(|| "image/ktx2".to_string()));

        match bytes {
            Some(bytes) if is_ktx2 => match self.ctx.codecs.ktx2.inspect(&bytes) {
                Ok(info) => {
                    texture_ref.width = Some(info.width);
                    texture_ref.height = Some(info.height);
                    texture_ref.compressed = true;
                }
                Err(e) => warn!(uri = %texture_ref.uri, error = %e, "KTX2 texture rejected"),
            },
            Some(_) => {}
            None => warn!(uri = %texture_ref.uri, "Texture could not be resolved"),
        }
        Some(texture_ref)
    }
}

fn node_transform(transform: gltf::scene::Transform) -> Transform {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => {
            Transform::from_matrix(DMat4::from_cols_array_2d(&matrix.map(|col| col.map(f64::from))))
        }
        gltf::scene::Transform::Decomposed {
            translation,
            rotation: [x, y, z, w],
            scale,
        } => Transform::from_trs(
            DVec3::from_array(translation.map(f64::from)),
            DQuat::from_xyzw(x as f64, y as f64, z as f64, w as f64),
            DVec3::from_array(scale.map(f64::from)),
        ),
    }
}
