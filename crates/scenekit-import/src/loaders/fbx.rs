//! Binary FBX decoder
//!
//! Reads the node record tree of a binary FBX file and extracts the scene
//! structure: `Model` objects become nodes, `Geometry` vertices give mesh
//! bounds and `Material` objects give colours. Objects are wired together
//! through the `Connections` section. ASCII FBX is not supported.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use glam::DVec3;
use scenekit_core::{Aabb, Material, Mesh, ModelNode, Transform};
use tracing::{debug, warn};

use super::{DecodeContext, DecodeError, ModelLoader, RawAsset};

const FBX_MAGIC: &[u8] = b"Kaydara FBX Binary  \0";
const HEADER_LEN: usize = 27;
/// First version with 64-bit record headers
const WIDE_HEADER_VERSION: u32 = 7500;
const MAX_RECORD_DEPTH: usize = 64;
/// Upper bound of the deflate expansion ratio
const MAX_INFLATE_RATIO: usize = 1032;

#[derive(Debug, Clone, PartialEq)]
enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    BoolArray(Vec<bool>),
    String(String),
    Raw(Vec<u8>),
}

impl Property {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I16(v) => Some(*v as i64),
            Self::I32(v) => Some(*v as i64),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            Self::I16(_) | Self::I32(_) | Self::I64(_) => self.as_i64().map(|v| v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::F64Array(v) => Some(v.clone()),
            Self::F32Array(v) => Some(v.iter().map(|x| *x as f64).collect()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Record {
    name: String,
    properties: Vec<Property>,
    children: Vec<Record>,
}

impl Record {
    fn child(&self, name: &str) -> Option<&Record> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn id(&self) -> Option<i64> {
        self.properties.first().and_then(Property::as_i64)
    }

    /// Object name with the `\0\x01Class` suffix stripped
    fn object_name(&self) -> String {
        let raw = self.properties.get(1).and_then(Property::as_str).unwrap_or("");
        match raw.split_once("\u{0}\u{1}") {
            Some((name, _)) => name.to_string(),
            None => raw.rsplit("::").next().unwrap_or(raw).to_string(),
        }
    }

    /// `Properties70` entries as name -> values
    fn properties70(&self) -> HashMap<&str, &[Property]> {
        self.child("Properties70")
            .map(|p70| {
                p70.children_named("P")
                    .filter_map(|p| {
                        let name = p.properties.first()?.as_str()?;
                        Some((name, p.properties.get(4..).unwrap_or(&[])))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn vec3_property(props: &HashMap<&str, &[Property]>, name: &str) -> Option<DVec3> {
    let values = props.get(name)?;
    Some(DVec3::new(
        values.first()?.as_f64()?,
        values.get(1)?.as_f64()?,
        values.get(2)?.as_f64()?,
    ))
}

fn invalid(message: impl Into<String>) -> DecodeError {
    DecodeError::InvalidFbx(message.into())
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
    wide: bool,
}

impl<'a> Parser<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| invalid("unexpected end of data"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn offset(&mut self) -> Result<u64, DecodeError> {
        if self.wide {
            Ok(u64::from_le_bytes(self.array()?))
        } else {
            Ok(self.u32()? as u64)
        }
    }

    /// Read one record; `None` marks the null record closing a list
    fn record(&mut self, depth: usize) -> Result<Option<Record>, DecodeError> {
        if depth > MAX_RECORD_DEPTH {
            return Err(invalid("records nested too deeply"));
        }
        let end_offset = self.offset()? as usize;
        let property_count = self.offset()?;
        let _property_list_len = self.offset()?;
        let name_len = self.u8()? as usize;
        if end_offset == 0 {
            return Ok(None);
        }
        if end_offset > self.data.len() || end_offset < self.pos {
            return Err(invalid(format!("record end {end_offset} out of range")));
        }

        let name = String::from_utf8_lossy(self.take(name_len)?).into_owned();
        let mut properties = Vec::new();
        for _ in 0..property_count {
            properties.push(self.property()?);
        }
        let mut children = Vec::new();
        while self.pos < end_offset {
            match self.record(depth + 1)? {
                Some(child) => children.push(child),
                None => break,
            }
        }
        self.pos = end_offset;
        Ok(Some(Record {
            name,
            properties,
            children,
        }))
    }

    fn property(&mut self) -> Result<Property, DecodeError> {
        let kind = self.u8()?;
        let property = match kind {
            b'C' => Property::Bool(self.u8()? != 0),
            b'Y' => Property::I16(i16::from_le_bytes(self.array()?)),
            b'I' => Property::I32(i32::from_le_bytes(self.array()?)),
            b'L' => Property::I64(i64::from_le_bytes(self.array()?)),
            b'F' => Property::F32(f32::from_le_bytes(self.array()?)),
            b'D' => Property::F64(f64::from_le_bytes(self.array()?)),
            b'S' => {
                let len = self.u32()? as usize;
                Property::String(String::from_utf8_lossy(self.take(len)?).into_owned())
            }
            b'R' => {
                let len = self.u32()? as usize;
                Property::Raw(self.take(len)?.to_vec())
            }
            b'f' => Property::F32Array(self.array_property(4, |b| {
                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
            })?),
            b'd' => Property::F64Array(self.array_property(8, |b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })?),
            b'i' => Property::I32Array(self.array_property(4, |b| {
                i32::from_le_bytes([b[0], b[1], b[2], b[3]])
            })?),
            b'l' => Property::I64Array(self.array_property(8, |b| {
                i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            })?),
            b'b' => Property::BoolArray(self.array_property(1, |b| b[0] != 0)?),
            other => {
                return Err(invalid(format!(
                    "unknown property type {:?}",
                    other as char
                )))
            }
        };
        Ok(property)
    }

    /// Array properties: length, encoding (0 raw, 1 zlib), byte length, payload
    fn array_property<T>(
        &mut self,
        element_size: usize,
        read: impl Fn(&[u8]) -> T,
    ) -> Result<Vec<T>, DecodeError> {
        let count = self.u32()? as usize;
        let encoding = self.u32()?;
        let byte_len = self.u32()? as usize;
        let payload = self.take(byte_len)?;
        let expected = count
            .checked_mul(element_size)
            .ok_or_else(|| invalid("array length overflow"))?;

        let inflated;
        let bytes: &[u8] = match encoding {
            0 => payload,
            1 => {
                if expected > byte_len.saturating_mul(MAX_INFLATE_RATIO) {
                    return Err(invalid(format!(
                        "array claims {expected} bytes from a {byte_len} byte zlib stream"
                    )));
                }
                let mut out = Vec::with_capacity(expected);
                ZlibDecoder::new(payload)
                    .take(expected as u64)
                    .read_to_end(&mut out)?;
                inflated = out;
                &inflated
            }
            other => return Err(invalid(format!("unknown array encoding {other}"))),
        };
        if bytes.len() < expected {
            return Err(invalid(format!(
                "array holds {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        Ok(bytes[..expected].chunks_exact(element_size).map(read).collect())
    }
}

/// Parse the header and top-level records
fn parse_document(data: &[u8]) -> Result<(u32, Vec<Record>), DecodeError> {
    if !data.starts_with(FBX_MAGIC) {
        if data.starts_with(b"; FBX") || data.windows(12).take(4096).any(|w| w == b"FBXHeaderExt") {
            return Err(invalid("ASCII FBX is not supported"));
        }
        return Err(invalid("missing binary FBX header"));
    }
    if data.len() < HEADER_LEN || data[21..23] != [0x1A, 0x00] {
        return Err(invalid("truncated header"));
    }
    let version = u32::from_le_bytes([data[23], data[24], data[25], data[26]]);

    let mut parser = Parser {
        data,
        pos: HEADER_LEN,
        wide: version >= WIDE_HEADER_VERSION,
    };
    let header_len = if parser.wide { 25 } else { 13 };
    let mut records = Vec::new();
    while parser.pos + header_len <= data.len() {
        match parser.record(0)? {
            Some(record) => records.push(record),
            None => break,
        }
    }
    Ok((version, records))
}

pub struct FbxLoader;

impl ModelLoader for FbxLoader {
    fn decode(&self, data: &[u8], _ctx: &DecodeContext<'_>) -> Result<RawAsset, DecodeError> {
        let (version, records) = parse_document(data)?;
        let root = build_scene(&records)?;
        debug!(
            version,
            nodes = root.node_count(),
            meshes = root.mesh_count(),
            "FBX decoded"
        );
        Ok(RawAsset::Node(root))
    }
}

/// Assemble the model hierarchy from `Objects` and `Connections`
fn build_scene(records: &[Record]) -> Result<ModelNode, DecodeError> {
    let objects = records
        .iter()
        .find(|r| r.name == "Objects")
        .ok_or_else(|| invalid("missing Objects section"))?;

    let mut models: HashMap<i64, ModelNode> = HashMap::new();
    let mut model_order = Vec::new();
    let mut geometries: HashMap<i64, Mesh> = HashMap::new();
    let mut materials: HashMap<i64, Material> = HashMap::new();

    for object in &objects.children {
        let Some(id) = object.id() else {
            continue;
        };
        match object.name.as_str() {
            "Model" => {
                models.insert(
                    id,
                    ModelNode::new(object.object_name()).with_transform(model_transform(object)),
                );
                model_order.push(id);
            }
            "Geometry" => {
                geometries.insert(id, geometry_mesh(object));
            }
            "Material" => {
                materials.insert(id, fbx_material(object));
            }
            _ => {}
        }
    }

    // child id -> parent id, in file order
    let mut parents: Vec<(i64, i64)> = Vec::new();
    if let Some(connections) = records.iter().find(|r| r.name == "Connections") {
        for c in connections.children_named("C") {
            let kind = c.properties.first().and_then(Property::as_str);
            let child = c.properties.get(1).and_then(Property::as_i64);
            let parent = c.properties.get(2).and_then(Property::as_i64);
            if let (Some("OO"), Some(child), Some(parent)) = (kind, child, parent) {
                parents.push((child, parent));
            }
        }
    }

    let mut model_materials: HashMap<i64, Vec<Material>> = HashMap::new();
    for &(child, parent) in &parents {
        if !models.contains_key(&parent) {
            continue;
        }
        if let Some(mesh) = geometries.get(&child) {
            if let Some(model) = models.get_mut(&parent) {
                model.mesh = Some(mesh.clone());
            }
        } else if let Some(material) = materials.get(&child) {
            model_materials
                .entry(parent)
                .or_default()
                .push(material.clone());
        }
    }
    for (id, list) in model_materials {
        match models.get_mut(&id).and_then(|m| m.mesh.as_mut()) {
            Some(mesh) => mesh.materials = list,
            None => warn!(model = id, "Material connected to a model without geometry"),
        }
    }

    let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut has_parent = std::collections::HashSet::new();
    for &(child, parent) in &parents {
        if models.contains_key(&child) && (parent == 0 || models.contains_key(&parent)) {
            children_of.entry(parent).or_default().push(child);
            has_parent.insert(child);
        }
    }
    // Models with no connection hang off the root
    for id in &model_order {
        if !has_parent.contains(id) {
            children_of.entry(0).or_default().push(*id);
        }
    }

    let mut root = ModelNode::new("");
    for id in children_of.get(&0).cloned().unwrap_or_default() {
        root.add_child(assemble(id, &mut models, &children_of, 0)?);
    }
    Ok(root)
}

fn assemble(
    id: i64,
    models: &mut HashMap<i64, ModelNode>,
    children_of: &HashMap<i64, Vec<i64>>,
    depth: usize,
) -> Result<ModelNode, DecodeError> {
    if depth > MAX_RECORD_DEPTH {
        return Err(invalid("model hierarchy is cyclic or too deep"));
    }
    let mut node = models
        .remove(&id)
        .ok_or_else(|| invalid(format!("model {id} connected twice")))?;
    for &child in children_of.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
        node.add_child(assemble(child, models, children_of, depth + 1)?);
    }
    Ok(node)
}

fn model_transform(model: &Record) -> Transform {
    let props = model.properties70();
    Transform {
        position: vec3_property(&props, "Lcl Translation").unwrap_or(DVec3::ZERO),
        rotation: vec3_property(&props, "Lcl Rotation")
            .map(|deg| DVec3::new(deg.x.to_radians(), deg.y.to_radians(), deg.z.to_radians()))
            .unwrap_or(DVec3::ZERO),
        scale: vec3_property(&props, "Lcl Scaling").unwrap_or(DVec3::ONE),
    }
}

fn geometry_mesh(geometry: &Record) -> Mesh {
    let vertices = geometry
        .child("Vertices")
        .and_then(|v| v.properties.first())
        .and_then(Property::to_f64_vec)
        .unwrap_or_default();
    let bounds = Aabb::from_points(
        vertices
            .chunks_exact(3)
            .map(|v| DVec3::new(v[0], v[1], v[2])),
    );
    Mesh::new(geometry.object_name(), bounds, vertices.len() / 3)
}

fn fbx_material(material: &Record) -> Material {
    let props = material.properties70();
    let color = vec3_property(&props, "DiffuseColor")
        .or_else(|| vec3_property(&props, "Diffuse"))
        .unwrap_or(DVec3::ONE);
    let emissive = vec3_property(&props, "EmissiveColor").unwrap_or(DVec3::ZERO);
    let opacity = props
        .get("Opacity")
        .and_then(|v| v.first())
        .and_then(Property::as_f64)
        .unwrap_or(1.0) as f32;
    Material {
        name: material.object_name(),
        color: color.as_vec3().to_array(),
        opacity,
        emissive: emissive.as_vec3().to_array(),
        transparent: opacity < 1.0,
        ..Material::default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blob::BlobStore;
    use crate::codec::CodecSet;
    use crate::loaders::LoadProgress;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    pub(crate) enum P {
        I64(i64),
        F64(f64),
        Str(String),
        F64Array(Vec<f64>, bool),
        /// `d` array with a hand-picked header
        RawF64Array { count: u32, encoding: u32, payload: Vec<u8> },
    }

    /// Writes binary FBX record trees with absolute end offsets
    pub(crate) struct FbxWriter {
        buf: Vec<u8>,
        wide: bool,
    }

    impl FbxWriter {
        pub(crate) fn new(version: u32) -> Self {
            let mut buf = FBX_MAGIC.to_vec();
            buf.extend_from_slice(&[0x1A, 0x00]);
            buf.extend_from_slice(&version.to_le_bytes());
            Self {
                buf,
                wide: version >= WIDE_HEADER_VERSION,
            }
        }

        fn offset(&mut self, value: u64) {
            if self.wide {
                self.buf.extend_from_slice(&value.to_le_bytes());
            } else {
                self.buf.extend_from_slice(&(value as u32).to_le_bytes());
            }
        }

        fn patch(&mut self, at: usize, value: u64) {
            if self.wide {
                self.buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
            } else {
                self.buf[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
            }
        }

        pub(crate) fn record(
            &mut self,
            name: &str,
            props: &[P],
            children: impl FnOnce(&mut FbxWriter),
        ) {
            let start = self.buf.len();
            self.offset(0);
            self.offset(props.len() as u64);
            let list_len_at = self.buf.len();
            self.offset(0);
            self.buf.push(name.len() as u8);
            self.buf.extend_from_slice(name.as_bytes());

            let props_start = self.buf.len();
            for prop in props {
                self.property(prop);
            }
            let list_len = (self.buf.len() - props_start) as u64;
            self.patch(list_len_at, list_len);

            let before_children = self.buf.len();
            children(self);
            if self.buf.len() != before_children {
                self.null_record();
            }
            let end = self.buf.len() as u64;
            self.patch(start, end);
        }

        fn property(&mut self, prop: &P) {
            match prop {
                P::I64(v) => {
                    self.buf.push(b'L');
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
                P::F64(v) => {
                    self.buf.push(b'D');
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
                P::Str(s) => {
                    self.buf.push(b'S');
                    self.buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                    self.buf.extend_from_slice(s.as_bytes());
                }
                P::F64Array(values, compress) => {
                    let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                    let payload = if *compress {
                        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                        encoder.write_all(&raw).unwrap();
                        encoder.finish().unwrap()
                    } else {
                        raw
                    };
                    self.buf.push(b'd');
                    self.buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
                    self.buf.extend_from_slice(&(*compress as u32).to_le_bytes());
                    self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                    self.buf.extend_from_slice(&payload);
                }
                P::RawF64Array { count, encoding, payload } => {
                    self.buf.push(b'd');
                    self.buf.extend_from_slice(&count.to_le_bytes());
                    self.buf.extend_from_slice(&encoding.to_le_bytes());
                    self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                    self.buf.extend_from_slice(payload);
                }
            }
        }

        fn null_record(&mut self) {
            let len = if self.wide { 25 } else { 13 };
            self.buf.extend(std::iter::repeat(0u8).take(len));
        }

        pub(crate) fn finish(mut self) -> Vec<u8> {
            self.null_record();
            self.buf
        }
    }

    fn p(name: &str, values: [f64; 3]) -> impl FnOnce(&mut FbxWriter) + '_ {
        move |w: &mut FbxWriter| {
            w.record(
                "P",
                &[
                    P::Str(name.to_string()),
                    P::Str(String::new()),
                    P::Str(String::new()),
                    P::Str("A".to_string()),
                    P::F64(values[0]),
                    P::F64(values[1]),
                    P::F64(values[2]),
                ],
                |_| {},
            )
        }
    }

    /// A parent model with a cube child, geometry and a red material
    pub(crate) fn sample_fbx(version: u32, compress: bool) -> Vec<u8> {
        let mut w = FbxWriter::new(version);
        w.record("FBXHeaderExtension", &[], |_| {});
        w.record("Objects", &[], |w| {
            w.record(
                "Model",
                &[P::I64(100), P::Str("Body\u{0}\u{1}Model".into()), P::Str("Null".into())],
                |w| {
                    w.record("Properties70", &[], |w| {
                        p("Lcl Translation", [0.0, 10.0, 0.0])(w);
                    })
                },
            );
            w.record(
                "Model",
                &[P::I64(200), P::Str("Cube\u{0}\u{1}Model".into()), P::Str("Mesh".into())],
                |w| {
                    w.record("Properties70", &[], |w| {
                        p("Lcl Rotation", [0.0, 90.0, 0.0])(w);
                        p("Lcl Scaling", [2.0, 2.0, 2.0])(w);
                    })
                },
            );
            w.record(
                "Geometry",
                &[P::I64(300), P::Str("Cube\u{0}\u{1}Geometry".into()), P::Str("Mesh".into())],
                |w| {
                    w.record(
                        "Vertices",
                        &[P::F64Array(
                            vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 0.5, 3.0, 0.0],
                            compress,
                        )],
                        |_| {},
                    )
                },
            );
            w.record(
                "Material",
                &[P::I64(400), P::Str("Red\u{0}\u{1}Material".into()), P::Str(String::new())],
                |w| {
                    w.record("Properties70", &[], |w| {
                        p("DiffuseColor", [1.0, 0.0, 0.0])(w);
                    })
                },
            );
        });
        w.record("Connections", &[], |w| {
            for (child, parent) in [(100, 0), (200, 100), (300, 200), (400, 200)] {
                w.record(
                    "C",
                    &[P::Str("OO".into()), P::I64(child), P::I64(parent)],
                    |_| {},
                );
            }
        });
        w.finish()
    }

    fn decode(data: &[u8]) -> Result<ModelNode, DecodeError> {
        let blobs = BlobStore::new();
        let codecs = CodecSet::new();
        let progress = |_: LoadProgress| {};
        let ctx = DecodeContext {
            url: "blob:scenekit/fbx",
            blobs: &blobs,
            resolver: None,
            codecs: &codecs,
            progress: &progress,
        };
        match FbxLoader.decode(data, &ctx)? {
            RawAsset::Node(node) => Ok(node),
            RawAsset::Gltf(_) => panic!("FBX loader returned a glTF asset"),
        }
    }

    fn check_sample(root: &ModelNode) {
        assert_eq!(root.children.len(), 1);
        let body = &root.children[0];
        assert_eq!(body.name, "Body");
        assert_eq!(body.transform.position, DVec3::new(0.0, 10.0, 0.0));

        let cube = &body.children[0];
        assert_eq!(cube.name, "Cube");
        assert!((cube.transform.rotation.y - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(cube.transform.scale, DVec3::splat(2.0));

        let mesh = cube.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertex_count, 3);
        assert_eq!(mesh.bounds.min, DVec3::new(-1.0, -1.0, -1.0));
        assert_eq!(mesh.bounds.max, DVec3::new(1.0, 3.0, 1.0));
        assert_eq!(mesh.materials[0].name, "Red");
        assert_eq!(mesh.materials[0].color, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_decode_32bit_records() {
        check_sample(&decode(&sample_fbx(7400, false)).unwrap());
    }

    #[test]
    fn test_decode_64bit_records_with_zlib_arrays() {
        check_sample(&decode(&sample_fbx(7500, true)).unwrap());
    }

    #[test]
    fn test_ascii_fbx_rejected() {
        let ascii = b"; FBX 7.4.0 project file\nFBXHeaderExtension:  {\n}\n";
        let err = decode(ascii).unwrap_err();
        assert!(err.to_string().contains("ASCII FBX"));
    }

    #[test]
    fn test_truncated_file() {
        let data = sample_fbx(7400, false);
        let err = decode(&data[..data.len() / 2]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFbx(_)));
    }

    #[test]
    fn test_missing_objects_section() {
        let mut w = FbxWriter::new(7400);
        w.record("FBXHeaderExtension", &[], |_| {});
        let err = decode(&w.finish()).unwrap_err();
        assert!(err.to_string().contains("Objects"));
    }

    fn geometry_with_array(count: u32, encoding: u32, payload: Vec<u8>) -> Vec<u8> {
        let mut w = FbxWriter::new(7400);
        w.record("Objects", &[], |w| {
            w.record(
                "Geometry",
                &[P::I64(300), P::Str("Cube\u{0}\u{1}Geometry".into()), P::Str("Mesh".into())],
                |w| {
                    w.record("Vertices", &[P::RawF64Array { count, encoding, payload }], |_| {})
                },
            );
        });
        w.finish()
    }

    fn zlib(raw: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_array_count_beyond_payload_rejected() {
        // A tiny zlib stream cannot back four billion doubles
        let data = geometry_with_array(u32::MAX, 1, zlib(&[0u8; 24]));
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFbx(_)));

        let data = geometry_with_array(u32::MAX, 0, vec![0u8; 24]);
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFbx(_)));
    }

    #[test]
    fn test_array_shorter_than_count_rejected() {
        let raw: Vec<u8> = [1.0f64, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let data = geometry_with_array(100, 1, zlib(&raw));
        let err = decode(&data).unwrap_err();
        assert!(err.to_string().contains("expected 800"));
    }

    #[test]
    fn test_inflate_stops_at_declared_length() {
        // Extra inflated bytes past the declared count are never read
        let raw: Vec<u8> = [0.0f64; 64].iter().flat_map(|v| v.to_le_bytes()).collect();
        let data = geometry_with_array(3, 1, zlib(&raw));
        assert!(decode(&data).is_ok());
    }
}
