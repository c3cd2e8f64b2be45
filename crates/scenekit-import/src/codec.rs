//! Header inspection for compressed glTF payloads (Draco meshes, KTX2 textures)
//!
//! Payloads are validated and summarised, not decoded. Geometry bounds come
//! from accessor min/max and textures are passed on by URI.
//!
//! A [`CodecSet`] is built once per loader manager and shared across loads.

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::{debug, trace};

pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";
pub const BASISU_EXTENSION: &str = "KHR_texture_basisu";

const DRACO_MAGIC: &[u8] = b"DRACO";
const DRACO_MAX_MAJOR_VERSION: u8 = 2;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid Draco bitstream: {0}")]
    InvalidDraco(String),
    #[error("Invalid KTX2 texture: {0}")]
    InvalidKtx2(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DracoGeometry {
    PointCloud,
    TriangularMesh,
}

/// Fixed header at the start of every Draco bitstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DracoHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub geometry: DracoGeometry,
    /// 0 = sequential, 1 = edgebreaker
    pub method: u8,
}

#[derive(Debug, Default)]
pub struct DracoInspector {
    processed: AtomicUsize,
}

impl DracoInspector {
    /// Validate a bitstream and read its header
    pub fn inspect(&self, payload: &[u8]) -> Result<DracoHeader, CodecError> {
        if payload.len() < 11 || &payload[..5] != DRACO_MAGIC {
            return Err(CodecError::InvalidDraco("missing DRACO magic".into()));
        }
        let major_version = payload[5];
        let minor_version = payload[6];
        if major_version == 0 || major_version > DRACO_MAX_MAJOR_VERSION {
            return Err(CodecError::InvalidDraco(format!(
                "unsupported version {major_version}.{minor_version}"
            )));
        }
        let geometry = match payload[7] {
            0 => DracoGeometry::PointCloud,
            1 => DracoGeometry::TriangularMesh,
            other => {
                return Err(CodecError::InvalidDraco(format!(
                    "unknown encoder type {other}"
                )))
            }
        };
        let method = payload[8];
        if method > 1 {
            return Err(CodecError::InvalidDraco(format!(
                "unknown encoding method {method}"
            )));
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        trace!(major_version, minor_version, ?geometry, "Draco payload accepted");
        Ok(DracoHeader {
            major_version,
            minor_version,
            geometry,
            method,
        })
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Summary of a KTX2 container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ktx2Info {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub supercompression: Option<String>,
}

#[derive(Debug, Default)]
pub struct Ktx2Inspector {
    processed: AtomicUsize,
}

impl Ktx2Inspector {
    pub fn inspect(&self, data: &[u8]) -> Result<Ktx2Info, CodecError> {
        let reader =
            ktx2::Reader::new(data).map_err(|e| CodecError::InvalidKtx2(format!("{e:?}")))?;
        let header = reader.header();
        self.processed.fetch_add(1, Ordering::Relaxed);
        Ok(Ktx2Info {
            width: header.pixel_width,
            height: header.pixel_height.max(1),
            levels: header.level_count.max(1),
            supercompression: header.supercompression_scheme.map(|s| format!("{s:?}")),
        })
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Long-lived codec handles shared by all glTF loads
#[derive(Debug, Default)]
pub struct CodecSet {
    pub draco: DracoInspector,
    pub ktx2: Ktx2Inspector,
}

impl CodecSet {
    pub fn new() -> Self {
        debug!("Codec set initialized");
        Self::default()
    }

    /// Whether a glTF extension is handled by one of the codecs
    pub fn handles_extension(&self, name: &str) -> bool {
        name == DRACO_EXTENSION || name == BASISU_EXTENSION
    }
}
