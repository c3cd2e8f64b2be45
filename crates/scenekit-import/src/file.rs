//! Import inputs and supported model formats

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// 3D formats the pipeline can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Gltf,
    Glb,
    Obj,
    Fbx,
}

/// Extension to format table used for every lookup
const FORMAT_TABLE: [(&str, ModelFormat); 4] = [
    ("gltf", ModelFormat::Gltf),
    ("glb", ModelFormat::Glb),
    ("obj", ModelFormat::Obj),
    ("fbx", ModelFormat::Fbx),
];

impl ModelFormat {
    pub const ALL: [ModelFormat; 4] = [Self::Gltf, Self::Glb, Self::Obj, Self::Fbx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gltf => "gltf",
            Self::Glb => "glb",
            Self::Obj => "obj",
            Self::Fbx => "fbx",
        }
    }

    /// Case-insensitive lookup by file name suffix
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        FORMAT_TABLE
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, f)| *f)
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FORMAT_TABLE
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(s))
            .map(|(_, f)| *f)
            .ok_or_else(|| format!("unknown model format: {s}"))
    }
}

/// A named in-memory file, the unit of work for the import pipeline
#[derive(Debug, Clone)]
pub struct ImportFile {
    pub name: String,
    pub data: Arc<[u8]>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, naming it after the final path component
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        Ok(Self::new(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_zip(&self) -> bool {
        self.name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("zip"))
    }

    /// File name without directories or extension
    pub fn stem(&self) -> &str {
        let bare = bare_name(&self.name);
        bare.rsplit_once('.').map(|(s, _)| s).unwrap_or(bare)
    }
}

/// Final path segment of a `/`-separated path
pub fn bare_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
