//! Typed import errors
//!
//! Every failure leaving the import service has the same shape: a message, a
//! machine-readable code, the offending file name when known, and the
//! underlying error as `source()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::file::ModelFormat;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportErrorCode {
    FileTooLarge,
    UnsupportedFileType,
    UnknownFileType,
    GltfLoadError,
    GlbLoadError,
    ObjLoadError,
    FbxLoadError,
    ModelProcessError,
    ZipExtractError,
    NoSupportedFiles,
    UrlImportError,
}

impl ImportErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::UnsupportedFileType => "UNSUPPORTED_FILE_TYPE",
            Self::UnknownFileType => "UNKNOWN_FILE_TYPE",
            Self::GltfLoadError => "GLTF_LOAD_ERROR",
            Self::GlbLoadError => "GLB_LOAD_ERROR",
            Self::ObjLoadError => "OBJ_LOAD_ERROR",
            Self::FbxLoadError => "FBX_LOAD_ERROR",
            Self::ModelProcessError => "MODEL_PROCESS_ERROR",
            Self::ZipExtractError => "ZIP_EXTRACT_ERROR",
            Self::NoSupportedFiles => "NO_SUPPORTED_FILES",
            Self::UrlImportError => "URL_IMPORT_ERROR",
        }
    }

    /// The `<FORMAT>_LOAD_ERROR` code for a decoder failure
    pub fn load_error(format: ModelFormat) -> Self {
        match format {
            ModelFormat::Gltf => Self::GltfLoadError,
            ModelFormat::Glb => Self::GlbLoadError,
            ModelFormat::Obj => Self::ObjLoadError,
            ModelFormat::Fbx => Self::FbxLoadError,
        }
    }
}

impl fmt::Display for ImportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("{message}")]
pub struct ImportError {
    pub message: String,
    pub code: ImportErrorCode,
    pub file_name: Option<String>,
    #[source]
    pub cause: Option<BoxError>,
}

impl ImportError {
    pub fn new(code: ImportErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            file_name: None,
            cause: None,
        }
    }

    pub fn with_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn file_too_large(file_name: &str, limit_bytes: u64) -> Self {
        let limit_mb = limit_bytes as f64 / (1024.0 * 1024.0);
        Self::new(
            ImportErrorCode::FileTooLarge,
            format!("File {file_name} exceeds the maximum size of {limit_mb:.0} MB"),
        )
        .with_file(file_name)
    }

    pub fn unsupported_type(file_name: &str) -> Self {
        Self::new(
            ImportErrorCode::UnsupportedFileType,
            format!("Unsupported file type: {file_name}"),
        )
        .with_file(file_name)
    }

    pub fn unknown_type(file_name: &str) -> Self {
        Self::new(
            ImportErrorCode::UnknownFileType,
            format!("Cannot determine the file type of {file_name}"),
        )
        .with_file(file_name)
    }
}
