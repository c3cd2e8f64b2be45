//! Pre-load file checks

use tracing::debug;

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::file::{ImportFile, ModelFormat};

/// Rejects files that are too large or of an unsupported type
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size: u64,
    supported_types: Vec<ModelFormat>,
}

impl FileValidator {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            supported_types: config.supported_types.clone(),
        }
    }

    /// Check size first, then type
    pub fn validate_file(&self, file: &ImportFile) -> Result<(), ImportError> {
        if file.size() > self.max_file_size {
            debug!(file = %file.name, size = file.size(), limit = self.max_file_size, "File too large");
            return Err(ImportError::file_too_large(&file.name, self.max_file_size));
        }
        if self.get_file_type(&file.name).is_none() {
            debug!(file = %file.name, "Unsupported file type");
            return Err(ImportError::unsupported_type(&file.name));
        }
        Ok(())
    }

    /// Map a file name to one of the enabled formats
    pub fn get_file_type(&self, name: &str) -> Option<ModelFormat> {
        ModelFormat::from_file_name(name).filter(|f| self.supported_types.contains(f))
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}
