//! Scenekit Import - 3D file import pipeline
//!
//! Turns user-supplied files into scene nodes:
//! 1. [`FileValidator`] checks size and extension
//! 2. [`ZipProcessor`] unpacks archives into model files plus a resource map
//! 3. [`LoaderManager`] decodes glTF/GLB, OBJ and FBX data
//! 4. [`ModelProcessor`] normalizes the result and computes its placement
//!
//! [`FileImportService`] orchestrates the whole chain for plain files, ZIP
//! archives and URLs.

pub mod archive;
pub mod blob;
pub mod codec;
pub mod config;
pub mod error;
pub mod file;
pub mod loaders;
pub mod processor;
pub mod resolver;
pub mod service;
pub mod validator;

pub use archive::{ExtractedArchive, ResourceMap, ZipProcessor};
pub use blob::BlobStore;
pub use codec::{CodecError, CodecSet, DracoInspector, Ktx2Inspector};
pub use config::{BatchPolicy, ImportConfig, PlacementConfig, ZipConfig};
pub use error::{ImportError, ImportErrorCode};
pub use file::{ImportFile, ModelFormat};
pub use loaders::{DecodeError, GltfAsset, LoadProgress, LoaderManager, ModelLoader, RawAsset};
pub use processor::{ModelProcessor, ProcessedModel};
pub use resolver::UrlResolver;
pub use service::{BatchOutcome, FileImportService, ImportPhase, ImportResult};
pub use validator::FileValidator;
