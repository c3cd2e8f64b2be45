//! Format decoders and the loader registry
//!
//! [`LoaderManager::load_file`] is callback based: the decoded asset goes to
//! `on_load`, failures go to `on_error`, and byte progress to `on_progress`.
//! Decoding runs on the blocking pool when a Tokio runtime is available.

pub mod fbx;
pub mod gltf;
pub mod obj;

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use scenekit_core::ModelNode;
use thiserror::Error;
use tracing::{debug, error};

use crate::blob::BlobStore;
use crate::codec::{CodecError, CodecSet};
use crate::file::ModelFormat;
use crate::resolver::UrlResolver;

pub use self::fbx::FbxLoader;
pub use self::gltf::GltfLoader;
pub use self::obj::ObjLoader;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unknown file type: {0}")]
    UnknownType(String),
    #[error("Resource not found: {0}")]
    MissingResource(String),
    #[error("Invalid glTF document: {0}")]
    InvalidGltf(String),
    #[error("Unsupported required extension: {0}")]
    UnsupportedExtension(String),
    #[error("Invalid FBX file: {0}")]
    InvalidFbx(String),
    #[error("glTF error: {0}")]
    Gltf(#[from] ::gltf::Error),
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("OBJ parse error: {0}")]
    Obj(#[from] tobj::LoadError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decoder task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    pub total: u64,
}

/// Decoded output of a glTF/GLB file
#[derive(Debug, Clone)]
pub struct GltfAsset {
    /// The active scene
    pub scene: ModelNode,
    pub scenes: Vec<ModelNode>,
    pub animations: Vec<String>,
    pub extensions_used: Vec<String>,
}

/// What a decoder hands back: glTF yields a document, the others a bare node
#[derive(Debug, Clone)]
pub enum RawAsset {
    Gltf(GltfAsset),
    Node(ModelNode),
}

/// Everything a decoder may need besides the main file bytes
pub struct DecodeContext<'a> {
    pub url: &'a str,
    pub blobs: &'a BlobStore,
    pub resolver: Option<&'a UrlResolver>,
    pub codecs: &'a CodecSet,
    progress: &'a dyn Fn(LoadProgress),
}

impl DecodeContext<'_> {
    /// Apply the resolver, if any
    pub fn resolve(&self, uri: &str) -> String {
        match self.resolver {
            Some(resolver) => resolver.resolve(uri),
            None => uri.to_string(),
        }
    }

    /// Load a referenced resource from a data URI or the blob store
    pub fn fetch(&self, uri: &str) -> Result<Arc<[u8]>, DecodeError> {
        if uri.starts_with("data:") {
            return decode_data_uri(uri).map(Arc::from);
        }
        let resolved = self.resolve(uri);
        self.blobs
            .fetch(&resolved)
            .ok_or_else(|| DecodeError::MissingResource(uri.to_string()))
    }

    pub fn report_progress(&self, loaded: u64, total: u64) {
        (self.progress)(LoadProgress { loaded, total });
    }
}

/// Decode `data:[<mime>][;base64],<payload>`
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, DecodeError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DecodeError::MissingResource(uri.to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::InvalidGltf("malformed data URI".into()))?;
    if meta.ends_with(";base64") {
        Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

pub trait ModelLoader: Send + Sync {
    fn decode(&self, data: &[u8], ctx: &DecodeContext<'_>) -> Result<RawAsset, DecodeError>;
}

pub type LoadCallback = Box<dyn FnOnce(RawAsset) + Send>;
pub type ProgressCallback = Box<dyn Fn(LoadProgress) + Send + Sync>;
pub type ErrorCallback = Box<dyn FnOnce(DecodeError) + Send>;

/// Registry of decoders keyed by format
pub struct LoaderManager {
    blobs: Arc<BlobStore>,
    codecs: Arc<CodecSet>,
    loaders: HashMap<ModelFormat, Arc<dyn ModelLoader>>,
}

impl LoaderManager {
    /// Create a manager with the built-in decoders registered
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        let gltf: Arc<dyn ModelLoader> = Arc::new(GltfLoader);
        let mut loaders: HashMap<ModelFormat, Arc<dyn ModelLoader>> = HashMap::new();
        loaders.insert(ModelFormat::Gltf, gltf.clone());
        loaders.insert(ModelFormat::Glb, gltf);
        loaders.insert(ModelFormat::Obj, Arc::new(ObjLoader));
        loaders.insert(ModelFormat::Fbx, Arc::new(FbxLoader));

        Self {
            blobs,
            codecs: Arc::new(CodecSet::new()),
            loaders,
        }
    }

    /// Replace the decoder for a format
    pub fn register_loader(&mut self, format: ModelFormat, loader: Arc<dyn ModelLoader>) {
        debug!(format = %format, "Loader registered");
        self.loaders.insert(format, loader);
    }

    pub fn codecs(&self) -> &Arc<CodecSet> {
        &self.codecs
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    /// Decode the blob at `url` with the decoder registered for `file_type`
    ///
    /// An unknown `file_type` is reported through `on_error` before this
    /// returns. Without `on_error`, failures are logged.
    pub fn load_file(
        &self,
        file_type: &str,
        url: &str,
        resolver: Option<UrlResolver>,
        on_load: LoadCallback,
        on_progress: Option<ProgressCallback>,
        on_error: Option<ErrorCallback>,
    ) {
        let loader = file_type
            .parse::<ModelFormat>()
            .ok()
            .and_then(|format| self.loaders.get(&format).cloned());
        let Some(loader) = loader else {
            report_error(on_error, DecodeError::UnknownType(file_type.to_string()));
            return;
        };

        let job = LoadJob {
            loader,
            url: url.to_string(),
            resolver,
            blobs: self.blobs.clone(),
            codecs: self.codecs.clone(),
            on_progress,
        };
        let finish = move |result: Result<RawAsset, DecodeError>| match result {
            Ok(asset) => on_load(asset),
            Err(e) => report_error(on_error, e),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || finish(job.run()));
            }
            Err(_) => finish(job.run()),
        }
    }
}

fn report_error(on_error: Option<ErrorCallback>, err: DecodeError) {
    match on_error {
        Some(callback) => callback(err),
        None => error!(error = %err, "Load failed"),
    }
}

struct LoadJob {
    loader: Arc<dyn ModelLoader>,
    url: String,
    resolver: Option<UrlResolver>,
    blobs: Arc<BlobStore>,
    codecs: Arc<CodecSet>,
    on_progress: Option<ProgressCallback>,
}

impl LoadJob {
    fn run(self) -> Result<RawAsset, DecodeError> {
        let data = self
            .blobs
            .fetch(&self.url)
            .ok_or_else(|| DecodeError::MissingResource(self.url.clone()))?;
        let total = data.len() as u64;
        let progress = |p: LoadProgress| {
            if let Some(callback) = &self.on_progress {
                callback(p);
            }
        };

        let ctx = DecodeContext {
            url: &self.url,
            blobs: &self.blobs,
            resolver: self.resolver.as_ref(),
            codecs: &self.codecs,
            progress: &progress,
        };
        ctx.report_progress(0, total);
        let asset = self.loader.decode(&data, &ctx)?;
        ctx.report_progress(total, total);
        Ok(asset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    /// Minimal single-node glTF document
    pub(crate) const TRIANGLE_GLTF: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"name": "Main", "nodes": [0]}],
        "nodes": [{"name": "Triangle", "mesh": 0}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "accessors": [{
            "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [-1.0, 0.0, -1.0], "max": [1.0, 2.0, 1.0]
        }]
    }"#;

    fn manager() -> LoaderManager {
        LoaderManager::new(Arc::new(BlobStore::new()))
    }

    #[test]
    fn test_unknown_type_reports_synchronously() {
        let manager = manager();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        manager.load_file(
            "stl",
            "blob:scenekit/none",
            None,
            Box::new(|_| panic!("should not load")),
            None,
            Some(Box::new(move |e| *sink.lock().unwrap() = Some(e.to_string()))),
        );
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("Unknown file type: stl")
        );
    }

    #[test]
    fn test_inline_load_without_runtime() {
        let manager = manager();
        let url = manager
            .blobs()
            .create_object_url(Arc::from(TRIANGLE_GLTF.as_bytes()));
        let loaded = Arc::new(Mutex::new(None));
        let progress = Arc::new(Mutex::new(Vec::new()));
        let (sink, ticks) = (loaded.clone(), progress.clone());

        manager.load_file(
            "gltf",
            &url,
            None,
            Box::new(move |asset| *sink.lock().unwrap() = Some(asset)),
            Some(Box::new(move |p| ticks.lock().unwrap().push(p))),
            None,
        );

        let asset = loaded.lock().unwrap().take().unwrap();
        let RawAsset::Gltf(gltf) = asset else {
            panic!("expected glTF asset");
        };
        assert_eq!(gltf.scene.name, "Main");
        let ticks = progress.lock().unwrap();
        assert_eq!(ticks.first().unwrap().loaded, 0);
        assert_eq!(ticks.last().unwrap().loaded, TRIANGLE_GLTF.len() as u64);
    }

    #[tokio::test]
    async fn test_missing_blob_reports_error() {
        let manager = manager();
        let (tx, rx) = oneshot::channel();
        manager.load_file(
            "glb",
            "blob:scenekit/revoked",
            None,
            Box::new(|_| panic!("should not load")),
            None,
            Some(Box::new(move |e| {
                let _ = tx.send(e);
            })),
        );
        let err = rx.await.unwrap();
        assert!(matches!(err, DecodeError::MissingResource(_)));
    }

    #[test]
    fn test_register_loader_replaces_default() {
        struct Fixed;
        impl ModelLoader for Fixed {
            fn decode(&self, _: &[u8], _: &DecodeContext<'_>) -> Result<RawAsset, DecodeError> {
                Ok(RawAsset::Node(ModelNode::new("fixed")))
            }
        }

        let mut manager = manager();
        manager.register_loader(ModelFormat::Obj, Arc::new(Fixed));
        let url = manager.blobs().create_object_url(Arc::from(&b"v 0 0 0"[..]));
        let name = Arc::new(Mutex::new(String::new()));
        let sink = name.clone();
        manager.load_file(
            "OBJ",
            &url,
            None,
            Box::new(move |asset| {
                if let RawAsset::Node(node) = asset {
                    *sink.lock().unwrap() = node.name;
                }
            }),
            None,
            None,
        );
        assert_eq!(*name.lock().unwrap(), "fixed");
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(
            decode_data_uri("data:application/octet-stream;base64,AAEC").unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(decode_data_uri("data:text/plain,hi").unwrap(), b"hi");
        assert!(decode_data_uri("data:;base64,@@@").is_err());
    }
}
