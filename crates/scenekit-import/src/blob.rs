//! In-memory object URL store
//!
//! Decoders address their inputs by URL. The store hands out opaque
//! `blob:scenekit/<uuid>` URLs for byte buffers so that archive entries and
//! single files can be referenced the same way as remote resources. Every URL
//! created here must be revoked by its owner once loading finishes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;
use uuid::Uuid;

pub const BLOB_URL_PREFIX: &str = "blob:scenekit/";

#[derive(Debug, Default)]
pub struct BlobStore {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return a fresh URL pointing at them
    pub fn create_object_url(&self, data: Arc<[u8]>) -> String {
        let url = format!("{BLOB_URL_PREFIX}{}", Uuid::new_v4());
        let size = data.len();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), data);
        trace!(url = %url, size, "Object URL created");
        url
    }

    pub fn fetch(&self, url: &str) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Release a URL; returns false if it was unknown or already revoked
    pub fn revoke_object_url(&self, url: &str) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
            .is_some();
        if removed {
            trace!(url = %url, "Object URL revoked");
        }
        removed
    }

    /// Number of URLs that have not been revoked yet
    pub fn live_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_blob_url(url: &str) -> bool {
        url.starts_with(BLOB_URL_PREFIX)
    }
}
