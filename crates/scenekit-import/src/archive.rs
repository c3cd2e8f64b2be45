//! ZIP archive extraction
//!
//! An archive is flattened into the model files it contains plus a
//! [`ResourceMap`] that gives every entry, models and sibling assets alike, a
//! blob URL. The map is keyed by full entry path and by bare file name so a
//! model can reference `textures/wood.png` or just `wood.png`.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use encoding_rs::Encoding;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::blob::BlobStore;
use crate::config::ImportConfig;
use crate::error::{ImportError, ImportErrorCode};
use crate::file::{bare_name, ImportFile, ModelFormat};

/// Entry name to blob URL table owned by one archive import
#[derive(Debug, Default)]
pub struct ResourceMap {
    entries: HashMap<String, String>,
    urls: Vec<String>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry under its full path and, unless already taken, its bare name
    ///
    /// Full paths always win over bare names; among bare names the first
    /// entry seen keeps the key.
    pub fn insert(&mut self, path: &str, url: String) {
        self.entries.insert(path.to_string(), url.clone());
        let bare = bare_name(path);
        if bare != path {
            self.entries
                .entry(bare.to_string())
                .or_insert_with(|| url.clone());
        }
        self.urls.push(url);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Every distinct URL, once each
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys, counting full paths and bare names separately
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of unpacking one archive
#[derive(Debug, Default)]
pub struct ExtractedArchive {
    /// Entries with a supported model extension, named by bare file name
    pub files: Vec<ImportFile>,
    pub resource_map: ResourceMap,
}

pub struct ZipProcessor {
    blobs: Arc<BlobStore>,
    legacy_encoding: Option<&'static Encoding>,
    /// Largest accepted entry after decompression
    max_entry_size: u64,
}

impl ZipProcessor {
    pub fn new(blobs: Arc<BlobStore>, config: &ImportConfig) -> Self {
        let label = &config.zip.legacy_encoding;
        let legacy_encoding = Encoding::for_label(label.as_bytes());
        if legacy_encoding.is_none() {
            warn!(label = %label, "Unknown legacy encoding, non-UTF-8 names will be decoded lossily");
        }
        Self {
            blobs,
            legacy_encoding,
            max_entry_size: config.max_file_size,
        }
    }

    /// Unpack an archive, registering a blob URL for every file entry
    ///
    /// On failure every URL created so far has already been revoked.
    pub fn extract_zip_files(&self, file: &ImportFile) -> Result<ExtractedArchive, ImportError> {
        let mut archive = ZipArchive::new(Cursor::new(&file.data[..])).map_err(|e| {
            ImportError::new(
                ImportErrorCode::ZipExtractError,
                format!("Failed to open archive {}", file.name),
            )
            .with_file(&file.name)
            .with_cause(e)
        })?;

        let mut extracted = ExtractedArchive::default();
        if let Err(e) = self.read_entries(&mut archive, &mut extracted, &file.name) {
            self.cleanup_resource_map(extracted.resource_map);
            return Err(e);
        }

        info!(
            archive = %file.name,
            models = extracted.files.len(),
            resources = extracted.resource_map.urls().len(),
            "Archive extracted"
        );
        Ok(extracted)
    }

    fn read_entries(
        &self,
        archive: &mut ZipArchive<Cursor<&[u8]>>,
        extracted: &mut ExtractedArchive,
        archive_name: &str,
    ) -> Result<(), ImportError> {
        let extract_error = |e: Box<dyn std::error::Error + Send + Sync>| {
            ImportError::new(
                ImportErrorCode::ZipExtractError,
                format!("Failed to extract archive {archive_name}"),
            )
            .with_file(archive_name)
            .with_cause(e)
        };

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|e| extract_error(e.into()))?;
            if entry.is_dir() {
                continue;
            }
            let path = self.decode_entry_name(entry.name_raw());
            if path.starts_with("__MACOSX/") {
                debug!(entry = %path, "Skipping resource fork entry");
                continue;
            }

            // The declared size is only a hint; the read below is capped too
            if entry.size() > self.max_entry_size {
                warn!(entry = %path, size = entry.size(), limit = self.max_entry_size, "Archive entry too large");
                return Err(ImportError::file_too_large(&path, self.max_entry_size));
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            (&mut entry)
                .take(self.max_entry_size.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| extract_error(e.into()))?;
            if data.len() as u64 > self.max_entry_size {
                warn!(entry = %path, limit = self.max_entry_size, "Archive entry inflates past the limit");
                return Err(ImportError::file_too_large(&path, self.max_entry_size));
            }
            let data: Arc<[u8]> = data.into();

            let url = self.blobs.create_object_url(data.clone());
            extracted.resource_map.insert(&path, url);

            if ModelFormat::from_file_name(&path).is_some() {
                debug!(entry = %path, size = data.len(), "Found model entry");
                extracted.files.push(ImportFile::new(bare_name(&path), data));
            }
        }
        Ok(())
    }

    /// Decode a raw entry name: UTF-8, then the legacy code page, then lossy
    pub fn decode_entry_name(&self, raw: &[u8]) -> String {
        if let Ok(name) = std::str::from_utf8(raw) {
            return name.to_string();
        }
        if let Some(encoding) = self.legacy_encoding {
            let (name, had_errors) = encoding.decode_without_bom_handling(raw);
            if !had_errors {
                return name.into_owned();
            }
            warn!(encoding = encoding.name(), "Malformed entry name, decoding lossily");
        }
        String::from_utf8_lossy(raw).into_owned()
    }

    /// Revoke every URL of an archive's resource map, returning how many were live
    pub fn cleanup_resource_map(&self, map: ResourceMap) -> usize {
        let revoked = map
            .urls
            .iter()
            .filter(|url| self.blobs.revoke_object_url(url))
            .count();
        debug!(revoked, "Resource map released");
        revoked
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ZipConfig;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Build an in-memory archive from (path, contents) pairs
    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (path, contents) in entries {
            if path.ends_with('/') {
                writer.add_directory(*path, options).unwrap();
            } else {
                writer.start_file(*path, options).unwrap();
                writer.write_all(contents).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn processor(blobs: &Arc<BlobStore>) -> ZipProcessor {
        ZipProcessor::new(blobs.clone(), &ImportConfig::default())
    }

    #[test]
    fn test_extract_models_and_resources() {
        let blobs = Arc::new(BlobStore::new());
        let zip = build_zip(&[
            ("scene/", b""),
            ("scene/model.glb", b"glTF"),
            ("scene/texture.png", b"\x89PNG"),
        ]);
        let extracted = processor(&blobs)
            .extract_zip_files(&ImportFile::new("pack.zip", zip))
            .unwrap();

        assert_eq!(extracted.files.len(), 1);
        assert_eq!(extracted.files[0].name, "model.glb");
        let map = &extracted.resource_map;
        for key in ["scene/model.glb", "model.glb", "scene/texture.png", "texture.png"] {
            assert!(map.contains_key(key), "missing {key}");
        }
        assert_eq!(map.get("texture.png"), map.get("scene/texture.png"));
        assert_eq!(map.urls().len(), 2);
        assert_eq!(blobs.live_count(), 2);

        let texture_url = map.get("texture.png").unwrap().to_string();
        assert_eq!(blobs.fetch(&texture_url).as_deref(), Some(&b"\x89PNG"[..]));
    }

    #[test]
    fn test_cleanup_revokes_every_url_once() {
        let blobs = Arc::new(BlobStore::new());
        let zip = build_zip(&[("model.glb", b"glTF"), ("texture.png", b"png")]);
        let processor = processor(&blobs);
        let extracted = processor
            .extract_zip_files(&ImportFile::new("pack.zip", zip))
            .unwrap();
        let urls = extracted.resource_map.urls().to_vec();

        assert_eq!(processor.cleanup_resource_map(extracted.resource_map), 2);
        assert_eq!(blobs.live_count(), 0);
        assert!(urls.iter().all(|url| blobs.fetch(url).is_none()));
    }

    #[test]
    fn test_full_path_beats_bare_name() {
        let mut map = ResourceMap::new();
        map.insert("a/wood.png", "blob:1".to_string());
        map.insert("wood.png", "blob:2".to_string());
        map.insert("b/wood.png", "blob:3".to_string());
        assert_eq!(map.get("wood.png"), Some("blob:2"));
        assert_eq!(map.get("b/wood.png"), Some("blob:3"));
        assert_eq!(map.urls().len(), 3);
    }

    #[test]
    fn test_invalid_archive() {
        let blobs = Arc::new(BlobStore::new());
        let err = processor(&blobs)
            .extract_zip_files(&ImportFile::new("broken.zip", b"not a zip".to_vec()))
            .unwrap_err();
        assert_eq!(err.code, ImportErrorCode::ZipExtractError);
        assert_eq!(blobs.live_count(), 0);
    }

    #[test]
    fn test_decode_legacy_names() {
        let blobs = Arc::new(BlobStore::new());
        let processor = processor(&blobs);
        let (gbk, _, _) = encoding_rs::GBK.encode("模型/椅子.glb");
        assert!(std::str::from_utf8(&gbk).is_err());
        assert_eq!(processor.decode_entry_name(&gbk), "模型/椅子.glb");
        assert_eq!(processor.decode_entry_name("模型.glb".as_bytes()), "模型.glb");
    }

    #[test]
    fn test_unknown_encoding_falls_back_to_lossy() {
        let blobs = Arc::new(BlobStore::new());
        let processor = ZipProcessor::new(
            blobs,
            &ImportConfig {
                zip: ZipConfig {
                    legacy_encoding: "no-such-encoding".to_string(),
                },
                ..ImportConfig::default()
            },
        );
        assert_eq!(processor.decode_entry_name(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    fn small_limit_processor(blobs: &Arc<BlobStore>, max_file_size: u64) -> ZipProcessor {
        ZipProcessor::new(
            blobs.clone(),
            &ImportConfig {
                max_file_size,
                ..ImportConfig::default()
            },
        )
    }

    #[test]
    fn test_oversized_entry_rejected_and_released() {
        let blobs = Arc::new(BlobStore::new());
        let big = vec![b'x'; 4096];
        let zip = build_zip(&[("a/small.png", b"\x89PNG"), ("a/big.obj", &big)]);

        let err = small_limit_processor(&blobs, 1024)
            .extract_zip_files(&ImportFile::new("pack.zip", zip))
            .unwrap_err();
        assert_eq!(err.code, ImportErrorCode::FileTooLarge);
        assert_eq!(err.file_name.as_deref(), Some("a/big.obj"));
        assert_eq!(blobs.live_count(), 0);
    }

    #[test]
    fn test_highly_compressed_entry_is_capped() {
        // Compresses to a few KiB but inflates to 8 MiB
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file("bomb.glb", options).unwrap();
        let block = vec![0u8; 64 * 1024];
        for _ in 0..128 {
            writer.write_all(&block).unwrap();
        }
        let zip = writer.finish().unwrap().into_inner();
        assert!(zip.len() < 64 * 1024);

        let blobs = Arc::new(BlobStore::new());
        let err = small_limit_processor(&blobs, 1024)
            .extract_zip_files(&ImportFile::new("bomb.zip", zip))
            .unwrap_err();
        assert_eq!(err.code, ImportErrorCode::FileTooLarge);
        assert_eq!(blobs.live_count(), 0);
    }
}
