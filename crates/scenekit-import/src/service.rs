//! Import orchestration
//!
//! [`FileImportService`] runs the full pipeline for plain files, ZIP
//! archives and URLs. Files are imported one at a time. Every blob URL the
//! service creates is revoked before the corresponding call returns, on both
//! the success and failure paths.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use glam::DVec3;
use scenekit_core::ModelNode;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::archive::{ResourceMap, ZipProcessor};
use crate::blob::BlobStore;
use crate::config::{BatchPolicy, ImportConfig};
use crate::error::{ImportError, ImportErrorCode};
use crate::file::{ImportFile, ModelFormat};
use crate::loaders::{
    DecodeError, ErrorCallback, LoadCallback, LoaderManager, ProgressCallback, RawAsset,
};
use crate::processor::ModelProcessor;
use crate::resolver::UrlResolver;
use crate::validator::FileValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPhase {
    Idle,
    Validating,
    Extracting,
    Loading,
    Processing,
    Completed,
    Failed,
}

/// One successfully imported model
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub object: ModelNode,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: ModelFormat,
    pub load_time_ms: f64,
    pub position: Option<DVec3>,
}

/// Everything a batch produced, successes and failures alike
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<ImportResult>,
    pub failures: Vec<ImportError>,
}

impl BatchOutcome {
    /// Collapse into the `process_files` result for a policy
    fn into_result(mut self, policy: BatchPolicy) -> Result<Vec<ImportResult>, ImportError> {
        if self.failures.is_empty() {
            return Ok(self.results);
        }
        match policy {
            BatchPolicy::Continue if !self.results.is_empty() => Ok(self.results),
            _ => Err(self.failures.swap_remove(0)),
        }
    }
}

/// Blob URL revoked when dropped
struct ObjectUrl {
    blobs: Arc<BlobStore>,
    url: String,
}

impl ObjectUrl {
    fn new(blobs: Arc<BlobStore>, data: Arc<[u8]>) -> Self {
        let url = blobs.create_object_url(data);
        Self { blobs, url }
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        self.blobs.revoke_object_url(&self.url);
    }
}

/// Resource map released through its processor when dropped
struct ResourceGuard<'a> {
    zip: &'a ZipProcessor,
    map: Option<ResourceMap>,
}

impl ResourceGuard<'_> {
    fn map(&self) -> Option<&ResourceMap> {
        self.map.as_ref()
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        if let Some(map) = self.map.take() {
            self.zip.cleanup_resource_map(map);
        }
    }
}

type LoadOutcome = Result<RawAsset, DecodeError>;

/// Callback pair that completes a single oneshot, whichever fires first
fn completion() -> (LoadCallback, ErrorCallback, oneshot::Receiver<LoadOutcome>) {
    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let deliver = move |slot: &Mutex<Option<oneshot::Sender<LoadOutcome>>>, outcome: LoadOutcome| {
        if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = tx.send(outcome);
        }
    };

    let load_slot = slot.clone();
    let on_load: LoadCallback = Box::new(move |asset| deliver(&load_slot, Ok(asset)));
    let on_error: ErrorCallback = Box::new(move |err| deliver(&slot, Err(err)));
    (on_load, on_error, rx)
}

pub struct FileImportService {
    config: ImportConfig,
    blobs: Arc<BlobStore>,
    validator: FileValidator,
    zip: ZipProcessor,
    loaders: LoaderManager,
    processor: ModelProcessor,
    client: reqwest::Client,
    phase: watch::Sender<ImportPhase>,
}

impl FileImportService {
    pub fn new(config: ImportConfig) -> Result<Self, ImportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| {
                ImportError::new(ImportErrorCode::UrlImportError, "Failed to create HTTP client")
                    .with_cause(e)
            })?;

        let blobs = Arc::new(BlobStore::new());
        let (phase, _) = watch::channel(ImportPhase::Idle);
        Ok(Self {
            validator: FileValidator::new(&config),
            zip: ZipProcessor::new(blobs.clone(), &config),
            loaders: LoaderManager::new(blobs.clone()),
            processor: ModelProcessor::new(config.placement.clone()),
            blobs,
            client,
            phase,
            config,
        })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    /// Access the loader registry, e.g. to replace a decoder
    pub fn loaders_mut(&mut self) -> &mut LoaderManager {
        &mut self.loaders
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ImportPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> ImportPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: ImportPhase) {
        self.phase.send_replace(phase);
    }

    /// Import a list of files, expanding ZIP archives
    ///
    /// Under [`BatchPolicy::Abort`] the first failure fails the call. Under
    /// [`BatchPolicy::Continue`] failures are skipped and the call only fails
    /// when nothing was imported.
    pub async fn process_files(&self, files: &[ImportFile]) -> Result<Vec<ImportResult>, ImportError> {
        self.process_batch(files)
            .await
            .into_result(self.config.batch_policy)
    }

    /// Like [`FileImportService::process_files`] but reports every failure
    pub async fn process_batch(&self, files: &[ImportFile]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for file in files {
            let keep_going = if file.is_zip() {
                self.zip_into(file, &mut outcome).await
            } else {
                match self.load_single_file(file, None).await {
                    Ok(result) => {
                        outcome.results.push(result);
                        true
                    }
                    Err(e) => self.record_failure(&mut outcome, e),
                }
            };
            if !keep_going {
                break;
            }
        }
        info!(
            imported = outcome.results.len(),
            failed = outcome.failures.len(),
            "Batch finished"
        );
        outcome
    }

    /// Extract an archive and import every model inside it
    pub async fn process_zip_file(&self, file: &ImportFile) -> Result<Vec<ImportResult>, ImportError> {
        let mut outcome = BatchOutcome::default();
        self.zip_into(file, &mut outcome).await;
        outcome.into_result(self.config.batch_policy)
    }

    /// Returns whether the batch should keep going
    async fn zip_into(&self, file: &ImportFile, outcome: &mut BatchOutcome) -> bool {
        self.set_phase(ImportPhase::Extracting);
        let extracted = match self.zip.extract_zip_files(file) {
            Ok(extracted) => extracted,
            Err(e) => return self.record_failure(outcome, e),
        };
        let guard = ResourceGuard {
            zip: &self.zip,
            map: Some(extracted.resource_map),
        };

        if extracted.files.is_empty() {
            drop(guard);
            let err = ImportError::new(
                ImportErrorCode::NoSupportedFiles,
                format!("No supported 3D files found in {}", file.name),
            )
            .with_file(&file.name);
            return self.record_failure(outcome, err);
        }

        for entry in &extracted.files {
            match self.load_single_file(entry, guard.map()).await {
                Ok(result) => outcome.results.push(result),
                Err(e) => {
                    if !self.record_failure(outcome, e) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn record_failure(&self, outcome: &mut BatchOutcome, err: ImportError) -> bool {
        warn!(
            file = err.file_name.as_deref().unwrap_or("-"),
            code = %err.code,
            error = %err,
            "Import failed"
        );
        self.set_phase(ImportPhase::Failed);
        outcome.failures.push(err);
        self.config.batch_policy == BatchPolicy::Continue
    }

    /// Validate, decode and process one file
    ///
    /// With a resource map, URIs inside the model resolve against the
    /// archive the file came from.
    pub async fn load_single_file(
        &self,
        file: &ImportFile,
        resource_map: Option<&ResourceMap>,
    ) -> Result<ImportResult, ImportError> {
        let started = Instant::now();
        let result = self.run_single_file(file, resource_map, started).await;
        match &result {
            Ok(r) => {
                self.set_phase(ImportPhase::Completed);
                info!(
                    file = %r.file_name,
                    format = %r.file_type,
                    size = r.file_size,
                    ms = r.load_time_ms,
                    "Imported model"
                );
            }
            Err(_) => self.set_phase(ImportPhase::Failed),
        }
        result
    }

    async fn run_single_file(
        &self,
        file: &ImportFile,
        resource_map: Option<&ResourceMap>,
        started: Instant,
    ) -> Result<ImportResult, ImportError> {
        self.set_phase(ImportPhase::Validating);
        self.validator.validate_file(file)?;
        let format = self
            .validator
            .get_file_type(&file.name)
            .ok_or_else(|| ImportError::unknown_type(&file.name))?;

        self.set_phase(ImportPhase::Loading);
        let raw = {
            let url = ObjectUrl::new(self.blobs.clone(), file.data.clone());
            let resolver = resource_map.map(UrlResolver::from_resource_map);
            let (on_load, on_error, rx) = completion();
            let name = file.name.clone();
            let on_progress: ProgressCallback = Box::new(move |p| {
                trace!(file = %name, loaded = p.loaded, total = p.total, "Load progress");
            });

            debug!(file = %file.name, format = %format, url = %url.url, "Loading");
            self.loaders.load_file(
                format.as_str(),
                &url.url,
                resolver,
                on_load,
                Some(on_progress),
                Some(on_error),
            );
            rx.await
                .unwrap_or_else(|_| Err(DecodeError::Task("decoder stopped without a result".into())))
        };
        let raw = raw.map_err(|e| {
            ImportError::new(
                ImportErrorCode::load_error(format),
                format!("Failed to load {}: {e}", file.name),
            )
            .with_file(&file.name)
            .with_cause(e)
        })?;

        self.set_phase(ImportPhase::Processing);
        let object = self
            .processor
            .extract_object(raw, format)
            .map_err(|e| e.with_file(&file.name))?;
        let processed = self
            .processor
            .process_model(object)
            .map_err(|e| e.with_file(&file.name))?;

        let mut object = processed.object;
        if object.name.is_empty() {
            object.name = file.stem().to_string();
        }
        Ok(ImportResult {
            object,
            file_name: file.name.clone(),
            file_size: file.size(),
            file_type: format,
            load_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            position: Some(processed.position),
        })
    }

    /// Download a model and import it like a local file
    pub async fn import_from_url(&self, url: &str) -> Result<ImportResult, ImportError> {
        let file_name = file_name_from_url(url);
        let url_error = |message: String| {
            ImportError::new(ImportErrorCode::UrlImportError, message).with_file(&file_name)
        };

        info!(url = %url, "Fetching model");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| url_error(format!("Failed to fetch {url}")).with_cause(e))?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Model fetch returned non-success status");
            return Err(url_error(format!("Failed to fetch {url}: HTTP {status}")));
        }
        let data = response
            .bytes()
            .await
            .map_err(|e| url_error(format!("Failed to read body of {url}")).with_cause(e))?;

        let file = ImportFile::new(file_name.clone(), &data[..]);
        self.load_single_file(&file, None).await
    }
}

/// Last non-empty path segment of a URL, `model` when there is none
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|url| {
            url.path_segments()?
                .rev()
                .find(|segment| !segment.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "model".to_string())
}
