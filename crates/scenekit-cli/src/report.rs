//! Scene registration and the import summary

use scenekit_core::{HistoryRecorder, LogLevel, TransformUpdate};
use scenekit_import::{ImportError, ImportErrorCode, ImportResult, ModelFormat};
use scenekit_scene::Scene3DService;
use serde::Serialize;
use serde_json::json;
use std::fmt::Write as _;
use tracing::{info, warn};

/// One model registered in the scene
#[derive(Debug, Clone, Serialize)]
pub struct ImportedObject {
    pub id: String,
    pub file_name: String,
    pub file_type: ModelFormat,
    pub file_size: u64,
    pub load_time_ms: f64,
    pub position: [f64; 3],
    pub nodes: usize,
    pub meshes: usize,
    pub history_id: String,
}

/// One input that did not make it into the scene
#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub source: String,
    pub code: ImportErrorCode,
    pub message: String,
}

impl ImportFailure {
    pub fn from_error(source: impl Into<String>, err: &ImportError) -> Self {
        Self {
            source: err.file_name.clone().unwrap_or_else(|| source.into()),
            code: err.code,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub objects: Vec<ImportedObject>,
    pub failures: Vec<ImportFailure>,
}

impl ImportSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fixed-width table, one row per object, failures listed below
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<24} {:<28} {:<5} {:>10} {:>9} {:>6}  POSITION",
            "ID", "FILE", "TYPE", "SIZE", "TIME(ms)", "MESHES"
        );
        for object in &self.objects {
            let [x, y, z] = object.position;
            let _ = writeln!(
                out,
                "{:<24} {:<28} {:<5} {:>10} {:>9.1} {:>6}  ({x:.3}, {y:.3}, {z:.3})",
                object.id,
                object.file_name,
                object.file_type.as_str(),
                object.file_size,
                object.load_time_ms,
                object.meshes,
            );
        }
        if !self.failures.is_empty() {
            let _ = writeln!(out);
            for failure in &self.failures {
                let _ = writeln!(out, "FAILED {} [{}] {}", failure.source, failure.code, failure.message);
            }
        }
        let _ = write!(
            out,
            "{} imported, {} failed",
            self.objects.len(),
            self.failures.len()
        );
        out
    }
}

/// Derive a scene id from a file name that is not yet taken
///
/// The extension is dropped and anything outside `[A-Za-z0-9_-]` becomes `_`;
/// collisions get a `-2`, `-3`, ... suffix.
pub fn unique_object_id(scene: &Scene3DService, file_name: &str) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file_name);
    let mut base: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if base.is_empty() {
        base.push_str("model");
    }

    let taken = |id: &str| scene.get_object(id).is_some();
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|id| !taken(id))
        .unwrap_or(base)
}

/// Add each result to the scene at its computed position and record it
pub fn register_results(
    scene: &mut Scene3DService,
    recorder: &mut HistoryRecorder<'_>,
    results: Vec<ImportResult>,
    summary: &mut ImportSummary,
) {
    for result in results {
        let id = unique_object_id(scene, &result.file_name);
        let nodes = result.object.node_count();
        let meshes = result.object.mesh_count();

        let added = scene.add_object(&id, result.object, None);
        if !added.success {
            recorder.log(LogLevel::Error, added.message.clone());
            summary.failures.push(ImportFailure {
                source: result.file_name,
                code: ImportErrorCode::ModelProcessError,
                message: added.message,
            });
            continue;
        }

        let position = result.position.unwrap_or_default();
        let moved = scene.update_object_transform(&id, &TransformUpdate::position(position));
        if !moved.success {
            warn!(id = %id, reason = %moved.message, "Could not place object");
        }

        let history_id = recorder.record_import(
            &id,
            &result.file_name,
            json!({
                "fileType": result.file_type,
                "fileSize": result.file_size,
                "loadTimeMs": result.load_time_ms,
                "position": [position.x, position.y, position.z],
            }),
        );
        info!(id = %id, file = %result.file_name, "Registered object");

        summary.objects.push(ImportedObject {
            id,
            file_name: result.file_name,
            file_type: result.file_type,
            file_size: result.file_size,
            load_time_ms: result.load_time_ms,
            position: [position.x, position.y, position.z],
            nodes,
            meshes,
            history_id,
        });
    }
}
