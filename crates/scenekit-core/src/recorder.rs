//! Helpers that turn editor actions into history records
//!
//! Every helper appends one record and mirrors a line into the console log
//! feed, so the history panel and the console stay in step.

use serde_json::json;

use crate::history::{ActionType, HistoryStore, LogEntry, LogLevel, NewRecord, TargetType};
use crate::node::Transform;

/// Records editor actions into a borrowed [`HistoryStore`]
pub struct HistoryRecorder<'a> {
    store: &'a mut HistoryStore,
}

impl<'a> HistoryRecorder<'a> {
    pub fn new(store: &'a mut HistoryStore) -> Self {
        Self { store }
    }

    /// Append a prepared record and log its description
    pub fn record(&mut self, record: NewRecord) -> String {
        let line = format!("[{}] {}", record.action_type.as_str(), record.description);
        let id = self.store.add_record(record);
        self.store.append_log(LogEntry::new(LogLevel::Info, line));
        id
    }

    pub fn record_create(&mut self, target_type: TargetType, id: &str, name: &str) -> String {
        self.record(
            NewRecord::new(ActionType::Create, target_type, name, format!("Created {name}"))
                .with_target_id(id),
        )
    }

    pub fn record_delete(&mut self, target_type: TargetType, id: &str, name: &str) -> String {
        self.record(
            NewRecord::new(ActionType::Delete, target_type, name, format!("Deleted {name}"))
                .with_target_id(id),
        )
    }

    pub fn record_rename(&mut self, target_type: TargetType, id: &str, old: &str, new: &str) -> String {
        self.record(
            NewRecord::new(
                ActionType::Rename,
                target_type,
                new,
                format!("Renamed {old} to {new}"),
            )
            .with_target_id(id)
            .with_values(Some(json!(old)), Some(json!(new))),
        )
    }

    pub fn record_transform(
        &mut self,
        id: &str,
        name: &str,
        old: &Transform,
        new: &Transform,
    ) -> String {
        self.record(
            NewRecord::new(
                ActionType::Transform,
                TargetType::Object,
                name,
                format!("Transformed {name}"),
            )
            .with_target_id(id)
            .with_values(serde_json::to_value(old).ok(), serde_json::to_value(new).ok()),
        )
    }

    /// Record a single property change on any scene element
    pub fn record_modify(
        &mut self,
        target_type: TargetType,
        id: &str,
        name: &str,
        property: &str,
        old: serde_json::Value,
        new: serde_json::Value,
    ) -> String {
        self.record(
            NewRecord::new(
                ActionType::Modify,
                target_type,
                name,
                format!("Changed {property} of {name}"),
            )
            .with_target_id(id)
            .with_values(Some(old), Some(new)),
        )
    }

    /// Record a completed model import; `details` lands in `new_value`
    pub fn record_import(&mut self, id: &str, file_name: &str, details: serde_json::Value) -> String {
        self.record(
            NewRecord::new(
                ActionType::Import,
                TargetType::Model,
                file_name,
                format!("Imported {file_name}"),
            )
            .with_target_id(id)
            .with_values(None, Some(details)),
        )
    }

    /// Append a console line without creating a record
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.store.append_log(LogEntry::new(level, message));
    }
}
