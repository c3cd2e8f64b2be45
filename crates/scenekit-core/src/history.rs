//! History record store with linear undo/redo
//!
//! The store is an append-only log of editor actions with an index cursor:
//! - `current_index == None` means nothing is undoable (the "-1" position)
//! - Writing after an undo truncates everything beyond the cursor
//! - The log is capped at `max_records`; the oldest record is evicted first
//!
//! A separate console log feed is kept alongside the records. The filter only
//! affects what [`HistoryStore::filtered_records`] returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Kind of user action a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Delete,
    Modify,
    Transform,
    Import,
    Export,
    Rename,
    Select,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::Transform => "transform",
            Self::Import => "import",
            Self::Export => "export",
            Self::Rename => "rename",
            Self::Select => "select",
        }
    }
}

/// Kind of scene element an action targeted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Object,
    Model,
    Light,
    Camera,
    Material,
    Geometry,
    Scene,
    Environment,
}

/// A single logged user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub target_name: String,
    pub description: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub is_undone: bool,
}

/// Payload for appending a record; id and timestamp are assigned on insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub action_type: ActionType,
    pub target_type: TargetType,
    #[serde(default)]
    pub target_id: Option<String>,
    pub target_name: String,
    pub description: String,
    #[serde(default)]
    pub old_value: Option<serde_json::Value>,
    #[serde(default)]
    pub new_value: Option<serde_json::Value>,
}

impl NewRecord {
    pub fn new(
        action_type: ActionType,
        target_type: TargetType,
        target_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            target_type,
            target_id: None,
            target_name: target_name.into(),
            description: description.into(),
            old_value: None,
            new_value: None,
        }
    }

    pub fn with_target_id(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    pub fn with_values(
        mut self,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    fn into_record(self) -> HistoryRecord {
        HistoryRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action_type: self.action_type,
            target_type: self.target_type,
            target_id: self.target_id,
            target_name: self.target_name,
            description: self.description,
            old_value: self.old_value,
            new_value: self.new_value,
            is_undone: false,
        }
    }
}

/// Severity of a console log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One line in the console log feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Presentation filter; an empty list matches everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub action_types: Vec<ActionType>,
    #[serde(default)]
    pub target_types: Vec<TargetType>,
    #[serde(default)]
    pub search: String,
}

impl HistoryFilter {
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        if !self.action_types.is_empty() && !self.action_types.contains(&record.action_type) {
            return false;
        }
        if !self.target_types.is_empty() && !self.target_types.contains(&record.target_type) {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        record.target_name.to_lowercase().contains(&needle)
            || record.description.to_lowercase().contains(&needle)
    }
}

/// Capacity limits for the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
}

fn default_max_records() -> usize {
    100
}

fn default_max_logs() -> usize {
    500
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_logs: default_max_logs(),
        }
    }
}

/// Actions accepted by [`HistoryStore::dispatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    AddRecord(NewRecord),
    Undo,
    Redo,
    ClearHistory,
    SetFilter(HistoryFilter),
    AppendLog(LogEntry),
    ClearLogs,
    SetMaxRecords(usize),
}

/// Linear undo/redo log of editor actions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredHistory")]
pub struct HistoryStore {
    records: Vec<HistoryRecord>,
    current_index: Option<usize>,
    max_records: usize,
    filter: HistoryFilter,
    logs: Vec<LogEntry>,
    max_logs: usize,
}

impl HistoryStore {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            records: Vec::new(),
            current_index: None,
            max_records: config.max_records.max(1),
            filter: HistoryFilter::default(),
            logs: Vec::new(),
            max_logs: config.max_logs.max(1),
        }
    }

    /// Apply an action, reducer style
    pub fn dispatch(&mut self, action: HistoryAction) {
        match action {
            HistoryAction::AddRecord(record) => {
                self.add_record(record);
            }
            HistoryAction::Undo => {
                self.undo();
            }
            HistoryAction::Redo => {
                self.redo();
            }
            HistoryAction::ClearHistory => self.clear_history(),
            HistoryAction::SetFilter(filter) => self.set_filter(filter),
            HistoryAction::AppendLog(entry) => self.append_log(entry),
            HistoryAction::ClearLogs => self.logs.clear(),
            HistoryAction::SetMaxRecords(max) => self.set_max_records(max),
        }
    }

    /// Append a record, discarding any redoable records first
    ///
    /// Returns the id assigned to the new record.
    pub fn add_record(&mut self, record: NewRecord) -> String {
        let keep = self.current_index.map(|i| i + 1).unwrap_or(0);
        if keep < self.records.len() {
            debug!(
                dropped = self.records.len() - keep,
                "Truncating redo history"
            );
            self.records.truncate(keep);
        }

        let record = record.into_record();
        let id = record.id.clone();
        self.records.push(record);
        self.current_index = Some(self.records.len() - 1);

        if self.records.len() > self.max_records {
            self.records.remove(0);
            self.current_index = self.current_index.and_then(|i| i.checked_sub(1));
        }
        id
    }

    /// Mark the record at the cursor as undone and step back
    ///
    /// Returns the undone record, or `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<&HistoryRecord> {
        let index = self.current_index?;
        self.records[index].is_undone = true;
        self.current_index = index.checked_sub(1);
        Some(&self.records[index])
    }

    /// Step forward and clear the undone flag at the new cursor
    pub fn redo(&mut self) -> Option<&HistoryRecord> {
        let next = self.current_index.map(|i| i + 1).unwrap_or(0);
        if next >= self.records.len() {
            return None;
        }
        self.records[next].is_undone = false;
        self.current_index = Some(next);
        Some(&self.records[next])
    }

    pub fn clear_history(&mut self) {
        self.records.clear();
        self.current_index = None;
    }

    pub fn set_filter(&mut self, filter: HistoryFilter) {
        self.filter = filter;
    }

    pub fn append_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        if self.logs.len() > self.max_logs {
            let excess = self.logs.len() - self.max_logs;
            self.logs.drain(..excess);
        }
    }

    /// Change the record cap, evicting the oldest records if needed
    pub fn set_max_records(&mut self, max: usize) {
        self.max_records = max.max(1);
        if self.records.len() > self.max_records {
            let excess = self.records.len() - self.max_records;
            self.records.drain(..excess);
            self.current_index = self.current_index.and_then(|i| i.checked_sub(excess));
        }
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn filtered_records(&self) -> Vec<&HistoryRecord> {
        self.records
            .iter()
            .filter(|r| self.filter.matches(r))
            .collect()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&HistoryRecord> {
        self.current_index.map(|i| &self.records[i])
    }

    pub fn can_undo(&self) -> bool {
        self.current_index.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.current_index.map(|i| i + 1).unwrap_or(0) < self.records.len()
    }

    pub fn filter(&self) -> &HistoryFilter {
        &self.filter
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

/// Serialized [`HistoryStore`], checked before it becomes a live store
#[derive(Deserialize)]
struct StoredHistory {
    records: Vec<HistoryRecord>,
    current_index: Option<usize>,
    max_records: usize,
    #[serde(default)]
    filter: HistoryFilter,
    #[serde(default)]
    logs: Vec<LogEntry>,
    max_logs: usize,
}

impl TryFrom<StoredHistory> for HistoryStore {
    type Error = String;

    fn try_from(stored: StoredHistory) -> Result<Self, Self::Error> {
        if stored.max_records == 0 || stored.max_logs == 0 {
            return Err("history limits must be at least 1".to_string());
        }
        if stored.records.len() > stored.max_records {
            return Err(format!(
                "{} records exceed max_records {}",
                stored.records.len(),
                stored.max_records
            ));
        }
        if stored.logs.len() > stored.max_logs {
            return Err(format!(
                "{} log entries exceed max_logs {}",
                stored.logs.len(),
                stored.max_logs
            ));
        }
        if let Some(index) = stored.current_index {
            if index >= stored.records.len() {
                return Err(format!("current_index {index} is out of range"));
            }
        }
        // Everything after the cursor is undone, everything up to it is live
        let live = stored.current_index.map_or(0, |i| i + 1);
        if let Some((i, _)) = stored
            .records
            .iter()
            .enumerate()
            .find(|(i, r)| r.is_undone != (*i >= live))
        {
            return Err(format!("record {i} has an undo flag that contradicts current_index"));
        }

        Ok(Self {
            records: stored.records,
            current_index: stored.current_index,
            max_records: stored.max_records,
            filter: stored.filter,
            logs: stored.logs,
            max_logs: stored.max_logs,
        })
    }
}
