//! Append-only execution history.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capabilities::{Outcome, TaskData};

/// Audit record for one execution. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub capability_name: String,
    /// The caller's task as passed in, before any context injection.
    pub task: TaskData,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn from_outcome(task: &TaskData, outcome: &Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            capability_name: outcome.capability_name.clone(),
            task: task.clone(),
            success: outcome.success,
            error: outcome.error_message().map(str::to_string),
            execution_time_seconds: outcome.execution_time_seconds,
            timestamp: Utc::now(),
        }
    }
}

/// Where the executor appends its audit trail.
///
/// Implementations must serialise appends; an executor shared across
/// threads calls `append` concurrently.
pub trait HistoryStore: Send + Sync {
    fn append(&self, record: ExecutionRecord);

    /// Copy of every record, oldest first.
    fn snapshot(&self) -> Vec<ExecutionRecord>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutex-guarded vector of records.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistory {
    fn append(&self, record: ExecutionRecord) {
        self.records.lock().push(record);
    }

    fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }

    fn clear(&self) {
        self.records.lock().clear();
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }
}
