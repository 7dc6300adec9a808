//! BatchActor message types.
//!
//! Commands for mutating the staged-upload collection with single-writer
//! authority, plus the read-model snapshots served to the UI.

use std::collections::HashMap;

use ractor::RpcReplyPort;
use serde_json::{Map, Value};

use shared_types::{FieldState, SubmissionReport};

use crate::file::StagedFile;
use crate::init::SessionPermissions;

use super::state::DraftRecord;

#[derive(Debug)]
pub enum BatchMsg {
    /// Stage one batch of files; waits on shared initialization.
    AddFiles {
        files: Vec<StagedFile>,
        reply: RpcReplyPort<Result<(), BatchError>>,
    },

    /// Remove one staged record. Out-of-range indices are ignored.
    RemoveFile { index: usize },

    /// Flush-then-switch: persist the outgoing active record's live field
    /// state and move the cursor, in one transition.
    SetActiveIndex {
        index: usize,
        flushed: Option<FieldState>,
    },

    /// Validation feedback intake from the mounted editor.
    SetErrorCount { index: usize, count: usize },

    /// Shallow-merge a field-state patch into one record.
    UpdateForm {
        index: usize,
        error_count: usize,
        patch: FieldState,
    },

    /// Apply the same values to every record carrying the field path.
    BulkUpdateForm {
        values: HashMap<String, Value>,
        reply: RpcReplyPort<Result<(), BatchError>>,
    },

    /// Run the batch submission pass over a snapshot of the collection.
    SaveAllDocs {
        overrides: Option<Map<String, Value>>,
        flushed: Option<FieldState>,
        reply: RpcReplyPort<Result<SubmissionReport, BatchError>>,
    },

    /// Internal: the spawned submission task delivering its result.
    SubmissionFinished(SubmissionOutcome),

    GetSnapshot {
        reply: RpcReplyPort<BatchSnapshot>,
    },

    GetPermissions {
        reply: RpcReplyPort<Result<SessionPermissions, BatchError>>,
    },
}

/// Result of one submission pass: the records to retain plus the aggregate
/// report handed back to the caller.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub remaining: Vec<DraftRecord>,
    pub report: SubmissionReport,
}

/// Read-only projection of the collection for the surrounding UI.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub forms: Vec<FormSnapshot>,
    pub active_index: usize,
    pub total_error_count: usize,
    pub has_submitted: bool,
    pub is_submitting: bool,
}

#[derive(Debug, Clone)]
pub struct FormSnapshot {
    pub draft_id: String,
    pub file_name: String,
    pub file_key: String,
    pub content_type: String,
    pub size: usize,
    pub field_state: FieldState,
    pub error_count: usize,
}

impl FormSnapshot {
    pub fn from_record(record: &DraftRecord) -> Self {
        Self {
            draft_id: record.draft_id.clone(),
            file_name: record.file.name().to_string(),
            file_key: record.file.key().to_string(),
            content_type: record.file.content_type().to_string(),
            size: record.file.size(),
            field_state: record.field_state.clone(),
            error_count: record.error_count,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum BatchError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("A batch submission is already in flight")]
    SubmissionInFlight,

    #[error("Record index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },

    #[error("Form state service error: {0}")]
    FormState(String),

    #[error("Document API error: {0}")]
    Api(String),

    #[error("Batch actor unavailable: {0}")]
    Actor(String),
}
