//! Collection state and the pure reducer over it.
//!
//! Every mutation of the staged-upload collection is expressed as a
//! [`CollectionAction`] applied through [`CollectionState::apply`]; the
//! owning actor is the only dispatcher. The total error count and the
//! active-index bound are re-established on every transition rather than
//! maintained incrementally.

use chrono::{DateTime, Utc};
use serde_json::json;

use shared_types::{FieldState, FieldValue};

use crate::file::StagedFile;

/// One staged, not-yet-submitted upload with its own editable field state.
#[derive(Debug, Clone)]
pub struct DraftRecord {
    pub draft_id: String,
    pub file: StagedFile,
    pub field_state: FieldState,
    pub error_count: usize,
    pub created_at: DateTime<Utc>,
}

impl DraftRecord {
    /// Seed a record from the shared template: deep copy, then overwrite the
    /// `file` path with a valid entry describing the staged file.
    pub fn seeded(file: StagedFile, template: &FieldState) -> Self {
        let mut field_state = template.clone();
        field_state.insert(
            "file".to_string(),
            FieldValue::valid(json!({
                "name": file.name(),
                "mimeType": file.content_type(),
                "filesize": file.size(),
            })),
        );

        Self {
            draft_id: ulid::Ulid::new().to_string(),
            file,
            field_state,
            error_count: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectionState {
    /// Ordered staged records; newly added batches are prepended
    pub records: Vec<DraftRecord>,
    /// Index of the record mounted in the single-record editor; 0 when empty
    pub active_index: usize,
    /// Always equal to the sum of per-record error counts
    pub total_error_count: usize,
}

#[derive(Debug)]
pub enum CollectionAction {
    AddForms {
        files: Vec<StagedFile>,
        template: FieldState,
    },
    RemoveForm {
        index: usize,
    },
    UpdateErrorCount {
        index: usize,
        count: usize,
    },
    UpdateForm {
        index: usize,
        error_count: usize,
        patch: FieldState,
    },
    Replace {
        records: Option<Vec<DraftRecord>>,
        active_index: Option<usize>,
    },
    SetActiveIndex {
        index: usize,
    },
}

impl CollectionState {
    /// Pure transition function. Out-of-range indices are bounds-guarded
    /// no-ops, never errors.
    pub fn apply(mut self, action: CollectionAction) -> Self {
        match action {
            CollectionAction::AddForms { files, template } => {
                let mut records: Vec<DraftRecord> = files
                    .into_iter()
                    .map(|file| DraftRecord::seeded(file, &template))
                    .collect();
                records.append(&mut self.records);
                self.records = records;
                self.active_index = 0;
            }

            CollectionAction::RemoveForm { index } => {
                if index < self.records.len() {
                    self.records.remove(index);
                    if index < self.active_index {
                        self.active_index -= 1;
                    }
                    // index == active falls through to the clamp below:
                    // min(active, len - 1), or 0 once empty.
                }
            }

            CollectionAction::UpdateErrorCount { index, count } => {
                if let Some(record) = self.records.get_mut(index) {
                    record.error_count = count;
                }
            }

            CollectionAction::UpdateForm {
                index,
                error_count,
                patch,
            } => {
                if let Some(record) = self.records.get_mut(index) {
                    record.field_state.extend(patch);
                    record.error_count = error_count;
                }
            }

            CollectionAction::Replace {
                records,
                active_index,
            } => {
                if let Some(records) = records {
                    self.records = records;
                }
                if let Some(active_index) = active_index {
                    self.active_index = active_index;
                }
            }

            CollectionAction::SetActiveIndex { index } => {
                self.active_index = index;
            }
        }

        self.normalize();
        self
    }

    /// Re-establish the invariants after any transition: the active index
    /// stays inside the collection and the total is the recomputed sum.
    fn normalize(&mut self) {
        if self.records.is_empty() {
            self.active_index = 0;
        } else if self.active_index >= self.records.len() {
            self.active_index = self.records.len() - 1;
        }
        self.total_error_count = self.records.iter().map(|r| r.error_count).sum();
    }

    pub fn live_file_keys(&self) -> std::collections::HashSet<String> {
        self.records
            .iter()
            .map(|record| record.file.key().to_string())
            .collect()
    }
}
