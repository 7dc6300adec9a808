//! BatchSession - the handle the surrounding UI consumes.
//!
//! Spawns the batch and thumbnailer actors and wraps their message surface
//! in plain methods. The session also owns the [`FormDataSource`] seam: the
//! live field-state of the record currently mounted in the editor is pulled
//! from it at switch and submit time and carried inside a single actor
//! message, so flush-then-switch is atomic from the caller's perspective.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ractor::{Actor, ActorRef};
use serde_json::{Map, Value};

use shared_types::{FieldState, SubmissionReport};

use crate::actors::batch::{BatchActor, BatchArguments, BatchError, BatchMsg, BatchSnapshot};
use crate::actors::thumbnailer::{ThumbnailerActor, ThumbnailerArguments, ThumbnailerMsg};
use crate::api::DocumentApi;
use crate::config::StagerConfig;
use crate::file::StagedFile;
use crate::init::SessionPermissions;
use crate::services::{FormStateService, NotificationSink, ThumbnailRenderer};

/// Live snapshot provider for the mounted single-record editor.
pub trait FormDataSource: Send + Sync {
    fn current_field_state(&self) -> FieldState;
}

/// External collaborators a session is wired with.
pub struct SessionServices {
    pub api: Arc<dyn DocumentApi>,
    pub form_state: Arc<dyn FormStateService>,
    pub notifier: Arc<dyn NotificationSink>,
    pub renderer: Arc<dyn ThumbnailRenderer>,
}

pub struct BatchSession {
    batch: ActorRef<BatchMsg>,
    thumbnailer: ActorRef<ThumbnailerMsg>,
    form_data: Mutex<Option<Arc<dyn FormDataSource>>>,
}

impl BatchSession {
    pub async fn spawn(
        config: &StagerConfig,
        collection_slug: impl Into<String>,
        services: SessionServices,
    ) -> Result<Self, BatchError> {
        let (thumbnailer, _thumbnailer_handle) = Actor::spawn(
            None,
            ThumbnailerActor,
            ThumbnailerArguments {
                renderer: services.renderer,
                pause: config.thumbnail_pause,
            },
        )
        .await
        .map_err(|e| BatchError::Actor(e.to_string()))?;

        let (batch, _batch_handle) = Actor::spawn(
            None,
            BatchActor,
            BatchArguments {
                collection_slug: collection_slug.into(),
                api: services.api,
                form_state: services.form_state,
                notifier: services.notifier,
                thumbnailer: thumbnailer.clone(),
            },
        )
        .await
        .map_err(|e| BatchError::Actor(e.to_string()))?;

        Ok(Self {
            batch,
            thumbnailer,
            form_data: Mutex::new(None),
        })
    }

    /// Register the live-editor snapshot provider (the field renderer's
    /// current form data).
    pub fn set_form_data_source(&self, source: Arc<dyn FormDataSource>) {
        if let Ok(mut guard) = self.form_data.lock() {
            *guard = Some(source);
        }
    }

    fn flushed(&self) -> Option<FieldState> {
        self.form_data
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|source| source.current_field_state()))
    }

    /// Stage a batch of files. Blocks on shared initialization; a failed
    /// template fetch fails the add.
    pub async fn add_files(&self, files: Vec<StagedFile>) -> Result<(), BatchError> {
        ractor::call!(self.batch, |reply| BatchMsg::AddFiles { files, reply })
            .map_err(|e| BatchError::Actor(e.to_string()))?
    }

    /// Remove one staged record. Out-of-range indices are ignored.
    pub fn remove_file(&self, index: usize) {
        if let Err(err) = self.batch.send_message(BatchMsg::RemoveFile { index }) {
            tracing::warn!(error = %err, "failed to dispatch removal");
        }
    }

    /// Flush the outgoing active record's live edits, then move the cursor.
    pub fn set_active_index(&self, index: usize) {
        let flushed = self.flushed();
        if let Err(err) = self
            .batch
            .send_message(BatchMsg::SetActiveIndex { index, flushed })
        {
            tracing::warn!(error = %err, "failed to dispatch selection change");
        }
    }

    /// Per-record validation feedback from the mounted editor.
    pub fn set_error_count(&self, index: usize, count: usize) {
        if let Err(err) = self
            .batch
            .send_message(BatchMsg::SetErrorCount { index, count })
        {
            tracing::warn!(error = %err, "failed to dispatch error count");
        }
    }

    /// Shallow-merge a field-state patch into one record.
    pub fn update_form(&self, index: usize, error_count: usize, patch: FieldState) {
        if let Err(err) = self.batch.send_message(BatchMsg::UpdateForm {
            index,
            error_count,
            patch,
        }) {
            tracing::warn!(error = %err, "failed to dispatch form update");
        }
    }

    /// Apply the same field values to every record that has the path.
    pub async fn bulk_update_form(
        &self,
        values: HashMap<String, Value>,
    ) -> Result<(), BatchError> {
        ractor::call!(self.batch, |reply| BatchMsg::BulkUpdateForm {
            values,
            reply
        })
        .map_err(|e| BatchError::Actor(e.to_string()))?
    }

    /// Submit every staged record sequentially; resolves when the whole pass
    /// has finished. Overlapping calls fail with `SubmissionInFlight`.
    pub async fn save_all_docs(
        &self,
        overrides: Option<Map<String, Value>>,
    ) -> Result<SubmissionReport, BatchError> {
        let flushed = self.flushed();
        ractor::call!(self.batch, |reply| BatchMsg::SaveAllDocs {
            overrides,
            flushed,
            reply
        })
        .map_err(|e| BatchError::Actor(e.to_string()))?
    }

    /// Read-only projection of the collection.
    pub async fn snapshot(&self) -> Result<BatchSnapshot, BatchError> {
        ractor::call!(self.batch, |reply| BatchMsg::GetSnapshot { reply })
            .map_err(|e| BatchError::Actor(e.to_string()))
    }

    /// Cached session permissions (fetched on first use).
    pub async fn permissions(&self) -> Result<SessionPermissions, BatchError> {
        ractor::call!(self.batch, |reply| BatchMsg::GetPermissions { reply })
            .map_err(|e| BatchError::Actor(e.to_string()))?
    }

    /// Preview data URLs aligned with the current record positions; `None`
    /// where no preview has been rendered (yet).
    pub async fn thumbnail_urls(&self) -> Result<Vec<Option<String>>, BatchError> {
        let snapshot = self.snapshot().await?;
        let table = ractor::call!(self.thumbnailer, |reply| ThumbnailerMsg::GetTable { reply })
            .map_err(|e| BatchError::Actor(e.to_string()))?;

        Ok(snapshot
            .forms
            .iter()
            .map(|form| table.get(&form.file_key).map(|t| t.data_url.clone()))
            .collect())
    }

    pub fn shutdown(&self) {
        self.batch.stop(None);
        self.thumbnailer.stop(None);
    }
}
