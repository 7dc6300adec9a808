//! BatchActor - single mutation authority for the staged upload collection.
//!
//! Owns the [`CollectionState`] and applies every transition through the
//! pure collection reducer; all other components read snapshots. Submission
//! passes run in a spawned task over a copy of the records so the actor
//! keeps serving reads and edits mid-pass.

mod messages;
mod state;
mod submit;

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use serde_json::{Map, Value};

use shared_types::{FieldState, Operation, SubmissionReport};

pub use messages::{BatchError, BatchMsg, BatchSnapshot, FormSnapshot, SubmissionOutcome};
pub use state::{CollectionAction, CollectionState, DraftRecord};

use crate::api::DocumentApi;
use crate::file::StagedFile;
use crate::init::SharedInit;
use crate::services::{FormStateService, NotificationSink};

use super::thumbnailer::ThumbnailerMsg;

#[derive(Debug, Default)]
pub struct BatchActor;

pub struct BatchArguments {
    pub collection_slug: String,
    pub api: Arc<dyn DocumentApi>,
    pub form_state: Arc<dyn FormStateService>,
    pub notifier: Arc<dyn NotificationSink>,
    pub thumbnailer: ActorRef<ThumbnailerMsg>,
}

pub struct BatchState {
    collection_slug: String,
    api: Arc<dyn DocumentApi>,
    form_state: Arc<dyn FormStateService>,
    notifier: Arc<dyn NotificationSink>,
    thumbnailer: ActorRef<ThumbnailerMsg>,
    init: SharedInit,
    collection: CollectionState,
    has_submitted: bool,
    is_submitting: bool,
}

#[async_trait]
impl Actor for BatchActor {
    type Msg = BatchMsg;
    type State = BatchState;
    type Arguments = BatchArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            collection = %args.collection_slug,
            "BatchActor starting"
        );

        Ok(BatchState {
            collection_slug: args.collection_slug,
            api: args.api,
            form_state: args.form_state,
            notifier: args.notifier,
            thumbnailer: args.thumbnailer,
            init: SharedInit::new(),
            collection: CollectionState::default(),
            has_submitted: false,
            is_submitting: false,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BatchMsg::AddFiles { files, reply } => {
                let result = self.handle_add_files(state, files).await;
                let _ = reply.send(result);
            }
            BatchMsg::RemoveFile { index } => {
                self.handle_remove_file(state, index);
            }
            BatchMsg::SetActiveIndex { index, flushed } => {
                self.handle_set_active_index(state, index, flushed);
            }
            BatchMsg::SetErrorCount { index, count } => {
                state.collection = mem::take(&mut state.collection)
                    .apply(CollectionAction::UpdateErrorCount { index, count });
            }
            BatchMsg::UpdateForm {
                index,
                error_count,
                patch,
            } => {
                state.collection = mem::take(&mut state.collection).apply(
                    CollectionAction::UpdateForm {
                        index,
                        error_count,
                        patch,
                    },
                );
            }
            BatchMsg::BulkUpdateForm { values, reply } => {
                let result = self.handle_bulk_update(state, values).await;
                let _ = reply.send(result);
            }
            BatchMsg::SaveAllDocs {
                overrides,
                flushed,
                reply,
            } => {
                self.handle_save_all_docs(&myself, state, overrides, flushed, reply);
            }
            BatchMsg::SubmissionFinished(outcome) => {
                self.handle_submission_finished(state, outcome);
            }
            BatchMsg::GetSnapshot { reply } => {
                let _ = reply.send(Self::snapshot(state));
            }
            BatchMsg::GetPermissions { reply } => {
                let result = state
                    .init
                    .permissions(state.api.as_ref(), &state.collection_slug)
                    .await
                    .map(|permissions| *permissions)
                    .map_err(|e| BatchError::Initialization(e.to_string()));
                let _ = reply.send(result);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(actor_id = %myself.get_id(), "BatchActor stopped");
        Ok(())
    }
}

impl BatchActor {
    /// Stage a batch of files. Waits for the shared template; a failed
    /// initialization fails the whole add instead of seeding blind.
    async fn handle_add_files(
        &self,
        state: &mut BatchState,
        files: Vec<StagedFile>,
    ) -> Result<(), BatchError> {
        if files.is_empty() {
            return Ok(());
        }

        let template = state
            .init
            .template(state.form_state.as_ref(), &state.collection_slug)
            .await
            .map_err(|e| BatchError::Initialization(e.to_string()))?
            .clone();

        let images: Vec<StagedFile> = files.iter().filter(|f| f.is_image()).cloned().collect();

        tracing::info!(
            count = files.len(),
            collection = %state.collection_slug,
            "staging uploaded files"
        );

        state.collection = mem::take(&mut state.collection)
            .apply(CollectionAction::AddForms { files, template });

        if !images.is_empty() {
            if let Err(err) = state
                .thumbnailer
                .send_message(ThumbnailerMsg::Enqueue { files: images })
            {
                tracing::warn!(error = %err, "failed to enqueue preview renders");
            }
        }

        Ok(())
    }

    fn handle_remove_file(&self, state: &mut BatchState, index: usize) {
        if index >= state.collection.records.len() {
            return;
        }

        state.collection =
            mem::take(&mut state.collection).apply(CollectionAction::RemoveForm { index });
        self.prune_thumbnails(state);
    }

    /// Flush-then-switch in a single transition: the outgoing active
    /// record's live field state lands in the collection before the cursor
    /// moves.
    fn handle_set_active_index(
        &self,
        state: &mut BatchState,
        index: usize,
        flushed: Option<FieldState>,
    ) {
        let mut records = state.collection.records.clone();
        if let Some(field_state) = flushed {
            if let Some(record) = records.get_mut(state.collection.active_index) {
                record.field_state = field_state;
            }
        }

        state.collection = mem::take(&mut state.collection).apply(CollectionAction::Replace {
            records: Some(records),
            active_index: Some(index),
        });
    }

    /// Apply the same values to every record carrying the path; after a
    /// first submission, touched records are re-validated through the form
    /// state service.
    async fn handle_bulk_update(
        &self,
        state: &mut BatchState,
        values: std::collections::HashMap<String, Value>,
    ) -> Result<(), BatchError> {
        for index in 0..state.collection.records.len() {
            let mut patch = FieldState::new();
            {
                let record = &state.collection.records[index];
                for (path, value) in &values {
                    if let Some(entry) = record.field_state.get(path) {
                        let mut entry = entry.clone();
                        entry.value = value.clone();
                        patch.insert(path.clone(), entry);
                    }
                }
            }
            if patch.is_empty() {
                continue;
            }

            let error_count = state.collection.records[index].error_count;
            state.collection = mem::take(&mut state.collection).apply(
                CollectionAction::UpdateForm {
                    index,
                    error_count,
                    patch,
                },
            );

            if state.has_submitted {
                let permissions = state.init.permissions_if_ready().map(|p| p.doc);
                let evaluated = state
                    .form_state
                    .evaluate(
                        &state.collection_slug,
                        &state.collection.records[index].field_state,
                        Operation::Create,
                        permissions.as_ref(),
                    )
                    .await
                    .map_err(|e| BatchError::FormState(e.to_string()))?;

                let error_count = evaluated.values().filter(|v| !v.valid).count();
                state.collection = mem::take(&mut state.collection).apply(
                    CollectionAction::UpdateForm {
                        index,
                        error_count,
                        patch: evaluated,
                    },
                );
            }
        }
        Ok(())
    }

    /// Kick off a submission pass over a snapshot of the collection. The
    /// reply port travels with the spawned task and resolves when the pass
    /// completes; the collection itself is updated by `SubmissionFinished`.
    fn handle_save_all_docs(
        &self,
        myself: &ActorRef<BatchMsg>,
        state: &mut BatchState,
        overrides: Option<Map<String, Value>>,
        flushed: Option<FieldState>,
        reply: ractor::RpcReplyPort<Result<SubmissionReport, BatchError>>,
    ) {
        if state.is_submitting {
            let _ = reply.send(Err(BatchError::SubmissionInFlight));
            return;
        }

        let mut snapshot = state.collection.records.clone();
        if let Some(field_state) = flushed {
            if let Some(record) = snapshot.get_mut(state.collection.active_index) {
                record.field_state = field_state;
            }
        }

        if snapshot.is_empty() {
            let _ = reply.send(Ok(SubmissionReport::default()));
            return;
        }

        state.is_submitting = true;

        let api = state.api.clone();
        let notifier = state.notifier.clone();
        let collection_slug = state.collection_slug.clone();
        let myself = myself.clone();
        tokio::spawn(async move {
            let outcome =
                submit::submit_all(api.as_ref(), notifier.as_ref(), &collection_slug, snapshot, overrides)
                    .await;
            let report = outcome.report.clone();
            if let Err(err) = myself.send_message(BatchMsg::SubmissionFinished(outcome)) {
                tracing::warn!(error = %err, "failed to deliver submission outcome");
            }
            let _ = reply.send(Ok(report));
        });
    }

    fn handle_submission_finished(&self, state: &mut BatchState, outcome: SubmissionOutcome) {
        state.is_submitting = false;
        state.has_submitted = true;

        tracing::info!(
            succeeded = outcome.report.succeeded,
            failed = outcome.report.failed,
            collection = %state.collection_slug,
            "batch submission finished"
        );

        state.collection = mem::take(&mut state.collection).apply(CollectionAction::Replace {
            records: Some(outcome.remaining),
            active_index: Some(0),
        });
        self.prune_thumbnails(state);
    }

    fn prune_thumbnails(&self, state: &BatchState) {
        if let Err(err) = state.thumbnailer.send_message(ThumbnailerMsg::Retain {
            live_keys: state.collection.live_file_keys(),
        }) {
            tracing::warn!(error = %err, "failed to prune preview table");
        }
    }

    fn snapshot(state: &BatchState) -> BatchSnapshot {
        BatchSnapshot {
            forms: state
                .collection
                .records
                .iter()
                .map(FormSnapshot::from_record)
                .collect(),
            active_index: state.collection.active_index,
            total_error_count: state.collection.total_error_count,
            has_submitted: state.has_submitted,
            is_submitting: state.is_submitting,
        }
    }
}
