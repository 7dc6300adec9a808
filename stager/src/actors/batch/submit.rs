//! Batch submission pass.
//!
//! Walks a snapshot of the staged records sequentially, one create call per
//! record, capturing every failure locally. Server errors are partitioned
//! into field-level (attached back onto the record's field state) and
//! record-level (surfaced through the notification sink). After the loop the
//! snapshot is split into created records (dropped) and failed records
//! (retained, relative order preserved).

use serde_json::{Map, Value};

use shared_types::{CreateDocumentBody, DataError, SubmissionReport};

use crate::api::{serialize_payload, DocumentApi, DocumentPayload};
use crate::services::NotificationSink;

use super::messages::SubmissionOutcome;
use super::state::DraftRecord;

/// Statuses treated as whole-record rejections even when the body is
/// unparsable.
const REJECTED_STATUSES: [u16; 2] = [400, 413];

pub(crate) async fn submit_all(
    api: &dyn DocumentApi,
    notifier: &dyn NotificationSink,
    collection_slug: &str,
    mut records: Vec<DraftRecord>,
    overrides: Option<Map<String, Value>>,
) -> SubmissionOutcome {
    let total = records.len();
    let mut created = Vec::new();
    let mut succeeded = vec![false; total];

    for (i, record) in records.iter_mut().enumerate() {
        notifier.progress(i + 1, total);
        tracing::info!(
            current = i + 1,
            total,
            file = %record.file.name(),
            collection = collection_slug,
            "submitting staged upload"
        );

        let payload = DocumentPayload {
            fields: serialize_payload(&record.field_state, overrides.as_ref()),
            file: Some(record.file.clone()),
        };

        match api.create_document(collection_slug, payload).await {
            Ok(response) => {
                let doc = if response.status == 201 {
                    response.body.as_ref().and_then(|body| body.doc.clone())
                } else {
                    None
                };

                let (field_errors, record_errors) = partition_errors(response.body.as_ref());
                apply_field_errors(record, &field_errors);

                if REJECTED_STATUSES.contains(&response.status) {
                    // Whole-record rejection (e.g. file too large); counted so
                    // the record is not discarded as clean below.
                    record.error_count += 1;
                    let message = record_errors.first().cloned().unwrap_or_else(|| {
                        format!("Failed to save {}", record.file.name())
                    });
                    notifier.error(&message);
                }

                if let Some(doc) = doc {
                    created.push(doc);
                    succeeded[i] = true;
                } else if field_errors.is_empty() && record.error_count == 0 {
                    tracing::warn!(
                        status = response.status,
                        file = %record.file.name(),
                        "create rejected without structured errors; record retained"
                    );
                }
            }
            Err(err) => {
                // Transport failures never abort the pass; the record stays
                // with whatever state it already had.
                tracing::warn!(
                    error = %err,
                    file = %record.file.name(),
                    "create request failed"
                );
            }
        }
    }

    let mut remaining = Vec::with_capacity(total);
    for (record, ok) in records.into_iter().zip(succeeded) {
        if !ok {
            remaining.push(record);
        }
    }

    let succeeded_count = total - remaining.len();
    let failed_count = remaining.len();

    if succeeded_count > 0 {
        notifier.success(&format!("Successfully saved {succeeded_count} files"));
    }
    if failed_count > 0 {
        notifier.error(&format!("Failed to save {failed_count} files"));
    }

    SubmissionOutcome {
        remaining,
        report: SubmissionReport {
            created,
            succeeded: succeeded_count,
            failed: failed_count,
        },
    }
}

/// Split a response body's errors into field-level entries (carrying a
/// `path`) and record-level messages.
fn partition_errors(body: Option<&CreateDocumentBody>) -> (Vec<DataError>, Vec<String>) {
    let mut field_errors = Vec::new();
    let mut record_errors = Vec::new();

    if let Some(body) = body {
        for entry in &body.errors {
            if let Some(message) = &entry.message {
                record_errors.push(message.clone());
            }
            if let Some(data) = &entry.data {
                for error in &data.errors {
                    if error.path.is_some() {
                        field_errors.push(error.clone());
                    } else if let Some(message) = &error.message {
                        record_errors.push(message.clone());
                    }
                }
            }
        }
    }

    (field_errors, record_errors)
}

/// Attach field-level server errors as validation feedback and set the
/// record's error count to the number of invalid fields reported.
fn apply_field_errors(record: &mut DraftRecord, field_errors: &[DataError]) {
    for error in field_errors {
        let Some(path) = &error.path else { continue };
        let entry = record.field_state.entry(path.clone()).or_default();
        entry.valid = false;
        entry.error_message = error.message.clone();
    }
    record.error_count = field_errors.len();
}
