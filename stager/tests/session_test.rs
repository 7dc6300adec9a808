//! BatchSession gate tests — staging, selection, bulk edit, preview flow,
//! and the batch submission pass, all against stub collaborators.
//!
//! Gate conditions:
//!   - Adding files seeds records from the shared template, newest batch first
//!   - Removal keeps the active cursor valid under the reindexing rules
//!   - Switching selection flushes the outgoing record's live edits
//!   - Bulk updates touch only records carrying the field path
//!   - A submission pass drops created records, retains failures in order,
//!     resets the cursor, and reports aggregate counts
//!   - Overlapping submissions are rejected
//!   - Initialization failures block adds; the template is fetched once
//!   - Previews arrive per position and survive removal pruning

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use shared_types::{DocPermissions, FieldState, FieldValue, Operation, Permission};
use stager::{
    ApiClientError, BatchSession, CreateResponse, DocumentApi, DocumentPayload, FormDataSource,
    FormStateError, FormStateService, NotificationSink, RenderedThumbnail, SessionServices,
    StagedFile, StagerConfig, ThumbnailError, ThumbnailRenderer,
};

// ─── Stub collaborators ──────────────────────────────────────────────────────

struct StubFormState {
    initial_calls: AtomicUsize,
    evaluate_calls: AtomicUsize,
    fail_initial: bool,
}

impl StubFormState {
    fn new() -> Self {
        Self {
            initial_calls: AtomicUsize::new(0),
            evaluate_calls: AtomicUsize::new(0),
            fail_initial: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_initial: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl FormStateService for StubFormState {
    async fn initial_state(
        &self,
        _collection_slug: &str,
        _skip_validation: bool,
    ) -> Result<FieldState, FormStateError> {
        self.initial_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initial {
            return Err(FormStateError::Unavailable("form service down".to_string()));
        }
        Ok(FieldState::from([
            ("title".to_string(), FieldValue::default()),
            ("alt".to_string(), FieldValue::default()),
        ]))
    }

    async fn evaluate(
        &self,
        _collection_slug: &str,
        current: &FieldState,
        _operation: Operation,
        _permissions: Option<&DocPermissions>,
    ) -> Result<FieldState, FormStateError> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        // Everything passes validation once re-evaluated.
        let mut state = current.clone();
        for entry in state.values_mut() {
            entry.valid = true;
            entry.error_message = None;
        }
        Ok(state)
    }
}

#[derive(Default)]
struct RecordingSink {
    successes: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl NotificationSink for RecordingSink {
    fn success(&self, message: &str) {
        self.successes.lock().expect("successes").push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().expect("errors").push(message.to_string());
    }
}

struct StubRenderer {
    calls: AtomicUsize,
}

impl StubRenderer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl ThumbnailRenderer for StubRenderer {
    fn render(&self, file: &StagedFile) -> Result<RenderedThumbnail, ThumbnailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RenderedThumbnail {
            data_url: format!("data:test/{}", file.name()),
        })
    }
}

/// Scripted create endpoint; one canned response per call, in order. A delay
/// lets tests overlap calls deliberately.
struct ScriptedApi {
    responses: Mutex<Vec<Result<CreateResponse, ApiClientError>>>,
    delay: Duration,
}

impl ScriptedApi {
    fn new(responses: Vec<Result<CreateResponse, ApiClientError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            delay: Duration::ZERO,
        }
    }

    fn slow(responses: Vec<Result<CreateResponse, ApiClientError>>, delay: Duration) -> Self {
        Self {
            responses: Mutex::new(responses),
            delay,
        }
    }
}

#[async_trait]
impl DocumentApi for ScriptedApi {
    async fn create_document(
        &self,
        _collection_slug: &str,
        _payload: DocumentPayload,
    ) -> Result<CreateResponse, ApiClientError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut responses = self.responses.lock().expect("responses");
        if responses.is_empty() {
            return Ok(CreateResponse {
                status: 500,
                body: None,
            });
        }
        responses.remove(0)
    }

    async fn doc_access(
        &self,
        _collection_slug: &str,
        published: bool,
    ) -> Result<DocPermissions, ApiClientError> {
        Ok(DocPermissions {
            create: Permission::Flag(true),
            update: Permission::Flag(published),
            ..Default::default()
        })
    }
}

struct ScriptedFormData {
    field_state: FieldState,
}

impl FormDataSource for ScriptedFormData {
    fn current_field_state(&self) -> FieldState {
        self.field_state.clone()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config() -> StagerConfig {
    StagerConfig {
        thumbnail_pause: Duration::from_millis(1),
        ..Default::default()
    }
}

fn image(name: &str) -> StagedFile {
    StagedFile::new(name, "image/jpeg", name.as_bytes().to_vec())
}

async fn spawn_session(api: Arc<dyn DocumentApi>) -> (BatchSession, Arc<RecordingSink>) {
    init_tracing();
    let sink = Arc::new(RecordingSink::default());
    let session = BatchSession::spawn(
        &test_config(),
        "media",
        SessionServices {
            api,
            form_state: Arc::new(StubFormState::new()),
            notifier: sink.clone(),
            renderer: Arc::new(StubRenderer::new()),
        },
    )
    .await
    .expect("spawn session");
    (session, sink)
}

fn created_response(id: &str) -> Result<CreateResponse, ApiClientError> {
    Ok(CreateResponse {
        status: 201,
        body: Some(serde_json::from_value(json!({ "doc": { "id": id } })).expect("body")),
    })
}

fn field_error_response() -> Result<CreateResponse, ApiClientError> {
    Ok(CreateResponse {
        status: 400,
        body: Some(
            serde_json::from_value(json!({
                "errors": [{
                    "message": "The following field is invalid: title",
                    "data": { "errors": [
                        { "path": "title", "message": "This field is required." }
                    ]}
                }]
            }))
            .expect("body"),
        ),
    })
}

fn transport_error() -> Result<CreateResponse, ApiClientError> {
    Err(ApiClientError::Transport(
        "http://localhost/api/media".to_string(),
        "connection refused".to_string(),
    ))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

/// Scenario A: add 3 files -> 3 records, cursor at 0, no errors.
#[tokio::test]
async fn test_add_files_seeds_collection() {
    let (session, _sink) = spawn_session(Arc::new(ScriptedApi::new(vec![]))).await;

    session
        .add_files(vec![image("a.jpg"), image("b.jpg"), image("c.jpg")])
        .await
        .expect("add");

    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.forms.len(), 3);
    assert_eq!(snapshot.active_index, 0);
    assert_eq!(snapshot.total_error_count, 0);
    assert!(!snapshot.has_submitted);

    // Seeded from the shared template, file path overwritten valid.
    let form = &snapshot.forms[0];
    assert!(form.field_state.contains_key("title"));
    assert!(form.field_state["file"].valid);

    session.shutdown();
}

/// The newest batch lands in front of earlier records.
#[tokio::test]
async fn test_add_files_prepends_newest_batch() {
    let (session, _sink) = spawn_session(Arc::new(ScriptedApi::new(vec![]))).await;

    session.add_files(vec![image("old.jpg")]).await.expect("add");
    session
        .add_files(vec![image("new1.jpg"), image("new2.jpg")])
        .await
        .expect("add");

    let snapshot = session.snapshot().await.expect("snapshot");
    let names: Vec<&str> = snapshot.forms.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["new1.jpg", "new2.jpg", "old.jpg"]);

    session.shutdown();
}

/// Scenario B: removing index 1 of 3 with the cursor on 2 shifts it to 1.
#[tokio::test]
async fn test_remove_file_reindexes_cursor() {
    let (session, _sink) = spawn_session(Arc::new(ScriptedApi::new(vec![]))).await;

    session
        .add_files(vec![image("a.jpg"), image("b.jpg"), image("c.jpg")])
        .await
        .expect("add");
    session.set_active_index(2);
    session.remove_file(1);

    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.forms.len(), 2);
    assert_eq!(snapshot.active_index, 1);

    // Removing past the end is a no-op, not an error.
    session.remove_file(9);
    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.forms.len(), 2);

    session.shutdown();
}

/// Switching selection persists the outgoing record's live edits first.
#[tokio::test]
async fn test_set_active_index_flushes_live_edits() {
    let (session, _sink) = spawn_session(Arc::new(ScriptedApi::new(vec![]))).await;

    session
        .add_files(vec![image("a.jpg"), image("b.jpg")])
        .await
        .expect("add");

    let mut edited = session.snapshot().await.expect("snapshot").forms[0]
        .field_state
        .clone();
    edited.insert("title".to_string(), FieldValue::valid(json!("Edited live")));
    session.set_form_data_source(Arc::new(ScriptedFormData {
        field_state: edited,
    }));

    session.set_active_index(1);

    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.active_index, 1);
    assert_eq!(
        snapshot.forms[0].field_state["title"].value,
        json!("Edited live")
    );

    session.shutdown();
}

/// Scenario D: bulk update touches only records carrying the path.
#[tokio::test]
async fn test_bulk_update_skips_records_without_path() {
    let (session, _sink) = spawn_session(Arc::new(ScriptedApi::new(vec![]))).await;

    session
        .add_files(vec![image("a.jpg"), image("b.jpg")])
        .await
        .expect("add");

    // Replace record 1's field state with one lacking `title` by flushing a
    // snapshot while it is active.
    session.set_active_index(1);
    session.set_form_data_source(Arc::new(ScriptedFormData {
        field_state: FieldState::from([("alt".to_string(), FieldValue::default())]),
    }));
    session.set_active_index(0);

    session
        .bulk_update_form(HashMap::from([("title".to_string(), json!("X"))]))
        .await
        .expect("bulk update");

    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.forms[0].field_state["title"].value, json!("X"));
    assert!(!snapshot.forms[1].field_state.contains_key("title"));

    session.shutdown();
}

/// Scenario C, end to end: created / field error / transport error. The two
/// failures stay in order, the cursor resets, and both toasts fire.
#[tokio::test]
async fn test_save_all_docs_partial_failure() {
    let api = Arc::new(ScriptedApi::new(vec![
        created_response("doc-1"),
        field_error_response(),
        transport_error(),
    ]));
    let (session, sink) = spawn_session(api).await;

    // One batch keeps file order: submission walks created.jpg, invalid.jpg,
    // offline.jpg against the scripted responses in that order.
    session
        .add_files(vec![
            image("created.jpg"),
            image("invalid.jpg"),
            image("offline.jpg"),
        ])
        .await
        .expect("add");

    let report = session.save_all_docs(None).await.expect("save");
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(report.created.len(), 1);
    assert!(!report.all_succeeded());

    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.forms.len(), 2);
    assert_eq!(snapshot.active_index, 0);
    assert!(snapshot.has_submitted);
    let names: Vec<&str> = snapshot.forms.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["invalid.jpg", "offline.jpg"]);

    // Field error landed on the retained record as validation feedback.
    assert!(!snapshot.forms[0].field_state["title"].valid);
    assert!(snapshot.total_error_count > 0);

    assert_eq!(
        sink.successes.lock().expect("successes").as_slice(),
        ["Successfully saved 1 files"]
    );
    assert!(sink
        .errors
        .lock()
        .expect("errors")
        .contains(&"Failed to save 2 files".to_string()));

    session.shutdown();
}

/// After a submission, bulk updates re-validate through the form state
/// service and clear stale error counts.
#[tokio::test]
async fn test_bulk_update_revalidates_after_submission() {
    let api = Arc::new(ScriptedApi::new(vec![field_error_response()]));
    let sink = Arc::new(RecordingSink::default());
    let form_state = Arc::new(StubFormState::new());
    let session = BatchSession::spawn(
        &test_config(),
        "media",
        SessionServices {
            api,
            form_state: form_state.clone(),
            notifier: sink,
            renderer: Arc::new(StubRenderer::new()),
        },
    )
    .await
    .expect("spawn session");

    session.add_files(vec![image("a.jpg")]).await.expect("add");
    let report = session.save_all_docs(None).await.expect("save");
    assert_eq!(report.failed, 1);

    let before = session.snapshot().await.expect("snapshot");
    assert!(before.total_error_count > 0);

    session
        .bulk_update_form(HashMap::from([("title".to_string(), json!("Fixed"))]))
        .await
        .expect("bulk update");

    assert!(form_state.evaluate_calls.load(Ordering::SeqCst) > 0);
    let after = session.snapshot().await.expect("snapshot");
    assert_eq!(after.total_error_count, 0);
    assert_eq!(after.forms[0].field_state["title"].value, json!("Fixed"));

    session.shutdown();
}

/// A second save while one is in flight is rejected, and the first still
/// completes.
#[tokio::test]
async fn test_overlapping_submissions_rejected() {
    let api = Arc::new(ScriptedApi::slow(
        vec![created_response("doc-1"), created_response("doc-2")],
        Duration::from_millis(100),
    ));
    let (session, _sink) = spawn_session(api).await;

    session
        .add_files(vec![image("a.jpg"), image("b.jpg")])
        .await
        .expect("add");

    let (first, second) = tokio::join!(session.save_all_docs(None), session.save_all_docs(None));

    let report = first.expect("first save");
    assert_eq!(report.succeeded, 2);
    assert!(matches!(
        second.unwrap_err(),
        stager::BatchError::SubmissionInFlight
    ));

    session.shutdown();
}

/// Initialization is fetched once and a failure blocks the add outright.
#[tokio::test]
async fn test_initialization_gates_adds() {
    let api: Arc<dyn DocumentApi> = Arc::new(ScriptedApi::new(vec![]));
    let sink = Arc::new(RecordingSink::default());
    let form_state = Arc::new(StubFormState::new());
    let session = BatchSession::spawn(
        &test_config(),
        "media",
        SessionServices {
            api: api.clone(),
            form_state: form_state.clone(),
            notifier: sink.clone(),
            renderer: Arc::new(StubRenderer::new()),
        },
    )
    .await
    .expect("spawn session");

    session.add_files(vec![image("a.jpg")]).await.expect("add");
    session.add_files(vec![image("b.jpg")]).await.expect("add");
    assert_eq!(form_state.initial_calls.load(Ordering::SeqCst), 1);
    session.shutdown();

    // A session whose template fetch fails refuses to stage anything.
    let failing = BatchSession::spawn(
        &test_config(),
        "media",
        SessionServices {
            api,
            form_state: Arc::new(StubFormState::failing()),
            notifier: sink,
            renderer: Arc::new(StubRenderer::new()),
        },
    )
    .await
    .expect("spawn session");

    let err = failing.add_files(vec![image("c.jpg")]).await.unwrap_err();
    assert!(matches!(err, stager::BatchError::Initialization(_)));
    let snapshot = failing.snapshot().await.expect("snapshot");
    assert!(snapshot.forms.is_empty());

    failing.shutdown();
}

/// Permission probes: plain access grants save, the published probe grants
/// publish.
#[tokio::test]
async fn test_permissions_derive_save_and_publish() {
    let (session, _sink) = spawn_session(Arc::new(ScriptedApi::new(vec![]))).await;

    let permissions = session.permissions().await.expect("permissions");
    assert!(permissions.has_save_permission);
    assert!(permissions.has_publish_permission);

    session.shutdown();
}

/// Previews arrive per position, deduped by content, and pruning follows
/// removal.
#[tokio::test]
async fn test_thumbnails_track_positions() {
    let api: Arc<dyn DocumentApi> = Arc::new(ScriptedApi::new(vec![]));
    let sink = Arc::new(RecordingSink::default());
    let renderer = Arc::new(StubRenderer::new());
    let session = BatchSession::spawn(
        &test_config(),
        "media",
        SessionServices {
            api,
            form_state: Arc::new(StubFormState::new()),
            notifier: sink,
            renderer: renderer.clone(),
        },
    )
    .await
    .expect("spawn session");

    let duplicate = StagedFile::new("copy.jpg", "image/jpeg", b"same-bytes".to_vec());
    let original = StagedFile::new("orig.jpg", "image/jpeg", b"same-bytes".to_vec());
    let document = StagedFile::new("doc.pdf", "application/pdf", b"%PDF".to_vec());

    session
        .add_files(vec![original, duplicate, document])
        .await
        .expect("add");

    // Identical content renders once; the PDF never renders.
    let mut urls = Vec::new();
    for _ in 0..200 {
        urls = session.thumbnail_urls().await.expect("thumbnails");
        if urls.iter().filter(|u| u.is_some()).count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(urls.len(), 3);
    assert!(urls[0].is_some());
    assert!(urls[1].is_some());
    assert!(urls[2].is_none());
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);

    // Removing both copies prunes the entry; the survivor keeps its preview.
    session.remove_file(0);
    session.remove_file(0);
    let urls = session.thumbnail_urls().await.expect("thumbnails");
    assert_eq!(urls.len(), 1);
    assert!(urls[0].is_none());

    session.shutdown();
}
