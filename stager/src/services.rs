//! Collaborator boundaries consumed by the staging core.
//!
//! The generic form-state service, the notification sink, and the thumbnail
//! renderer are external capabilities; the core talks to them only through
//! these traits so the surrounding application can plug in its own
//! implementations (and tests can substitute stubs).

use async_trait::async_trait;
use shared_types::{DocPermissions, FieldState, Operation};

use crate::file::StagedFile;

#[derive(Debug, thiserror::Error, Clone)]
pub enum FormStateError {
    #[error("Form state service unavailable: {0}")]
    Unavailable(String),

    #[error("Form state evaluation failed: {0}")]
    Evaluation(String),
}

/// The validation-capable form-state service.
///
/// `initial_state` produces the empty field-state template for a collection
/// (cheap seeding mode skips validation); `evaluate` re-validates a record's
/// current field state against the collection schema.
#[async_trait]
pub trait FormStateService: Send + Sync {
    async fn initial_state(
        &self,
        collection_slug: &str,
        skip_validation: bool,
    ) -> Result<FieldState, FormStateError>;

    async fn evaluate(
        &self,
        collection_slug: &str,
        current: &FieldState,
        operation: Operation,
        permissions: Option<&DocPermissions>,
    ) -> Result<FieldState, FormStateError>;
}

/// Toast-style notification sink. Counts and messages are human-readable;
/// the default `progress` is a no-op for frontends that render their own
/// progress from snapshots.
pub trait NotificationSink: Send + Sync {
    fn success(&self, message: &str);

    fn error(&self, message: &str);

    fn progress(&self, _current: usize, _total: usize) {}
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum ThumbnailError {
    #[error("Unsupported preview type: {0}")]
    UnsupportedType(String),

    #[error("Preview decode failed: {0}")]
    Decode(String),

    #[error("Preview encode failed: {0}")]
    Encode(String),
}

/// A rendered preview, ready for the frontend to display.
#[derive(Debug, Clone)]
pub struct RenderedThumbnail {
    /// `data:image/jpeg;base64,...` URL of the resized preview
    pub data_url: String,
}

/// Renders a single file into a preview thumbnail. Implementations are
/// invoked one at a time by the thumbnail pipeline; a failure only skips
/// that file.
pub trait ThumbnailRenderer: Send + Sync {
    fn render(&self, file: &StagedFile) -> Result<RenderedThumbnail, ThumbnailError>;
}
