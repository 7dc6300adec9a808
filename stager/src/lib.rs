//! Stagehand bulk upload staging core
//!
//! Stages many files as independent draft records, renders preview
//! thumbnails off the interaction path, and submits the collection to the
//! document-creation endpoint as a batch with partial-failure semantics.
//!
//! All collection state is owned by a single actor and mutated only through
//! dispatched messages; the surrounding UI consumes the [`BatchSession`]
//! handle and read-only snapshots.

pub mod actors;
pub mod api;
pub mod config;
pub mod file;
pub mod init;
pub mod services;
pub mod session;

pub use actors::batch::{BatchError, BatchSnapshot, FormSnapshot};
pub use actors::thumbnailer::ImageRenderer;
pub use api::{ApiClientError, CreateResponse, DocumentApi, DocumentPayload, HttpDocumentApi};
pub use config::StagerConfig;
pub use file::StagedFile;
pub use init::SessionPermissions;
pub use services::{
    FormStateError, FormStateService, NotificationSink, RenderedThumbnail, ThumbnailError,
    ThumbnailRenderer,
};
pub use session::{BatchSession, FormDataSource, SessionServices};
