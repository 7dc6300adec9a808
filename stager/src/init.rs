//! Shared initialization loader.
//!
//! Fetches, once per batch session, the empty field-state template and the
//! document permission set. Both are cached after the first successful fetch
//! and reused as the seed for every newly added record; concurrent callers
//! before resolution await the same in-flight fetch instead of issuing
//! duplicates.

use tokio::sync::OnceCell;

use shared_types::{DocPermissions, FieldState};

use crate::api::DocumentApi;
use crate::services::FormStateService;

#[derive(Debug, thiserror::Error, Clone)]
pub enum InitError {
    #[error("Initial field-state fetch failed: {0}")]
    Template(String),

    #[error("Permission fetch failed: {0}")]
    Access(String),
}

/// Permission view for the batch session.
#[derive(Debug, Clone, Copy)]
pub struct SessionPermissions {
    pub doc: DocPermissions,
    pub has_save_permission: bool,
    pub has_publish_permission: bool,
}

#[derive(Default)]
pub struct SharedInit {
    template: OnceCell<FieldState>,
    permissions: OnceCell<SessionPermissions>,
}

impl SharedInit {
    pub fn new() -> Self {
        Self::default()
    }

    /// The empty field-state template, fetched lazily in cheap-seeding mode
    /// (validation skipped). A failed fetch is returned to the caller; no
    /// record is ever seeded from a missing template.
    pub async fn template(
        &self,
        service: &dyn FormStateService,
        collection_slug: &str,
    ) -> Result<&FieldState, InitError> {
        self.template
            .get_or_try_init(|| async {
                tracing::debug!(collection = collection_slug, "fetching shared field-state template");
                service
                    .initial_state(collection_slug, true)
                    .await
                    .map_err(|e| InitError::Template(e.to_string()))
            })
            .await
    }

    /// The document permission set, plus the derived save/publish flags. The
    /// publish flag comes from a second access probe with `_status:
    /// "published"`.
    pub async fn permissions(
        &self,
        api: &dyn DocumentApi,
        collection_slug: &str,
    ) -> Result<&SessionPermissions, InitError> {
        self.permissions
            .get_or_try_init(|| async {
                tracing::debug!(collection = collection_slug, "fetching document permissions");
                let doc = api
                    .doc_access(collection_slug, false)
                    .await
                    .map_err(|e| InitError::Access(e.to_string()))?;
                let published = api
                    .doc_access(collection_slug, true)
                    .await
                    .map_err(|e| InitError::Access(e.to_string()))?;

                Ok(SessionPermissions {
                    doc,
                    has_save_permission: doc.has_save_permission(false),
                    has_publish_permission: published.update.granted(),
                })
            })
            .await
    }

    /// Cached permissions when already fetched; `None` while the first fetch
    /// has not completed. Used where a missing set is acceptable.
    pub fn permissions_if_ready(&self) -> Option<&SessionPermissions> {
        self.permissions.get()
    }
}
