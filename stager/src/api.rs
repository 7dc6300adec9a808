//! Document endpoint port and its HTTP implementation.
//!
//! The staging core only needs two calls from the document server: create a
//! document from one staged record (multipart upload) and fetch the
//! document-level permission set. Both live behind [`DocumentApi`] so the
//! submission loop can be exercised against stubs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared_types::{CreateDocumentBody, DocPermissions, FieldState};

use crate::config::StagerConfig;
use crate::file::StagedFile;

#[derive(Debug, thiserror::Error, Clone)]
pub enum ApiClientError {
    #[error("Request to {0} failed: {1}")]
    Transport(String, String),

    #[error("Failed to encode request body: {0}")]
    Encode(String),

    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

/// One record's submission body: the field values serialized for the
/// `_payload` part plus the staged file itself.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub fields: Map<String, Value>,
    pub file: Option<StagedFile>,
}

/// Raw outcome of a create call. The body is `None` when the server returned
/// something unparsable; the status always survives so rejection handling
/// does not depend on a well-formed body.
#[derive(Debug, Clone)]
pub struct CreateResponse {
    pub status: u16,
    pub body: Option<CreateDocumentBody>,
}

#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// `POST {api}/{collection}` with a multipart body.
    async fn create_document(
        &self,
        collection_slug: &str,
        payload: DocumentPayload,
    ) -> Result<CreateResponse, ApiClientError>;

    /// `POST {api}/{collection}/access`; with `published` set, probes the
    /// permission set for publishing (`_status: "published"`).
    async fn doc_access(
        &self,
        collection_slug: &str,
        published: bool,
    ) -> Result<DocPermissions, ApiClientError>;
}

/// Serialize a record's field state into the `_payload` document. The `file`
/// path is carried by the multipart file part instead, and unset (`null`)
/// values are omitted; caller-supplied overrides are merged last and win.
pub fn serialize_payload(
    field_state: &FieldState,
    overrides: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut fields = Map::new();
    for (path, entry) in field_state {
        if path == "file" || entry.value.is_null() {
            continue;
        }
        fields.insert(path.clone(), entry.value.clone());
    }
    if let Some(overrides) = overrides {
        for (path, value) in overrides {
            fields.insert(path.clone(), value.clone());
        }
    }
    fields
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpDocumentApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDocumentApi {
    pub fn new(config: &StagerConfig) -> Result<Self, ApiClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiClientError::Transport("client".to_string(), e.to_string()))?;

        Ok(Self {
            http,
            base_url: format!("{}{}", config.server_url, config.api_route),
        })
    }

    fn collection_url(&self, collection_slug: &str) -> String {
        format!("{}/{}", self.base_url, collection_slug)
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn create_document(
        &self,
        collection_slug: &str,
        payload: DocumentPayload,
    ) -> Result<CreateResponse, ApiClientError> {
        let url = self.collection_url(collection_slug);

        let payload_json = serde_json::to_string(&payload.fields)
            .map_err(|e| ApiClientError::Encode(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new().text("_payload", payload_json);

        if let Some(file) = payload.file {
            let part = reqwest::multipart::Part::bytes(file.data().to_vec())
                .file_name(file.name().to_string())
                .mime_str(file.content_type())
                .map_err(|e| ApiClientError::Encode(e.to_string()))?;
            form = form.part("file", part);
        }

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiClientError::Transport(url.clone(), e.to_string()))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| ApiClientError::Transport(url, e.to_string()))?;

        // An unparsable body is not a transport failure; rejection statuses
        // must still reach the submission loop.
        let body = serde_json::from_str::<CreateDocumentBody>(&raw).ok();

        Ok(CreateResponse { status, body })
    }

    async fn doc_access(
        &self,
        collection_slug: &str,
        published: bool,
    ) -> Result<DocPermissions, ApiClientError> {
        let url = format!("{}/access", self.collection_url(collection_slug));

        let mut request = self.http.post(&url);
        if published {
            request = request.json(&serde_json::json!({ "_status": "published" }));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiClientError::Transport(url.clone(), e.to_string()))?;

        response
            .json::<DocPermissions>()
            .await
            .map_err(|e| ApiClientError::Decode(e.to_string()))
    }
}
