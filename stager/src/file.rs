//! Staged file handle with a content-derived identity key.

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// One file staged for upload. The payload is never mutated; replacing the
/// underlying file means constructing a new `StagedFile`.
#[derive(Debug, Clone)]
pub struct StagedFile {
    name: String,
    content_type: String,
    data: Bytes,
    key: String,
}

impl StagedFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        let key = content_key(&data);
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
            key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Stable dedup identity: SHA-256 of the file bytes, assigned at
    /// construction. Two files with identical content share a key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// SHA-256 content hash as lowercase hex.
pub fn content_key(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
