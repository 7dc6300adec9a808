//! Shared types between the staging core and the admin frontend
//!
//! These types are used by both:
//! - The ractor-based staging actors (native Rust)
//! - The admin UI (TypeScript, via generated bindings)
//!
//! Serializable with serde for JSON over HTTP

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Field State
// ============================================================================

/// One entry of a record's editable field state, keyed by field path.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FieldValue {
    /// Current field value (JSON; `null` when unset)
    #[serde(default)]
    #[ts(type = "unknown")]
    pub value: serde_json::Value,

    /// Whether the field currently passes validation
    #[serde(default = "default_true")]
    pub valid: bool,

    /// Server- or validator-supplied message for an invalid field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_true() -> bool {
    true
}

impl FieldValue {
    pub fn valid(value: serde_json::Value) -> Self {
        Self {
            value,
            valid: true,
            error_message: None,
        }
    }

    pub fn invalid(value: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            value,
            valid: false,
            error_message: Some(message.into()),
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::valid(serde_json::Value::Null)
    }
}

/// Field path -> field value map for one draft record.
pub type FieldState = HashMap<String, FieldValue>;

/// Operation the form-state service validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Operation {
    Create,
    Update,
}

// ============================================================================
// Permissions
// ============================================================================

/// A single access flag. The access endpoint returns either a bare boolean or
/// an object carrying `permission`, depending on server version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum Permission {
    Flag(bool),
    Detailed { permission: bool },
}

impl Permission {
    pub fn granted(&self) -> bool {
        match self {
            Permission::Flag(flag) => *flag,
            Permission::Detailed { permission } => *permission,
        }
    }
}

impl Default for Permission {
    fn default() -> Self {
        Permission::Flag(false)
    }
}

/// Document-level permission set for a collection, as returned by
/// `POST {api}/{collection}/access`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocPermissions {
    #[serde(default)]
    pub create: Permission,
    #[serde(default)]
    pub read: Permission,
    #[serde(default)]
    pub update: Permission,
    #[serde(default)]
    pub delete: Permission,
}

impl DocPermissions {
    /// Whether the current user may save a document in this collection.
    pub fn has_save_permission(&self, is_editing: bool) -> bool {
        if is_editing {
            self.update.granted()
        } else {
            self.create.granted()
        }
    }
}

// ============================================================================
// Create-Document Wire Shapes
// ============================================================================

/// One nested validation error from the create endpoint. Entries carrying a
/// `path` are field-level; entries without one are record-level.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DataError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ApiErrorData {
    #[serde(default)]
    pub errors: Vec<DataError>,
}

/// Top-level entry of the endpoint's `errors` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ApiErrorEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ApiErrorData>,
}

/// Response body of `POST {api}/{collection}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateDocumentBody {
    /// The created document, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub doc: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

// ============================================================================
// Submission Outcome
// ============================================================================

/// Aggregate outcome of one batch submission pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SubmissionReport {
    /// Documents created by the endpoint, in submission order
    #[ts(type = "unknown[]")]
    pub created: Vec<serde_json::Value>,

    /// Records removed from the collection because they were created
    pub succeeded: usize,

    /// Records retained in the collection for correction
    pub failed: usize,
}

impl SubmissionReport {
    /// True when every record in the pass was created; the batch UI may close.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
