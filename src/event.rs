use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Annotation on the audited object carrying the commit that produced it.
pub const GIT_COMMIT_ANNOTATION: &str = "git-commit-hash";

/// One record of an API server audit log, as posted to `/events`.
///
/// Field names follow the Kubernetes audit wire format; fields this
/// service does not interpret are preserved through `extra` so a stored
/// event reproduces what the API server sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, rename = "auditID")]
    pub audit_id: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default, rename = "requestURI")]
    pub request_uri: String,
    #[serde(default)]
    pub verb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_ref: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_received_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_object: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Reference to the object an audit event acted on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subresource: Option<String>,
}

/// Minimal view of the object embedded in `responseObject`. Only the
/// identity and annotations are decoded; the rest of the payload is
/// opaque to this service.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EmbeddedObject {
    kind: String,
    metadata: EmbeddedMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmbeddedMetadata {
    name: String,
    namespace: String,
    annotations: BTreeMap<String, String>,
}

/// Extracts the commit hash an event belongs to, or `None` when the
/// event carries no response payload, the payload does not decode into
/// object metadata, or the annotation is absent. A decode failure skips
/// this event only; the surrounding batch continues.
pub fn commit_hash(event: &AuditEvent) -> Option<String> {
    let raw = event.response_object.as_ref()?;
    let embedded: EmbeddedObject = match serde_json::from_value(raw.clone()) {
        Ok(embedded) => embedded,
        Err(err) => {
            debug!(
                audit_id = %event.audit_id,
                "failed to decode response object: {err}"
            );
            return None;
        }
    };

    let hash = embedded.metadata.annotations.get(GIT_COMMIT_ANNOTATION)?;
    debug!(
        audit_id = %event.audit_id,
        "commit {hash} found on {} {}/{}",
        embedded.kind, embedded.metadata.namespace, embedded.metadata.name
    );
    Some(hash.clone())
}
