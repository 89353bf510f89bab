//! Rewind decryption gate: resource types backed up under encryption-at-rest
//! are sealed per entry; everything else passes through untouched.

#![forbid(unsafe_code)]

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rustc_hash::FxHashMap;

use rewind_core::{GroupResource, GroupVersionResource, RestoreError};

/// Failure inside a transform: wrong key, tampered ciphertext, or an
/// authenticated-data mismatch.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Recovers cleartext from storage-sealed payloads.
///
/// `auth_tag` is the authenticated data the payload was sealed under
/// (namespace+name); a mismatch must fail rather than return relinked
/// ciphertext from another resource.
pub trait DecryptionTransform: Send + Sync {
    fn from_storage(&self, ciphertext: &[u8], auth_tag: &str) -> Result<Vec<u8>, TransformError>;
}

/// Transforms keyed version-independently by group+resource. Built and
/// owned by the caller; this crate only consumes it.
pub type TransformerMap = FxHashMap<GroupResource, Arc<dyn DecryptionTransform>>;

/// Decrypt `raw` if a transform is registered for the entry's resource type.
///
/// Without a registered transform the data is already plain JSON and is
/// returned unchanged. With one, the entry body is a JSON-encoded base64
/// string wrapping the ciphertext; the unwrapped bytes and `auth_tag` go to
/// the transform. Pure beyond the returned bytes.
pub fn maybe_decrypt(
    transformers: &TransformerMap,
    gvr: &GroupVersionResource,
    raw: Vec<u8>,
    auth_tag: &str,
    path: &str,
) -> Result<Vec<u8>, RestoreError> {
    let transform = match transformers.get(&gvr.group_resource()) {
        Some(t) => t,
        None => return Ok(raw),
    };
    let envelope = |reason: String| RestoreError::Envelope { path: path.to_string(), reason };
    let encoded: String = serde_json::from_slice(&raw).map_err(|e| envelope(e.to_string()))?;
    let ciphertext = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| envelope(format!("base64: {}", e)))?;
    transform
        .from_storage(&ciphertext, auth_tag)
        .map_err(|e| RestoreError::Decryption { path: path.to_string(), reason: e.to_string() })
}
