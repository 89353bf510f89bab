//! Rewind restore loader: one forward pass over a backup archive, producing
//! the partitioned in-memory index the apply phase consumes.
//!
//! Pipeline per entry: classify the path, decrypt when the resource type has
//! a registered transform, decode the manifest, insert into the right
//! partition. Any failure aborts the whole load; there is no partial index.

#![forbid(unsafe_code)]

use std::path::Path;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info};

use rewind_archive::{classify, ArchiveEntry, ArchiveStream, ControlKind, EntryKind};
use rewind_core::{DecodedResource, ResourceIdentity, RestoreError, RestoreIndex};
use rewind_crypt::{maybe_decrypt, TransformerMap};

/// What to do when one archive path appears more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Last write wins, matching archive-writer behavior.
    #[default]
    Overwrite,
    /// Fail the load with `RestoreError::Duplicate`.
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub duplicates: DuplicatePolicy,
}

/// Load a backup archive from `path` into a fresh `RestoreIndex`.
///
/// Strictly sequential and fail-fast: the first error is returned and the
/// partially built index is dropped.
pub fn load_archive(
    path: &Path,
    transformers: &TransformerMap,
    options: LoadOptions,
) -> Result<RestoreIndex, RestoreError> {
    let t0 = Instant::now();
    let mut index = RestoreIndex::default();
    let mut stream = ArchiveStream::open(path)?;
    let mut entries = 0u64;
    for entry in stream.entries()? {
        let entry = entry?;
        entries += 1;
        load_entry(entry, transformers, options, &mut index)?;
    }
    histogram!("restore_load_ms", t0.elapsed().as_secs_f64() * 1000.0);
    counter!("restore_entries_total", entries);
    info!(
        entries,
        cluster_scoped = index.cluster_scoped.len(),
        namespaced = index.namespaced.len(),
        crds = index.custom_resource_definitions.len(),
        "backup archive loaded"
    );
    Ok(index)
}

fn load_entry(
    entry: ArchiveEntry,
    transformers: &TransformerMap,
    options: LoadOptions,
    index: &mut RestoreIndex,
) -> Result<(), RestoreError> {
    match classify(&entry.path)? {
        EntryKind::Control(kind) => absorb_control(kind, &entry, index),
        EntryKind::Resource { identity, auth_tag } => {
            // Mark first so partially-failed entries stay visible in seen_paths.
            let first_time = index.seen_paths.insert(entry.path.clone());
            if !first_time && options.duplicates == DuplicatePolicy::Reject {
                return Err(RestoreError::Duplicate { path: entry.path });
            }
            let clear = maybe_decrypt(transformers, &identity.gvr, entry.data, &auth_tag, &entry.path)?;
            index_resource(index, identity, &clear)
        }
    }
}

fn absorb_control(
    kind: ControlKind,
    entry: &ArchiveEntry,
    index: &mut RestoreIndex,
) -> Result<(), RestoreError> {
    let decode_err =
        |e: serde_json::Error| RestoreError::JsonDecode { path: entry.path.clone(), source: e };
    match kind {
        ControlKind::FilterSet => {
            index.backup_resource_set = serde_json::from_slice(&entry.data).map_err(decode_err)?;
            debug!(path = %entry.path, "absorbed backup filter set");
        }
        ControlKind::StatusSubresourceSet => {
            index.resources_with_status_subresource =
                serde_json::from_slice(&entry.data).map_err(decode_err)?;
            debug!(path = %entry.path, "absorbed status-subresource set");
        }
        ControlKind::Unrecognized => {
            debug!(path = %entry.path, "skipping unrecognized control file");
        }
    }
    Ok(())
}

fn index_resource(
    index: &mut RestoreIndex,
    identity: ResourceIdentity,
    cleartext: &[u8],
) -> Result<(), RestoreError> {
    let doc: DecodedResource = serde_json::from_slice(cleartext)
        .map_err(|e| RestoreError::JsonDecode { path: identity.source_path.clone(), source: e })?;
    let partition = if identity.gvr.is_crd() {
        &mut index.custom_resource_definitions
    } else if identity.namespace.is_some() {
        &mut index.namespaced
    } else {
        &mut index.cluster_scoped
    };
    partition.insert(identity, doc);
    Ok(())
}
