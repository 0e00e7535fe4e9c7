//! Impact-index reverse lookup over derived-artifact collections
//!
//! Every derived artifact persists an `_impactIndex`: the keys of each
//! source resource joined into it (including its own subject). Mutating any
//! of those resources must produce a regeneration candidate for the
//! artifact. This module gives store-backed composites the shared scan.

use crate::error::Result;
use chrono::{DateTime, Utc};
use heron_db_core::ResourceKey;
use heron_db_docstore::DocStore;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Stored derived-artifact document
///
/// Keyed by `(resource, context, artifact type)`; the body carries whatever
/// the generator produced plus the impact index and an optional expiry for
/// time-to-live artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDoc {
    /// Subject the artifact describes
    #[serde(rename = "_key")]
    pub key: ResourceKey,
    /// Artifact specification type (which view/table/search spec built it)
    #[serde(rename = "_specType")]
    pub spec_type: String,
    /// Generated content
    pub content: Value,
    /// Keys of every source resource whose change invalidates this artifact
    #[serde(rename = "_impactIndex", default)]
    pub impact_index: Vec<ResourceKey>,
    /// Expiry for time-to-live artifacts; expired documents are ignored by
    /// the reverse scan
    #[serde(rename = "_expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ArtifactDoc {
    /// Render the storage primary key
    pub fn doc_id(&self) -> String {
        artifact_doc_id(&self.key, &self.spec_type)
    }

    /// True when the artifact has passed its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Render the primary key for an artifact document
pub fn artifact_doc_id(key: &ResourceKey, spec_type: &str) -> String {
    format!("{}|{}", key.doc_id(), spec_type)
}

/// An artifact hit by the reverse scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactedArtifact {
    /// Key of the artifact's own subject
    pub key: ResourceKey,
    /// Spec type of the impacted artifact
    pub spec_type: String,
}

/// Scan one artifact collection for documents whose impact index lists any
/// of the changed subjects
///
/// `changed` holds alias-form subject keys. Expired artifacts are skipped;
/// documents that fail to deserialize are logged and skipped rather than
/// failing the scan, since stale artifacts must never block primary writes.
pub async fn find_impacted(
    store: &dyn DocStore,
    collection: &str,
    changed: &FxHashSet<ResourceKey>,
) -> Result<Vec<ImpactedArtifact>> {
    let now = Utc::now();
    let mut hits = Vec::new();
    for (id, doc) in store.scan(collection).await? {
        let artifact = match serde_json::from_value::<ArtifactDoc>(doc) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(
                    collection = %collection,
                    artifact = %id,
                    error = %e,
                    "artifact document failed to deserialize; left out of impact scan"
                );
                continue;
            }
        };
        if artifact.is_expired(now) {
            continue;
        }
        if artifact.impact_index.iter().any(|k| changed.contains(k)) {
            hits.push(ImpactedArtifact {
                key: artifact.key,
                spec_type: artifact.spec_type,
            });
        }
    }
    hits.sort_by(|a, b| (&a.key, &a.spec_type).cmp(&(&b.key, &b.spec_type)));
    Ok(hits)
}
