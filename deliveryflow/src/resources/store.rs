//! The versioned, encrypted artifact store.

use super::EncryptionKey;
use crate::core::{digest_files, Artifact, ArtifactFiles, ArtifactLocation};
use crate::iam::Principal;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Versions kept per artifact name unless configured otherwise.
pub const DEFAULT_RETAINED_VERSIONS: usize = 10;

/// What happens to the bucket when the owning account setup is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Keep the bucket.
    Retain,
    /// Delete the bucket with the setup. The pipeline itself never does.
    Destroy,
}

#[derive(Debug, Default)]
struct History {
    latest_version: u64,
    versions: VecDeque<Arc<Artifact>>,
}

/// The single artifact container of a pipeline.
///
/// Every stage reads and writes through the same store. Writes never touch
/// existing versions; the latest version of a name wins. Only the newest
/// versions of each name are retained; version numbers keep counting up
/// after older versions are dropped.
#[derive(Debug)]
pub struct ArtifactStore {
    bucket_name: String,
    key: Arc<EncryptionKey>,
    versioned: bool,
    removal_policy: RemovalPolicy,
    retained_versions: usize,
    read_grants: BTreeSet<Principal>,
    put_grants: BTreeSet<Principal>,
    objects: DashMap<String, History>,
}

impl ArtifactStore {
    /// Creates a versioned store encrypted with `key`.
    #[must_use]
    pub fn new(bucket_name: impl Into<String>, key: Arc<EncryptionKey>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            key,
            versioned: true,
            removal_policy: RemovalPolicy::Destroy,
            retained_versions: DEFAULT_RETAINED_VERSIONS,
            read_grants: BTreeSet::new(),
            put_grants: BTreeSet::new(),
            objects: DashMap::new(),
        }
    }

    /// Sets how many versions of each artifact are kept. At least one is.
    #[must_use]
    pub fn with_retained_versions(mut self, retained: usize) -> Self {
        self.retained_versions = retained.max(1);
        self
    }

    /// Grants object reads to a principal.
    pub fn grant_read(&mut self, principal: Principal) {
        self.read_grants.insert(principal);
    }

    /// Grants object writes to a principal.
    pub fn grant_put(&mut self, principal: Principal) {
        self.put_grants.insert(principal);
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// Returns the encryption key.
    #[must_use]
    pub fn encryption_key(&self) -> &Arc<EncryptionKey> {
        &self.key
    }

    /// Returns true if object versioning is on.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// Returns the removal policy.
    #[must_use]
    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// Returns true if `principal` may read objects.
    #[must_use]
    pub fn can_read(&self, principal: &Principal) -> bool {
        self.read_grants.contains(principal)
    }

    /// Returns true if `principal` may write objects.
    #[must_use]
    pub fn can_put(&self, principal: &Principal) -> bool {
        self.put_grants.contains(principal)
    }

    /// Prepares an artifact without storing it. The draft has version 0
    /// until it is passed to [`commit`](Self::commit).
    #[must_use]
    pub fn draft(
        &self,
        name: &str,
        producing_stage: &str,
        key_prefix: &str,
        files: ArtifactFiles,
    ) -> Artifact {
        Artifact {
            name: name.to_string(),
            producing_stage: producing_stage.to_string(),
            location: ArtifactLocation {
                bucket: self.bucket_name.clone(),
                key_prefix: format!("{key_prefix}/{name}"),
            },
            version: 0,
            digest: digest_files(&files),
            files,
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Stores a draft as the next version of its name.
    pub fn commit(&self, mut draft: Artifact) -> Arc<Artifact> {
        let mut history = self.objects.entry(draft.name.clone()).or_default();
        history.latest_version += 1;
        let version = history.latest_version;
        draft.version = version;
        draft.location.key_prefix = format!("{}/{version}", draft.location.key_prefix);
        draft.created_at = crate::utils::iso_timestamp();

        let artifact = Arc::new(draft);
        history.versions.push_back(artifact.clone());
        while history.versions.len() > self.retained_versions {
            history.versions.pop_front();
        }

        debug!(
            artifact = %artifact.name,
            version,
            digest = %artifact.digest,
            "Stored artifact"
        );
        artifact
    }

    /// Stores a new version of the artifact `name`.
    pub fn put(
        &self,
        name: &str,
        producing_stage: &str,
        key_prefix: &str,
        files: ArtifactFiles,
    ) -> Arc<Artifact> {
        self.commit(self.draft(name, producing_stage, key_prefix, files))
    }

    /// Returns the latest version of an artifact.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<Arc<Artifact>> {
        self.objects
            .get(name)
            .and_then(|history| history.versions.back().cloned())
    }

    /// Returns a specific version of an artifact, if it is still retained.
    #[must_use]
    pub fn version(&self, name: &str, version: u64) -> Option<Arc<Artifact>> {
        self.objects.get(name).and_then(|history| {
            history
                .versions
                .iter()
                .find(|artifact| artifact.version == version)
                .cloned()
        })
    }

    /// Returns the number of retained versions of an artifact.
    #[must_use]
    pub fn version_count(&self, name: &str) -> usize {
        self.objects.get(name).map_or(0, |history| history.versions.len())
    }

    /// Returns the stored artifact names, sorted.
    #[must_use]
    pub fn artifact_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ArtifactStore {
        let key = EncryptionKey::new("us-east-1", "111111111111", "key-1").unwrap();
        ArtifactStore::new("pipeline-artifacts", Arc::new(key))
    }

    fn files(contents: &str) -> ArtifactFiles {
        [("ApplicationStack.template.json".to_string(), contents.as_bytes().to_vec())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_store_defaults() {
        let store = store();
        assert!(store.is_versioned());
        assert_eq!(store.removal_policy(), RemovalPolicy::Destroy);
        assert_eq!(store.encryption_key().key_id, "key-1");
    }

    #[test]
    fn test_last_writer_wins() {
        let store = store();
        let first = store.put("CdkBuildOutput", "Build", "Pipeline", files("v1"));
        let second = store.put("CdkBuildOutput", "Build", "Pipeline", files("v2"));

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(store.latest("CdkBuildOutput").unwrap().digest, second.digest);
        assert_eq!(store.version_count("CdkBuildOutput"), 2);
        assert_eq!(second.location.key_prefix, "Pipeline/CdkBuildOutput/2");
    }

    #[test]
    fn test_old_versions_are_kept_unchanged() {
        let store = store();
        let first = store.put("SourceArtifact", "Source", "Pipeline", files("a"));
        store.put("SourceArtifact", "Source", "Pipeline", files("b"));

        assert_eq!(store.version("SourceArtifact", 1).unwrap(), first);
        assert!(store.version("SourceArtifact", 0).is_none());
        assert!(store.version("SourceArtifact", 3).is_none());
    }

    #[test]
    fn test_only_recent_versions_are_retained() {
        let store = store().with_retained_versions(2);
        for contents in ["a", "b", "c"] {
            store.put("CdkBuildOutput", "Build", "Pipeline", files(contents));
        }

        assert_eq!(store.version_count("CdkBuildOutput"), 2);
        assert!(store.version("CdkBuildOutput", 1).is_none());
        assert_eq!(store.version("CdkBuildOutput", 2).unwrap().version, 2);
        assert_eq!(store.latest("CdkBuildOutput").unwrap().version, 3);

        let next = store.put("CdkBuildOutput", "Build", "Pipeline", files("d"));
        assert_eq!(next.version, 4);
        assert_eq!(next.location.key_prefix, "Pipeline/CdkBuildOutput/4");
    }

    #[test]
    fn test_draft_is_invisible_until_committed() {
        let store = store();
        let draft = store.draft("SourceArtifact", "Source", "Pipeline", files("a"));

        assert_eq!(draft.version, 0);
        assert!(store.latest("SourceArtifact").is_none());

        let stored = store.commit(draft);
        assert_eq!(stored.version, 1);
        assert_eq!(stored.location.key_prefix, "Pipeline/SourceArtifact/1");
        assert_eq!(store.latest("SourceArtifact").unwrap(), stored);
    }

    #[test]
    fn test_unknown_artifact() {
        let store = store();
        assert!(store.latest("missing").is_none());
        assert_eq!(store.version_count("missing"), 0);
        assert!(store.artifact_names().is_empty());
    }

    #[test]
    fn test_grants() {
        let mut store = store();
        let prod = Principal::account("222222222222").unwrap();
        store.grant_read(prod.clone());
        assert!(store.can_read(&prod));
        assert!(!store.can_put(&prod));
    }
}
