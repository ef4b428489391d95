//! Pipeline artifacts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Named file contents of an artifact, ordered by file name.
pub type ArtifactFiles = BTreeMap<String, Vec<u8>>;

/// Where an artifact version lives in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// The artifact store bucket.
    pub bucket: String,
    /// Object key prefix of this version.
    pub key_prefix: String,
}

/// A named bundle of files produced by one action and consumed by later
/// ones.
///
/// Artifacts are never mutated once stored: a new run writes a new version
/// under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact name, e.g. `CdkBuildOutput`.
    pub name: String,
    /// Stage whose action produced the artifact.
    pub producing_stage: String,
    /// Storage location.
    pub location: ArtifactLocation,
    /// Monotonic version within the store, starting at 1.
    pub version: u64,
    /// Hex SHA-256 over file names and contents.
    pub digest: String,
    /// The files.
    #[serde(default)]
    pub files: ArtifactFiles,
    /// When the artifact was stored (ISO 8601).
    pub created_at: String,
}

impl Artifact {
    /// Returns a file's contents by name.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Returns the file names in order.
    #[must_use]
    pub fn file_names(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }
}

/// Computes the digest of a file set.
///
/// Two file sets have the same digest exactly when they hold the same
/// names with byte-identical contents.
#[must_use]
pub fn digest_files(files: &ArtifactFiles) -> String {
    let mut hasher = Sha256::new();
    for (name, contents) in files {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((contents.len() as u64).to_be_bytes());
        hasher.update(contents);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> ArtifactFiles {
        pairs
            .iter()
            .map(|(n, c)| ((*n).to_string(), c.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_digest_is_content_sensitive() {
        let a = files(&[("ApplicationStack.template.json", "{}")]);
        let b = files(&[("ApplicationStack.template.json", "{ }")]);
        assert_ne!(digest_files(&a), digest_files(&b));
        assert_eq!(digest_files(&a), digest_files(&a.clone()));
    }

    #[test]
    fn test_digest_separates_names_from_contents() {
        let a = files(&[("ab", "c")]);
        let b = files(&[("a", "bc")]);
        assert_ne!(digest_files(&a), digest_files(&b));
    }

    #[test]
    fn test_file_lookup() {
        let artifact = Artifact {
            name: "CdkBuildOutput".to_string(),
            producing_stage: "Build".to_string(),
            location: ArtifactLocation {
                bucket: "artifacts".to_string(),
                key_prefix: "Pipeline/CdkBuildOutput/1".to_string(),
            },
            version: 1,
            digest: String::new(),
            files: files(&[("B.template.json", "b"), ("A.template.json", "a")]),
            created_at: crate::utils::iso_timestamp(),
        };

        assert_eq!(artifact.file("A.template.json"), Some("a".as_bytes()));
        assert_eq!(artifact.file("missing"), None);
        assert_eq!(artifact.file_names(), vec!["A.template.json", "B.template.json"]);
    }
}
