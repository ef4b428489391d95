//! Development account setup: the source repository, the artifact key and
//! the artifact store, with the production account's access grants.

use super::{ArtifactStore, EncryptionKey};
use crate::config::PipelineConfig;
use crate::errors::ConfigurationError;
use crate::iam::arn::{validate_name, validate_region};
use crate::iam::Principal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// The source repository feeding the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepository {
    /// Repository name.
    pub name: String,
    /// Repository description.
    pub description: String,
    /// HTTPS clone URL.
    pub clone_url_http: String,
}

impl SourceRepository {
    /// Describes a repository hosted in `region`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or region is invalid.
    pub fn new(name: &str, region: &str) -> Result<Self, ConfigurationError> {
        validate_name("repository_name", name)?;
        validate_region("region", region)?;
        Ok(Self {
            name: name.to_string(),
            description: "SfnIntegTestCodeCommitRepo".to_string(),
            clone_url_http: format!("https://git-codecommit.{region}.amazonaws.com/v1/repos/{name}"),
        })
    }
}

/// The shared resources living in the development account.
#[derive(Debug, Clone)]
pub struct DevAccountSetup {
    /// Source repository.
    pub repository: SourceRepository,
    /// Artifact key.
    pub key: Arc<EncryptionKey>,
    /// Artifact store.
    pub store: Arc<ArtifactStore>,
}

impl DevAccountSetup {
    /// Describes the development account resources.
    ///
    /// The production account root is granted decrypt on the key and read
    /// and put on the store. `extra_decrypt` principals are granted decrypt
    /// as well (the production pipeline action role).
    ///
    /// # Errors
    ///
    /// Returns an error if any identifier is missing or malformed.
    pub fn provision(
        config: &PipelineConfig,
        extra_decrypt: impl IntoIterator<Item = Principal>,
    ) -> Result<Self, ConfigurationError> {
        let repository = SourceRepository::new(&config.repository_name, &config.region)?;
        let prod_root = Principal::account(&config.prod_account_id)?;

        let mut key = EncryptionKey::new(&config.region, &config.dev_account_id, &config.kms_key_id)?;
        key.grant_decrypt(prod_root.clone());
        for principal in extra_decrypt {
            key.grant_decrypt(principal);
        }
        let key = Arc::new(key);

        validate_name("artifact_bucket_name", &config.artifact_bucket_name)?;
        let mut store = ArtifactStore::new(&config.artifact_bucket_name, key.clone());
        store.grant_put(prod_root.clone());
        store.grant_read(prod_root);

        info!(
            repository = %repository.name,
            key = %key.arn,
            bucket = %store.bucket_name(),
            "Described development account resources"
        );

        Ok(Self {
            repository,
            key,
            store: Arc::new(store),
        })
    }

    /// The setup's published outputs.
    #[must_use]
    pub fn outputs(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("CfnOutputCodePipelineKmsKeyArn".to_string(), self.key.arn.to_string()),
            ("CfnOutputRepositoryUrl".to_string(), self.repository.clone_url_http.clone()),
            ("CfnOutputArtifactBucket".to_string(), self.store.bucket_name().to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;

    #[test]
    fn test_provision_grants_prod_account() {
        let config = sample_config();
        let setup = DevAccountSetup::provision(&config, []).unwrap();
        let prod_root = Principal::account(&config.prod_account_id).unwrap();

        assert!(setup.key.can_decrypt(&prod_root));
        assert!(setup.store.can_read(&prod_root));
        assert!(setup.store.can_put(&prod_root));
        assert!(Arc::ptr_eq(setup.store.encryption_key(), &setup.key));
    }

    #[test]
    fn test_outputs() {
        let setup = DevAccountSetup::provision(&sample_config(), []).unwrap();
        let outputs = setup.outputs();

        assert_eq!(
            outputs.get("CfnOutputRepositoryUrl").map(String::as_str),
            Some("https://git-codecommit.us-east-1.amazonaws.com/v1/repos/kinesis-app")
        );
        assert_eq!(
            outputs.get("CfnOutputArtifactBucket").map(String::as_str),
            Some("pipeline-artifacts")
        );
        assert!(outputs["CfnOutputCodePipelineKmsKeyArn"].starts_with("arn:aws:kms:us-east-1:111111111111:key/"));
    }

    #[test]
    fn test_missing_repository() {
        let config = PipelineConfig {
            repository_name: String::new(),
            ..sample_config()
        };
        let err = DevAccountSetup::provision(&config, []).unwrap_err();
        assert_eq!(err.field(), "repository_name");
    }
}
