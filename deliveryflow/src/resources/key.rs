//! The artifact encryption key.

use crate::errors::ConfigurationError;
use crate::iam::{Arn, Principal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Alias every artifact key is created under.
pub const ARTIFACT_KEY_ALIAS: &str = "key/artifact-key";

/// The single key protecting a pipeline's artifact store.
///
/// Rotation replaces the backing material only; the key id and ARN never
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    /// Key id.
    pub key_id: String,
    /// Key ARN.
    pub arn: Arn,
    /// Key alias.
    pub alias: String,
    /// Whether automatic rotation is on.
    pub rotation_enabled: bool,
    /// Number of rotations performed.
    pub rotations: u32,
    /// Principals granted decrypt.
    pub decrypt_grants: BTreeSet<Principal>,
}

impl EncryptionKey {
    /// Describes the key owned by `account_id` in `region`.
    ///
    /// # Errors
    ///
    /// Returns an error if any identifier is missing or malformed.
    pub fn new(region: &str, account_id: &str, key_id: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            key_id: key_id.to_string(),
            arn: Arn::kms_key(region, account_id, key_id)?,
            alias: ARTIFACT_KEY_ALIAS.to_string(),
            rotation_enabled: true,
            rotations: 0,
            decrypt_grants: BTreeSet::new(),
        })
    }

    /// Grants decrypt to a principal. Granting twice is a no-op.
    pub fn grant_decrypt(&mut self, principal: Principal) {
        debug!(key = %self.arn, principal = %principal, "Granting decrypt");
        self.decrypt_grants.insert(principal);
    }

    /// Returns true if `principal` may decrypt with the key.
    #[must_use]
    pub fn can_decrypt(&self, principal: &Principal) -> bool {
        self.decrypt_grants.contains(principal)
    }

    /// Records a rotation of the key material.
    pub fn rotate(&mut self) {
        self.rotations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_defaults() {
        let key = EncryptionKey::new("us-east-1", "111111111111", "key-1").unwrap();
        assert!(key.rotation_enabled);
        assert_eq!(key.alias, "key/artifact-key");
        assert!(key.decrypt_grants.is_empty());
    }

    #[test]
    fn test_grants_are_idempotent() {
        let mut key = EncryptionKey::new("us-east-1", "111111111111", "key-1").unwrap();
        let prod = Principal::account("222222222222").unwrap();
        key.grant_decrypt(prod.clone());
        key.grant_decrypt(prod.clone());

        assert_eq!(key.decrypt_grants.len(), 1);
        assert!(key.can_decrypt(&prod));
        assert!(!key.can_decrypt(&Principal::account("333333333333").unwrap()));
    }

    #[test]
    fn test_rotation_keeps_identity() {
        let mut key = EncryptionKey::new("us-east-1", "111111111111", "key-1").unwrap();
        let arn = key.arn.clone();
        key.rotate();
        key.rotate();
        assert_eq!(key.arn, arn);
        assert_eq!(key.rotations, 2);
    }

    #[test]
    fn test_missing_key_id() {
        let err = EncryptionKey::new("us-east-1", "111111111111", "").unwrap_err();
        assert_eq!(err.field(), "kms_key_id");
    }
}
