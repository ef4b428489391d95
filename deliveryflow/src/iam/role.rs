//! Principals and roles.
//!
//! A [`Role`] is a capability: an identity, who may assume it, and the
//! scoped permission set it carries. Stage definitions hold roles by
//! `Arc` so that every action targeting the same account shares one value.

use super::{Arn, PolicyDocument};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The service principal that assumes deployment roles.
pub const CLOUDFORMATION_SERVICE: &str = "cloudformation.amazonaws.com";

/// An entity that can be trusted to assume a role or be granted access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Principal {
    /// A service principal, e.g. `cloudformation.amazonaws.com`.
    Service(String),
    /// Every identity in an account, via the account root ARN.
    AccountRoot(Arn),
    /// A single role.
    Role(Arn),
}

impl Principal {
    /// The root principal of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account id is invalid.
    pub fn account(account_id: &str) -> Result<Self, ConfigurationError> {
        Ok(Self::AccountRoot(Arn::account_root(account_id)?))
    }

    /// Returns the account the principal belongs to, if any.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Service(_) => None,
            Self::AccountRoot(arn) | Self::Role(arn) => arn.account_id(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(name) => write!(f, "service:{name}"),
            Self::AccountRoot(arn) | Self::Role(arn) => write!(f, "{arn}"),
        }
    }
}

/// What a role is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePurpose {
    /// Assumed by pipeline actions to reach pipeline resources.
    PipelineAction,
    /// Assumed by the deployment engine to create and update stacks.
    Deployment,
}

impl fmt::Display for RolePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipelineAction => write!(f, "pipeline_action"),
            Self::Deployment => write!(f, "deployment"),
        }
    }
}

/// An assumable identity with its trust and permission policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name.
    pub name: String,
    /// Account that owns the role.
    pub account_id: String,
    /// Role ARN.
    pub arn: Arn,
    /// Purpose of the role.
    pub purpose: RolePurpose,
    /// Who may assume the role.
    pub trusted_by: Principal,
    /// What the role may do.
    pub permissions: PolicyDocument,
}

impl Role {
    /// Returns true if `principal` may assume this role.
    #[must_use]
    pub fn trusts(&self, principal: &Principal) -> bool {
        &self.trusted_by == principal
    }

    /// Renders the trust policy (assume-role document) as IAM JSON.
    #[must_use]
    pub fn trust_policy(&self) -> serde_json::Value {
        let principal = match &self.trusted_by {
            Principal::Service(name) => serde_json::json!({ "Service": name }),
            Principal::AccountRoot(arn) | Principal::Role(arn) => {
                serde_json::json!({ "AWS": arn.as_str() })
            }
        };
        serde_json::json!({
            "Version": super::POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": principal,
                "Action": "sts:AssumeRole",
            }],
        })
    }
}

/// The role pair an account provides to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRoles {
    /// Account the roles live in.
    pub account_id: String,
    /// Role the pipeline assumes to act in the account.
    pub action_role: Arc<Role>,
    /// Role the deployment engine assumes to change stacks.
    pub deployment_role: Arc<Role>,
}

impl AccountRoles {
    /// Renders both roles for inspection.
    #[must_use]
    pub fn to_manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "account_id": self.account_id,
            "action_role": role_manifest(&self.action_role),
            "deployment_role": role_manifest(&self.deployment_role),
        })
    }
}

fn role_manifest(role: &Role) -> serde_json::Value {
    serde_json::json!({
        "name": role.name,
        "arn": role.arn,
        "purpose": role.purpose,
        "trust_policy": role.trust_policy(),
        "permissions": role.permissions.to_json(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_account() {
        let principal = Principal::account("222222222222").unwrap();
        assert_eq!(principal.account_id(), Some("222222222222"));
        assert_eq!(principal.to_string(), "arn:aws:iam::222222222222:root");
        assert!(Principal::account("").is_err());
    }

    #[test]
    fn test_trust_policy_json() {
        let role = Role {
            name: "Deployer".to_string(),
            account_id: "111111111111".to_string(),
            arn: Arn::iam_role("111111111111", "Deployer").unwrap(),
            purpose: RolePurpose::Deployment,
            trusted_by: Principal::Service(CLOUDFORMATION_SERVICE.to_string()),
            permissions: PolicyDocument::new(),
        };

        let trust = role.trust_policy();
        assert_eq!(trust["Statement"][0]["Principal"]["Service"], CLOUDFORMATION_SERVICE);
        assert_eq!(trust["Statement"][0]["Action"], "sts:AssumeRole");
        assert!(role.trusts(&Principal::Service(CLOUDFORMATION_SERVICE.to_string())));
    }
}
