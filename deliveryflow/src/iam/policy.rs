//! IAM policy documents and statements.

use super::Arn;
use serde::{Deserialize, Serialize};

/// The IAM policy language version every document uses.
pub const POLICY_VERSION: &str = "2012-10-17";

/// Whether a statement allows or denies its actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Effect {
    /// Grants the actions.
    #[default]
    Allow,
    /// Denies the actions.
    Deny,
}

/// A single permission statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Statement identifier.
    pub sid: String,
    /// Allow or deny.
    pub effect: Effect,
    /// Service actions such as `s3:GetObject`.
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    /// Resources the actions apply to.
    #[serde(rename = "Resource")]
    pub resources: Vec<Arn>,
}

impl PolicyStatement {
    /// Creates an allow statement.
    #[must_use]
    pub fn allow(
        sid: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = Arn>,
    ) -> Self {
        Self {
            sid: sid.into(),
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().collect(),
        }
    }

    /// Returns true if the statement grants `action`.
    #[must_use]
    pub fn grants(&self, action: &str) -> bool {
        self.effect == Effect::Allow && self.actions.iter().any(|a| a == action)
    }

    /// Returns true if any action in the statement mutates or destroys
    /// state, or delegates a role.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.actions.iter().any(|a| is_destructive_action(a))
    }
}

/// Returns true for create/update/delete, policy-writing and role-passing
/// actions.
#[must_use]
pub fn is_destructive_action(action: &str) -> bool {
    let verb = action.split_once(':').map_or(action, |(_, verb)| verb);
    const PREFIXES: [&str; 6] = ["Create", "Delete", "Update", "Attach", "Detach", "Set"];
    PREFIXES.iter().any(|p| verb.starts_with(p))
        || (verb.starts_with("Put") && verb.contains("Policy"))
        || verb == "PassRole"
}

/// A complete IAM policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Policy language version.
    #[serde(rename = "Version")]
    pub version: String,
    /// Statements in declaration order.
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statements: Vec::new(),
        }
    }
}

impl PolicyDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a statement.
    #[must_use]
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Finds a statement by sid.
    #[must_use]
    pub fn statement(&self, sid: &str) -> Option<&PolicyStatement> {
        self.statements.iter().find(|s| s.sid == sid)
    }

    /// Returns all resources granted `action`.
    #[must_use]
    pub fn resources_for(&self, action: &str) -> Vec<&Arn> {
        self.statements
            .iter()
            .filter(|s| s.grants(action))
            .flat_map(|s| s.resources.iter())
            .collect()
    }

    /// Lists statements granting a destructive action on the universal
    /// resource.
    #[must_use]
    pub fn wildcard_violations(&self) -> Vec<&PolicyStatement> {
        self.statements
            .iter()
            .filter(|s| s.is_destructive() && s.resources.iter().any(Arn::is_unscoped))
            .collect()
    }

    /// Renders the document as IAM JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
