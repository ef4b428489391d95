//! Identity and access: ARNs, policy documents, roles, and the trust
//! policy builder that scopes cross-account permissions.

pub mod arn;
mod builder;
mod policy;
mod role;

pub use arn::Arn;
pub use builder::{ResourceNames, TrustPolicyBuilder};
pub use policy::{is_destructive_action, Effect, PolicyDocument, PolicyStatement, POLICY_VERSION};
pub use role::{AccountRoles, Principal, Role, RolePurpose, CLOUDFORMATION_SERVICE};
