//! Trust policy builder.
//!
//! Produces the two permission sets handed to cross-account roles: the
//! deployment role (full lifecycle over the resources the application and
//! test stacks provision) and the pipeline action role (artifact store,
//! key, and create/update of the named stacks). Every resource is an ARN
//! derived from the account, region and names given; the universal `*`
//! resource is only used for list calls that cannot be scoped.

use super::{AccountRoles, Arn, PolicyDocument, PolicyStatement, Principal, Role, RolePurpose};
use super::arn::{validate_account_id, validate_name, validate_region};
use super::role::CLOUDFORMATION_SERVICE;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const ARTIFACT_STORE_ACTIONS: [&str; 6] = [
    "s3:GetBucketLocation",
    "s3:GetObject",
    "s3:ListBucket",
    "s3:PutObject",
    "s3:DeleteObject",
    "s3:DeleteObjectVersion",
];

const ARTIFACT_KEY_ACTIONS: [&str; 6] = [
    "kms:DescribeKey",
    "kms:GenerateDataKey",
    "kms:Encrypt",
    "kms:ReEncryptFrom",
    "kms:ReEncryptTo",
    "kms:Decrypt",
];

const STACK_DEPLOY_ACTIONS: [&str; 3] = [
    "cloudformation:DescribeStacks",
    "cloudformation:CreateStack",
    "cloudformation:UpdateStack",
];

/// The resource names a permission set is scoped to.
///
/// Empty lists fall back to name patterns derived from the owning stacks,
/// since generated physical names start with the stack name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNames {
    /// The artifact store bucket.
    pub artifact_bucket: String,
    /// The artifact key id.
    pub kms_key_id: String,
    /// Account owning the artifact key (the development account).
    pub key_account_id: String,
    /// Region of the artifact key.
    pub key_region: String,
    /// Stacks the pipeline deploys (application and test).
    pub stacks: Vec<String>,
    /// Kinesis data streams.
    #[serde(default)]
    pub streams: Vec<String>,
    /// Firehose delivery streams.
    #[serde(default)]
    pub delivery_streams: Vec<String>,
    /// Lambda functions.
    #[serde(default)]
    pub functions: Vec<String>,
    /// Log groups.
    #[serde(default)]
    pub log_groups: Vec<String>,
    /// Step Functions state machines.
    #[serde(default)]
    pub state_machines: Vec<String>,
    /// Buckets the application stack creates.
    #[serde(default)]
    pub output_buckets: Vec<String>,
}

impl ResourceNames {
    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_name("artifact_bucket_name", &self.artifact_bucket)?;
        validate_name("kms_key_id", &self.kms_key_id)?;
        validate_account_id("dev_account_id", &self.key_account_id)?;
        validate_region("region", &self.key_region)?;
        if self.stacks.is_empty() {
            return Err(ConfigurationError::missing("stacks"));
        }
        for stack in &self.stacks {
            validate_name("stack_name", stack)?;
        }
        Ok(())
    }

    fn key_arn(&self) -> Result<Arn, ConfigurationError> {
        Arn::kms_key(&self.key_region, &self.key_account_id, &self.kms_key_id)
    }
}

/// Builds scoped permission sets and roles for one target account.
#[derive(Debug, Clone)]
pub struct TrustPolicyBuilder {
    account_id: String,
    region: String,
    names: ResourceNames,
}

impl TrustPolicyBuilder {
    /// Creates a builder for roles living in `account_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the account, region or any required resource
    /// name is missing or malformed.
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        names: ResourceNames,
    ) -> Result<Self, ConfigurationError> {
        let account_id = account_id.into();
        let region = region.into();
        validate_account_id("account_id", &account_id)?;
        validate_region("region", &region)?;
        names.validate()?;
        Ok(Self {
            account_id,
            region,
            names,
        })
    }

    /// Returns the target account.
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Permission set for the deployment role whose ARN is `own_arn`.
    ///
    /// # Errors
    ///
    /// Returns an error if any ARN cannot be constructed.
    pub fn deployment_permissions(&self, own_arn: &Arn) -> Result<PolicyDocument, ConfigurationError> {
        let (account, region) = (self.account_id.as_str(), self.region.as_str());
        let stacks = &self.names.stacks;

        let mut stack_iam = Vec::new();
        for stack in stacks {
            stack_iam.push(Arn::iam_stack_roles(account, stack)?);
            stack_iam.push(Arn::iam_stack_policies(account, stack)?);
        }

        let streams = self.scoped(&self.names.streams, |name| {
            Arn::kinesis_stream(region, account, name)
        }, |stack| Arn::stack_scoped("kinesis", "stream/", region, account, stack))?;

        let delivery_streams = self.scoped(&self.names.delivery_streams, |name| {
            Arn::firehose_delivery_stream(region, account, name)
        }, |stack| Arn::stack_scoped("firehose", "deliverystream/", region, account, stack))?;

        let functions = self.scoped(&self.names.functions, |name| {
            Arn::lambda_function(region, account, name)
        }, |stack| Arn::stack_scoped("lambda", "function:", region, account, stack))?;

        let log_groups = self.scoped(&self.names.log_groups, |name| {
            Arn::log_group(region, account, name)
        }, |stack| Arn::stack_scoped("logs", "log-group:/aws/lambda/", region, account, stack))?;

        let state_machines = self.scoped(&self.names.state_machines, |name| {
            Arn::state_machine(region, account, name)
        }, |stack| Arn::stack_scoped("states", "stateMachine:", region, account, stack))?;

        let output_buckets = self.scoped(&self.names.output_buckets, Arn::s3_bucket, Arn::s3_stack_buckets)?;

        let doc = PolicyDocument::new()
            .with_statement(PolicyStatement::allow(
                "PassDeploymentRole",
                ["iam:PassRole"],
                [own_arn.clone()],
            ))
            .with_statement(PolicyStatement::allow(
                "ManageStackRoles",
                [
                    "iam:GetRole",
                    "iam:GetRolePolicy",
                    "iam:PutRolePolicy",
                    "iam:CreateRole",
                    "iam:DeleteRole",
                    "iam:DeleteRolePolicy",
                    "iam:DetachRolePolicy",
                    "iam:AttachRolePolicy",
                    "iam:GetPolicy",
                    "iam:CreatePolicy",
                    "iam:DeletePolicy",
                    "iam:ListPolicyVersions",
                ],
                stack_iam,
            ))
            .with_statement(PolicyStatement::allow(
                "ManageStreams",
                [
                    "kinesis:CreateStream",
                    "kinesis:DescribeStreamSummary",
                    "kinesis:StartStreamEncryption",
                    "kinesis:AddTagsToStream",
                    "kinesis:UpdateShardCount",
                    "kinesis:DeleteStream",
                ],
                streams,
            ))
            .with_statement(PolicyStatement::allow(
                "ManageDeliveryStreams",
                [
                    "firehose:DescribeDeliveryStream",
                    "firehose:CreateDeliveryStream",
                    "firehose:UpdateDestination",
                    "firehose:DeleteDeliveryStream",
                ],
                delivery_streams,
            ))
            .with_statement(PolicyStatement::allow(
                "ManageFunctions",
                [
                    "lambda:GetFunction",
                    "lambda:CreateFunction",
                    "lambda:UpdateFunctionCode",
                    "lambda:UpdateFunctionConfiguration",
                    "lambda:DeleteFunction",
                ],
                functions,
            ))
            .with_statement(PolicyStatement::allow(
                "ManageOutputBuckets",
                [
                    "s3:CreateBucket",
                    "s3:DeleteBucket",
                    "s3:PutBucketTagging",
                    "s3:DeleteBucketTagging",
                    "s3:PutBucketVersioning",
                    "s3:SetBucketEncryption",
                    "s3:GetEncryptionConfiguration",
                    "s3:PutEncryptionConfiguration",
                ],
                output_buckets,
            ))
            .with_statement(self.artifact_store_statement()?)
            .with_statement(self.artifact_key_statement()?)
            .with_statement(PolicyStatement::allow(
                "ManageLogGroups",
                [
                    "logs:CreateLogGroup",
                    "logs:DeleteLogGroup",
                    "logs:PutRetentionPolicy",
                    "logs:DeleteRetentionPolicy",
                    "logs:CreateLogStream",
                    "logs:DeleteLogStream",
                    "logs:PutLogEvents",
                ],
                log_groups,
            ))
            .with_statement(PolicyStatement::allow(
                "ManageStateMachines",
                [
                    "states:CreateStateMachine",
                    "states:DescribeStateMachine",
                    "states:UpdateStateMachine",
                    "states:TagResource",
                    "states:DeleteStateMachine",
                ],
                state_machines,
            ))
            // List calls do not support resource-level scoping.
            .with_statement(PolicyStatement::allow(
                "ListResources",
                [
                    "kinesis:ListStreams",
                    "firehose:ListDeliveryStreams",
                    "logs:DescribeLogGroups",
                    "states:ListStateMachines",
                ],
                [Arn::any()],
            ));

        debug!(
            account_id = %self.account_id,
            statements = doc.statements.len(),
            "Built deployment permissions"
        );
        Ok(doc)
    }

    /// Permission set for the pipeline action role. It may pass only
    /// `deployment_role_arn` and can never delete a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if any ARN cannot be constructed.
    pub fn action_permissions(&self, deployment_role_arn: &Arn) -> Result<PolicyDocument, ConfigurationError> {
        let stacks = self
            .names
            .stacks
            .iter()
            .map(|stack| Arn::cloudformation_stack(&self.region, &self.account_id, stack))
            .collect::<Result<Vec<_>, _>>()?;

        let doc = PolicyDocument::new()
            .with_statement(self.artifact_store_statement()?)
            .with_statement(self.artifact_key_statement()?)
            .with_statement(PolicyStatement::allow("StackDeployment", STACK_DEPLOY_ACTIONS, stacks))
            .with_statement(PolicyStatement::allow(
                "PassDeploymentRole",
                ["iam:PassRole"],
                [deployment_role_arn.clone()],
            ));

        debug!(
            account_id = %self.account_id,
            statements = doc.statements.len(),
            "Built pipeline action permissions"
        );
        Ok(doc)
    }

    /// Builds the account's role pair.
    ///
    /// The deployment role is trusted by the deployment service; the action
    /// role is trusted by the root of `trusted_account_id` (the account the
    /// pipeline runs in).
    ///
    /// # Errors
    ///
    /// Returns an error if a role name or the trusted account is invalid.
    pub fn build_roles(
        &self,
        action_role_name: &str,
        deployment_role_name: &str,
        trusted_account_id: &str,
    ) -> Result<AccountRoles, ConfigurationError> {
        let deployment_arn = Arn::iam_role(&self.account_id, deployment_role_name)?;
        let action_arn = Arn::iam_role(&self.account_id, action_role_name)?;

        let deployment_role = Role {
            name: deployment_role_name.to_string(),
            account_id: self.account_id.clone(),
            permissions: self.deployment_permissions(&deployment_arn)?,
            arn: deployment_arn.clone(),
            purpose: RolePurpose::Deployment,
            trusted_by: Principal::Service(CLOUDFORMATION_SERVICE.to_string()),
        };

        let action_role = Role {
            name: action_role_name.to_string(),
            account_id: self.account_id.clone(),
            permissions: self.action_permissions(&deployment_arn)?,
            arn: action_arn,
            purpose: RolePurpose::PipelineAction,
            trusted_by: Principal::account(trusted_account_id)?,
        };

        Ok(AccountRoles {
            account_id: self.account_id.clone(),
            action_role: Arc::new(action_role),
            deployment_role: Arc::new(deployment_role),
        })
    }

    fn artifact_store_statement(&self) -> Result<PolicyStatement, ConfigurationError> {
        Ok(PolicyStatement::allow(
            "ArtifactStoreAccess",
            ARTIFACT_STORE_ACTIONS,
            [
                Arn::s3_bucket(&self.names.artifact_bucket)?,
                Arn::s3_objects(&self.names.artifact_bucket)?,
            ],
        ))
    }

    fn artifact_key_statement(&self) -> Result<PolicyStatement, ConfigurationError> {
        Ok(PolicyStatement::allow(
            "ArtifactKeyAccess",
            ARTIFACT_KEY_ACTIONS,
            [self.names.key_arn()?],
        ))
    }

    fn scoped<N, P>(&self, named: &[String], by_name: N, by_stack: P) -> Result<Vec<Arn>, ConfigurationError>
    where
        N: Fn(&str) -> Result<Arn, ConfigurationError>,
        P: Fn(&str) -> Result<Arn, ConfigurationError>,
    {
        if named.is_empty() {
            self.names.stacks.iter().map(|stack| by_stack(stack.as_str())).collect()
        } else {
            named.iter().map(|name| by_name(name.as_str())).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEV: &str = "111111111111";
    const PROD: &str = "222222222222";

    fn names() -> ResourceNames {
        ResourceNames {
            artifact_bucket: "pipeline-artifacts".to_string(),
            kms_key_id: "key-1234".to_string(),
            key_account_id: DEV.to_string(),
            key_region: "us-east-1".to_string(),
            stacks: vec!["KinesisApplicationStack".to_string(), "IntTestSfnStack".to_string()],
            state_machines: vec!["DevSfnStackStateMachine".to_string()],
            ..Default::default()
        }
    }

    fn fully_named() -> ResourceNames {
        ResourceNames {
            streams: vec!["input-stream".to_string()],
            delivery_streams: vec!["output-firehose".to_string()],
            functions: vec!["transform".to_string()],
            log_groups: vec!["/aws/lambda/transform".to_string()],
            output_buckets: vec!["results-bucket".to_string()],
            ..names()
        }
    }

    #[test]
    fn test_missing_account_fails_fast() {
        let err = TrustPolicyBuilder::new("", "us-east-1", names()).unwrap_err();
        assert_eq!(err, ConfigurationError::missing("account_id"));

        let err = TrustPolicyBuilder::new(PROD, "us-east-1", ResourceNames {
            kms_key_id: String::new(),
            ..names()
        })
        .unwrap_err();
        assert_eq!(err.field(), "kms_key_id");

        let err = TrustPolicyBuilder::new(PROD, "us-east-1", ResourceNames {
            stacks: Vec::new(),
            ..names()
        })
        .unwrap_err();
        assert_eq!(err.field(), "stacks");
    }

    #[test]
    fn test_deployment_pass_role_is_self_only() {
        let builder = TrustPolicyBuilder::new(PROD, "us-east-1", names()).unwrap();
        let roles = builder.build_roles("PipelineRole", "DeployRole", DEV).unwrap();

        let passable = roles.deployment_role.permissions.resources_for("iam:PassRole");
        assert_eq!(passable, vec![&roles.deployment_role.arn]);
    }

    #[test]
    fn test_action_role_never_deletes_stacks() {
        let builder = TrustPolicyBuilder::new(PROD, "us-east-1", names()).unwrap();
        let roles = builder.build_roles("PipelineRole", "DeployRole", DEV).unwrap();
        let perms = &roles.action_role.permissions;

        assert!(perms.resources_for("cloudformation:DeleteStack").is_empty());
        let stacks: Vec<&str> = perms
            .resources_for("cloudformation:UpdateStack")
            .into_iter()
            .map(Arn::as_str)
            .collect();
        assert_eq!(
            stacks,
            vec![
                "arn:aws:cloudformation:us-east-1:222222222222:stack/KinesisApplicationStack/*",
                "arn:aws:cloudformation:us-east-1:222222222222:stack/IntTestSfnStack/*",
            ]
        );
        assert_eq!(
            perms.resources_for("iam:PassRole"),
            vec![&roles.deployment_role.arn]
        );
    }

    #[test]
    fn test_key_is_owned_by_dev_account() {
        let builder = TrustPolicyBuilder::new(PROD, "us-east-1", names()).unwrap();
        let doc = builder
            .action_permissions(&Arn::iam_role(PROD, "DeployRole").unwrap())
            .unwrap();
        let keys = doc.resources_for("kms:Decrypt");
        assert_eq!(keys[0].as_str(), "arn:aws:kms:us-east-1:111111111111:key/key-1234");
    }

    #[test]
    fn test_trust_relationships() {
        let builder = TrustPolicyBuilder::new(PROD, "us-east-1", names()).unwrap();
        let roles = builder.build_roles("PipelineRole", "DeployRole", DEV).unwrap();

        assert!(roles.action_role.trusts(&Principal::account(DEV).unwrap()));
        assert!(roles
            .deployment_role
            .trusts(&Principal::Service(CLOUDFORMATION_SERVICE.to_string())));
        assert_eq!(roles.action_role.purpose, RolePurpose::PipelineAction);
    }

    #[test]
    fn test_no_unscoped_destructive_grants() {
        for resource_names in [names(), fully_named()] {
            let builder = TrustPolicyBuilder::new(PROD, "us-east-1", resource_names).unwrap();
            let roles = builder.build_roles("PipelineRole", "DeployRole", DEV).unwrap();
            assert!(roles.deployment_role.permissions.wildcard_violations().is_empty());
            assert!(roles.action_role.permissions.wildcard_violations().is_empty());
        }
    }

    #[test]
    fn test_named_resources_are_used_verbatim() {
        let builder = TrustPolicyBuilder::new(PROD, "us-east-1", fully_named()).unwrap();
        let doc = builder
            .deployment_permissions(&Arn::iam_role(PROD, "DeployRole").unwrap())
            .unwrap();

        let as_strs = |action: &str| -> Vec<String> {
            doc.resources_for(action).into_iter().map(ToString::to_string).collect()
        };

        assert_eq!(
            as_strs("kinesis:DeleteStream"),
            vec!["arn:aws:kinesis:us-east-1:222222222222:stream/input-stream"]
        );
        assert_eq!(
            as_strs("firehose:DeleteDeliveryStream"),
            vec!["arn:aws:firehose:us-east-1:222222222222:deliverystream/output-firehose"]
        );
        assert_eq!(as_strs("s3:DeleteBucket"), vec!["arn:aws:s3:::results-bucket"]);
        assert_eq!(
            as_strs("states:DeleteStateMachine"),
            vec!["arn:aws:states:us-east-1:222222222222:stateMachine:DevSfnStackStateMachine"]
        );

        // With every name supplied, the only wildcards on destructive grants
        // are the artifact bucket's object path and the named log group's
        // streams.
        let allowed = [
            Arn::s3_objects("pipeline-artifacts").unwrap(),
            Arn::log_group("us-east-1", PROD, "/aws/lambda/transform").unwrap(),
        ];
        for statement in doc.statements.iter().filter(|s| s.is_destructive()) {
            if statement.sid == "ManageStackRoles" {
                continue;
            }
            for resource in &statement.resources {
                assert!(
                    !resource.as_str().contains('*') || allowed.contains(resource),
                    "{} grants {}",
                    statement.sid,
                    resource
                );
            }
        }
    }

    #[test]
    fn test_unnamed_resources_fall_back_to_stack_prefixes() {
        let builder = TrustPolicyBuilder::new(PROD, "us-east-1", names()).unwrap();
        let doc = builder
            .deployment_permissions(&Arn::iam_role(PROD, "DeployRole").unwrap())
            .unwrap();
        let streams: Vec<String> = doc
            .resources_for("kinesis:CreateStream")
            .into_iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            streams,
            vec![
                "arn:aws:kinesis:us-east-1:222222222222:stream/KinesisApplicationStack-*",
                "arn:aws:kinesis:us-east-1:222222222222:stream/IntTestSfnStack-*",
            ]
        );
    }
}
