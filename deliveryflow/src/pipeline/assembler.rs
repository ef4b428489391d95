//! Stage graph assembly for the cross-account release pipeline.

use super::variables::variable_reference;
use super::{ActionSpec, DeployAction, PipelineBuilder, PipelineDefinition, StageSpec, TemplatePath};
use crate::build::{template_file_name, BuildSpec};
use crate::config::PipelineConfig;
use crate::errors::DeliveryError;
use crate::iam::{AccountRoles, Arn, Principal, ResourceNames, TrustPolicyBuilder};
use crate::resources::DevAccountSetup;
use std::sync::Arc;
use tracing::info;

/// Stage names of the release pipeline, in order.
pub const STAGE_SOURCE: &str = "Source";
/// Build stage.
pub const STAGE_BUILD: &str = "Build";
/// Development deployment stage.
pub const STAGE_DEPLOY_DEV: &str = "Deploy_to_Dev";
/// Integration test stage.
pub const STAGE_INTEGRATION_TEST: &str = "Integration_Test";
/// Manual approval stage.
pub const STAGE_MANUAL_APPROVE: &str = "Manual_Approve";
/// Production deployment stage.
pub const STAGE_DEPLOY_PROD: &str = "Deploy_to_Prod";

/// Artifact emitted by the source stage.
pub const SOURCE_ARTIFACT: &str = "SourceArtifact";
/// Artifact emitted by the build stage.
pub const BUILD_ARTIFACT: &str = "CdkBuildOutput";

/// Capabilities acknowledged by every deployment.
pub const DEPLOY_CAPABILITIES: [&str; 2] = ["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"];

/// Wires the six-stage release pipeline:
/// Source, Build, Deploy_to_Dev, Integration_Test, Manual_Approve,
/// Deploy_to_Prod.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageGraphAssembler;

impl StageGraphAssembler {
    /// Assembles the pipeline described by `config`.
    ///
    /// Assembly is pure: the same configuration always yields the same
    /// definition.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any identifier needed for a trust
    /// boundary is missing or malformed, or a validation error if the
    /// resulting graph breaks a contract.
    pub fn assemble(config: &PipelineConfig) -> Result<PipelineDefinition, DeliveryError> {
        config.validate()?;

        let dev_roles = TrustPolicyBuilder::new(
            &config.dev_account_id,
            &config.region,
            resource_names(config, true),
        )?
        .build_roles(
            &config.pipeline_action_role_name,
            &config.deployment_role_name,
            &config.dev_account_id,
        )?;

        let prod_roles = TrustPolicyBuilder::new(
            &config.prod_account_id,
            &config.region,
            resource_names(config, false),
        )?
        .build_roles(
            &config.prod_pipeline_action_role_name,
            &config.prod_deployment_role_name,
            &config.dev_account_id,
        )?;

        let setup = DevAccountSetup::provision(
            config,
            [Principal::Role(prod_roles.action_role.arn.clone())],
        )?;
        let build_spec = Arc::new(BuildSpec::synth_and_scan(setup.key.arn.clone())?);

        let graph = PipelineBuilder::new(&config.pipeline_name, &config.dev_account_id)
            .stage(StageSpec::new(STAGE_SOURCE).with_action(ActionSpec::source(
                "CodeCommit_Source",
                &config.repository_name,
                &config.branch,
                SOURCE_ARTIFACT,
            )))?
            .stage(
                StageSpec::new(STAGE_BUILD)
                    .after(STAGE_SOURCE)
                    .with_action(ActionSpec::build("CDK_Synth", SOURCE_ARTIFACT, BUILD_ARTIFACT)),
            )?
            .stage(
                StageSpec::new(STAGE_DEPLOY_DEV).after(STAGE_BUILD).with_action(
                    ActionSpec::deploy("Deploy_Application", application_deploy(config, &dev_roles))
                        .with_namespace(&config.application_namespace),
                ),
            )?
            .stage(
                StageSpec::new(STAGE_INTEGRATION_TEST)
                    .after(STAGE_DEPLOY_DEV)
                    .with_action(
                        ActionSpec::deploy(
                            "Deploy_Integration_Test_StateMachine",
                            test_deploy(config, &dev_roles),
                        )
                        .with_namespace(&config.test_namespace)
                        .with_run_order(1),
                    )
                    .with_action(
                        ActionSpec::invoke(
                            "Invoke_StateMachine",
                            Arn::state_machine(
                                &config.region,
                                &config.dev_account_id,
                                &config.test_state_machine_name,
                            )?,
                            invoke_input(config),
                        )
                        .with_run_order(2),
                    ),
            )?
            .stage(
                StageSpec::new(STAGE_MANUAL_APPROVE)
                    .after(STAGE_INTEGRATION_TEST)
                    .with_action(ActionSpec::approve("Deploy_to_Prod", config.approval_timeout())),
            )?
            .stage(
                StageSpec::new(STAGE_DEPLOY_PROD).after(STAGE_MANUAL_APPROVE).with_action(
                    ActionSpec::deploy("Deploy_Firehose_Prod", application_deploy(config, &prod_roles)),
                ),
            )?
            .build()?;

        info!(
            pipeline = %graph.name(),
            stages = graph.stages().len(),
            actions = graph.action_count(),
            "Assembled pipeline"
        );

        Ok(PipelineDefinition {
            graph,
            branch: config.branch.clone(),
            setup,
            dev_roles,
            prod_roles,
            build_spec,
        })
    }
}

/// The fixed invoke payload: the two published outputs by reference plus
/// the literal wait and count parameters.
#[must_use]
pub fn invoke_input(config: &PipelineConfig) -> serde_json::Value {
    let mut input = serde_json::Map::new();
    input.insert(
        config.stream_output_name.clone(),
        serde_json::json!(variable_reference(&config.application_namespace, &config.stream_output_name)),
    );
    input.insert(
        config.bucket_output_name.clone(),
        serde_json::json!(variable_reference(&config.application_namespace, &config.bucket_output_name)),
    );
    input.insert("waitSeconds".to_string(), serde_json::json!(config.wait_seconds));
    input.insert("record_count".to_string(), serde_json::json!(config.record_count));
    serde_json::Value::Object(input)
}

fn application_deploy(config: &PipelineConfig, roles: &AccountRoles) -> DeployAction {
    DeployAction {
        stack_name: config.application_stack_name.clone(),
        template: TemplatePath::new(
            BUILD_ARTIFACT,
            template_file_name(&config.application_template_stack),
        ),
        region: config.region.clone(),
        roles: roles.clone(),
        capabilities: capabilities(),
    }
}

fn test_deploy(config: &PipelineConfig, roles: &AccountRoles) -> DeployAction {
    DeployAction {
        stack_name: config.test_stack_name.clone(),
        template: TemplatePath::new(BUILD_ARTIFACT, template_file_name(&config.test_template_stack)),
        region: config.region.clone(),
        roles: roles.clone(),
        capabilities: capabilities(),
    }
}

fn capabilities() -> Vec<String> {
    DEPLOY_CAPABILITIES.iter().map(ToString::to_string).collect()
}

/// Scoping for one account. The development account deploys both stacks
/// and hosts the test workflow; production only receives the application.
fn resource_names(config: &PipelineConfig, dev: bool) -> ResourceNames {
    let scoped = &config.resources;
    let (stacks, state_machines) = if dev {
        (
            vec![config.application_stack_name.clone(), config.test_stack_name.clone()],
            vec![config.test_state_machine_name.clone()],
        )
    } else {
        (vec![config.application_stack_name.clone()], Vec::new())
    };
    ResourceNames {
        artifact_bucket: config.artifact_bucket_name.clone(),
        kms_key_id: config.kms_key_id.clone(),
        key_account_id: config.dev_account_id.clone(),
        key_region: config.region.clone(),
        stacks,
        streams: scoped.stream_names.clone(),
        delivery_streams: scoped.delivery_stream_names.clone(),
        functions: scoped.function_names.clone(),
        log_groups: scoped.log_group_names.clone(),
        state_machines,
        output_buckets: scoped.output_bucket_names.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigurationError;
    use crate::iam::RolePurpose;
    use crate::pipeline::ActionKind;
    use crate::testing::sample_config;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_six_stage_order() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();
        assert_eq!(
            definition.graph.stage_names(),
            vec![
                "Source",
                "Build",
                "Deploy_to_Dev",
                "Integration_Test",
                "Manual_Approve",
                "Deploy_to_Prod"
            ]
        );
        assert_eq!(definition.graph.action_count(), 7);
        assert_eq!(definition.name(), "KinesisApplicationPipeline");
    }

    #[test]
    fn test_integration_stage_orders_deploy_before_invoke() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();
        let stage = definition.graph.stage(STAGE_INTEGRATION_TEST).unwrap();

        let deploy = stage.action("Deploy_Integration_Test_StateMachine").unwrap();
        let invoke = stage.action("Invoke_StateMachine").unwrap();
        assert!(deploy.run_order < invoke.run_order);
        assert_eq!(deploy.namespace.as_deref(), Some("Deploy_Integration_Test_Sfn_Ns"));

        let ActionKind::Invoke {
            state_machine_arn,
            input,
        } = &invoke.kind
        else {
            panic!("expected an invoke action");
        };
        assert_eq!(
            state_machine_arn.as_str(),
            "arn:aws:states:us-east-1:111111111111:stateMachine:DevSfnStackStateMachine"
        );
        assert_eq!(
            input,
            &serde_json::json!({
                "KinesisInputStreamName": "#{Deploy_Application_Ns.KinesisInputStreamName}",
                "FirehoseOutputBucket": "#{Deploy_Application_Ns.FirehoseOutputBucket}",
                "waitSeconds": "30",
                "record_count": 1000,
            })
        );
    }

    #[test]
    fn test_deployments_use_account_roles() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();

        let dev = definition
            .graph
            .stage(STAGE_DEPLOY_DEV)
            .and_then(|s| s.action("Deploy_Application"))
            .and_then(ActionSpec::as_deploy)
            .unwrap();
        let prod = definition
            .graph
            .stage(STAGE_DEPLOY_PROD)
            .and_then(|s| s.action("Deploy_Firehose_Prod"))
            .and_then(ActionSpec::as_deploy)
            .unwrap();

        assert_eq!(dev.account_id(), "111111111111");
        assert_eq!(prod.account_id(), "222222222222");
        assert_eq!(dev.template, prod.template);
        assert_eq!(dev.template.file, "ApplicationStack.template.json");
        assert_eq!(dev.stack_name, "KinesisApplicationStack");
        assert_eq!(
            prod.roles.deployment_role.arn.as_str(),
            "arn:aws:iam::222222222222:role/CloudFormationCrossAccountRole"
        );
        assert_eq!(prod.roles.deployment_role.purpose, RolePurpose::Deployment);
        assert!(Arc::ptr_eq(&prod.roles.action_role, &definition.prod_roles.action_role));
        assert_eq!(
            dev.roles.action_role.arn.as_str(),
            "arn:aws:iam::111111111111:role/CodePipelineRole-4PVV5QMKJ60HO"
        );
    }

    #[test]
    fn test_prod_action_role_can_decrypt_artifacts() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();
        let key = definition.key();

        assert!(key.can_decrypt(&Principal::Role(definition.prod_roles.action_role.arn.clone())));
        assert!(key.can_decrypt(&Principal::account("222222222222").unwrap()));
        assert!(definition
            .prod_roles
            .action_role
            .trusts(&Principal::account("111111111111").unwrap()));
    }

    #[test]
    fn test_build_encrypts_with_pipeline_key() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();
        assert_eq!(definition.build_spec.encryption_key, definition.key().arn);
        assert!(Arc::ptr_eq(definition.store().encryption_key(), definition.key()));
    }

    #[test]
    fn test_outputs() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();
        let outputs = definition.outputs();
        let keys: Vec<&str> = outputs.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "CfnOutputArtifactBucket",
                "CfnOutputCodeCommitHttpUrl",
                "CfnOutputCodePipelineKmsKeyArn",
                "CfnOutputRepositoryName",
                "CfnOutputRepositoryUrl",
            ]
        );
    }

    #[test]
    fn test_missing_prod_role_fails_fast() {
        let config = PipelineConfig {
            prod_deployment_role_name: String::new(),
            ..sample_config()
        };
        let err = StageGraphAssembler::assemble(&config).unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Configuration(ConfigurationError::Missing { ref field }) if field == "prod_deployment_role_name"
        ));
    }

    #[test]
    fn test_accepts_only_tracked_branch() {
        let definition = StageGraphAssembler::assemble(&sample_config()).unwrap();
        assert!(definition.accepts("kinesis-app", "main").is_ok());
        assert!(definition.accepts("kinesis-app", "feature/x").is_err());
        assert!(definition.accepts("other-repo", "main").is_err());
    }
}
