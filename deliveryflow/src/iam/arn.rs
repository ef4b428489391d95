//! Typed ARN construction.
//!
//! Every constructor validates its inputs so that a trust boundary can never
//! be built from an empty or malformed identifier.

use crate::errors::ConfigurationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{12}$").expect("valid account id pattern"));

static REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("valid region pattern")
});

/// Validates a 12-digit account identifier.
///
/// # Errors
///
/// Returns an error if the value is empty or not exactly twelve digits.
pub fn validate_account_id(field: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::missing(field));
    }
    if !ACCOUNT_ID.is_match(value) {
        return Err(ConfigurationError::invalid(
            field,
            value,
            "account ids are exactly twelve digits",
        ));
    }
    Ok(())
}

/// Validates a region code such as `eu-west-1`.
///
/// # Errors
///
/// Returns an error if the value is empty or not shaped like a region.
pub fn validate_region(field: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::missing(field));
    }
    if !REGION.is_match(value) {
        return Err(ConfigurationError::invalid(
            field,
            value,
            "expected a region code such as us-east-1",
        ));
    }
    Ok(())
}

/// Validates a resource name.
///
/// # Errors
///
/// Returns an error if the name is empty, contains whitespace, or contains
/// a wildcard character.
pub fn validate_name(field: &str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::missing(field));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigurationError::invalid(field, value, "names cannot contain whitespace"));
    }
    if value.contains('*') {
        return Err(ConfigurationError::invalid(field, value, "names cannot contain wildcards"));
    }
    Ok(())
}

/// An Amazon Resource Name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arn(String);

impl Arn {
    /// ARN of a named IAM role.
    ///
    /// # Errors
    ///
    /// Returns an error if the account or role name is invalid.
    pub fn iam_role(account_id: &str, role_name: &str) -> Result<Self, ConfigurationError> {
        validate_account_id("account_id", account_id)?;
        validate_name("role_name", role_name)?;
        Ok(Self(format!("arn:aws:iam::{account_id}:role/{role_name}")))
    }

    /// ARN pattern covering the roles a stack creates (`<Stack>-*`).
    ///
    /// # Errors
    ///
    /// Returns an error if the account or stack name is invalid.
    pub fn iam_stack_roles(account_id: &str, stack_name: &str) -> Result<Self, ConfigurationError> {
        validate_account_id("account_id", account_id)?;
        validate_name("stack_name", stack_name)?;
        Ok(Self(format!("arn:aws:iam::{account_id}:role/{stack_name}-*")))
    }

    /// ARN pattern covering the managed policies a stack creates.
    ///
    /// # Errors
    ///
    /// Returns an error if the account or stack name is invalid.
    pub fn iam_stack_policies(account_id: &str, stack_name: &str) -> Result<Self, ConfigurationError> {
        validate_account_id("account_id", account_id)?;
        validate_name("stack_name", stack_name)?;
        Ok(Self(format!("arn:aws:iam::{account_id}:policy/{stack_name}-*")))
    }

    /// ARN of an account's root principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the account is invalid.
    pub fn account_root(account_id: &str) -> Result<Self, ConfigurationError> {
        validate_account_id("account_id", account_id)?;
        Ok(Self(format!("arn:aws:iam::{account_id}:root")))
    }

    /// ARN of a KMS key.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or key id is invalid.
    pub fn kms_key(region: &str, account_id: &str, key_id: &str) -> Result<Self, ConfigurationError> {
        validate_region("region", region)?;
        validate_account_id("account_id", account_id)?;
        validate_name("kms_key_id", key_id)?;
        Ok(Self(format!("arn:aws:kms:{region}:{account_id}:key/{key_id}")))
    }

    /// ARN of an S3 bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is invalid.
    pub fn s3_bucket(bucket: &str) -> Result<Self, ConfigurationError> {
        validate_name("bucket_name", bucket)?;
        Ok(Self(format!("arn:aws:s3:::{bucket}")))
    }

    /// ARN covering every object inside an S3 bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is invalid.
    pub fn s3_objects(bucket: &str) -> Result<Self, ConfigurationError> {
        validate_name("bucket_name", bucket)?;
        Ok(Self(format!("arn:aws:s3:::{bucket}/*")))
    }

    /// ARN pattern covering buckets generated by a stack.
    ///
    /// Generated bucket names start with the lower-cased stack name.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack name is invalid.
    pub fn s3_stack_buckets(stack_name: &str) -> Result<Self, ConfigurationError> {
        validate_name("stack_name", stack_name)?;
        Ok(Self(format!("arn:aws:s3:::{}-*", stack_name.to_lowercase())))
    }

    /// ARN of a CloudFormation stack (any stack id).
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or stack name is invalid.
    pub fn cloudformation_stack(
        region: &str,
        account_id: &str,
        stack_name: &str,
    ) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix("cloudformation", region, account_id)?;
        validate_name("stack_name", stack_name)?;
        Ok(Self(format!("{prefix}:stack/{stack_name}/*")))
    }

    /// ARN of a Kinesis data stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or name is invalid.
    pub fn kinesis_stream(region: &str, account_id: &str, name: &str) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix("kinesis", region, account_id)?;
        validate_name("stream_name", name)?;
        Ok(Self(format!("{prefix}:stream/{name}")))
    }

    /// ARN of a Firehose delivery stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or name is invalid.
    pub fn firehose_delivery_stream(
        region: &str,
        account_id: &str,
        name: &str,
    ) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix("firehose", region, account_id)?;
        validate_name("delivery_stream_name", name)?;
        Ok(Self(format!("{prefix}:deliverystream/{name}")))
    }

    /// ARN of a Lambda function.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or name is invalid.
    pub fn lambda_function(region: &str, account_id: &str, name: &str) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix("lambda", region, account_id)?;
        validate_name("function_name", name)?;
        Ok(Self(format!("{prefix}:function:{name}")))
    }

    /// ARN of a CloudWatch log group and its streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or name is invalid.
    pub fn log_group(region: &str, account_id: &str, name: &str) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix("logs", region, account_id)?;
        validate_name("log_group_name", name)?;
        Ok(Self(format!("{prefix}:log-group:{name}:*")))
    }

    /// ARN of a Step Functions state machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or name is invalid.
    pub fn state_machine(region: &str, account_id: &str, name: &str) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix("states", region, account_id)?;
        validate_name("state_machine_name", name)?;
        Ok(Self(format!("{prefix}:stateMachine:{name}")))
    }

    /// ARN with a name prefix for a regional service whose physical names
    /// are generated from the stack name, e.g. `stream/<Stack>-*`.
    ///
    /// # Errors
    ///
    /// Returns an error if the region, account or stack name is invalid.
    pub fn stack_scoped(
        service: &str,
        resource_type: &str,
        region: &str,
        account_id: &str,
        stack_name: &str,
    ) -> Result<Self, ConfigurationError> {
        let prefix = regional_prefix(service, region, account_id)?;
        validate_name("stack_name", stack_name)?;
        Ok(Self(format!("{prefix}:{resource_type}{stack_name}-*")))
    }

    /// The universal resource. Only used for actions that do not support
    /// resource-level scoping.
    #[must_use]
    pub fn any() -> Self {
        Self("*".to_string())
    }

    /// Returns the ARN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the universal `*` resource.
    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        self.0 == "*"
    }

    /// Returns the account id segment, if the ARN carries one.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.0.split(':').nth(4).filter(|s| !s.is_empty())
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Arn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn regional_prefix(service: &str, region: &str, account_id: &str) -> Result<String, ConfigurationError> {
    validate_region("region", region)?;
    validate_account_id("account_id", account_id)?;
    Ok(format!("arn:aws:{service}:{region}:{account_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "111111111111";

    #[test]
    fn test_role_arn() {
        let arn = Arn::iam_role(ACCOUNT, "CodePipelineRole").unwrap();
        assert_eq!(arn.as_str(), "arn:aws:iam::111111111111:role/CodePipelineRole");
        assert_eq!(arn.account_id(), Some(ACCOUNT));
    }

    #[test]
    fn test_s3_arns_have_no_account() {
        let arn = Arn::s3_bucket("artifacts").unwrap();
        assert_eq!(arn.as_str(), "arn:aws:s3:::artifacts");
        assert_eq!(arn.account_id(), None);
        assert_eq!(Arn::s3_objects("artifacts").unwrap().as_str(), "arn:aws:s3:::artifacts/*");
    }

    #[test]
    fn test_kms_key_arn() {
        let arn = Arn::kms_key("eu-west-1", ACCOUNT, "1234abcd").unwrap();
        assert_eq!(arn.as_str(), "arn:aws:kms:eu-west-1:111111111111:key/1234abcd");
    }

    #[test]
    fn test_stack_scoped_patterns() {
        let arn = Arn::stack_scoped("kinesis", "stream/", "us-east-1", ACCOUNT, "AppStack").unwrap();
        assert_eq!(arn.as_str(), "arn:aws:kinesis:us-east-1:111111111111:stream/AppStack-*");
        assert_eq!(
            Arn::s3_stack_buckets("KinesisApplicationStack").unwrap().as_str(),
            "arn:aws:s3:::kinesisapplicationstack-*"
        );
    }

    #[test]
    fn test_missing_inputs_fail_fast() {
        assert_eq!(
            Arn::iam_role("", "Role").unwrap_err(),
            ConfigurationError::missing("account_id")
        );
        assert_eq!(
            Arn::kms_key("", ACCOUNT, "key").unwrap_err(),
            ConfigurationError::missing("region")
        );
        assert_eq!(
            Arn::state_machine("us-east-1", ACCOUNT, " ").unwrap_err(),
            ConfigurationError::missing("state_machine_name")
        );
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert!(Arn::iam_role("12345", "Role").is_err());
        assert!(Arn::kms_key("moon-base", ACCOUNT, "key").is_err());
        assert!(Arn::s3_bucket("my bucket").is_err());
        assert!(Arn::lambda_function("us-east-1", ACCOUNT, "fn*").is_err());
    }

    #[test]
    fn test_unscoped() {
        assert!(Arn::any().is_unscoped());
        assert!(!Arn::s3_objects("bucket").unwrap().is_unscoped());
    }
}
