//! AWS Config custom resources and the CloudFormation type registry.

use adc_common::{AdcError, ComplianceType, EvaluationResult, ResourcePage, Result, StoredResource};
use async_trait::async_trait;
use aws_sdk_cloudformation::types::RegistryType;
use aws_sdk_config::primitives::{DateTime, DateTimeFormat};
use aws_sdk_config::types::{ComplianceType as AwsComplianceType, Evaluation, ResourceType};
use tracing::{debug, info};

use crate::{ConfigStore, TypeRegistry};

pub struct AwsConfigStore {
    client: aws_sdk_config::Client,
}

impl AwsConfigStore {
    pub fn new(client: aws_sdk_config::Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_config::Client::new(config))
    }
}

fn to_aws_compliance(compliance_type: ComplianceType) -> AwsComplianceType {
    match compliance_type {
        ComplianceType::Compliant => AwsComplianceType::Compliant,
        ComplianceType::NonCompliant => AwsComplianceType::NonCompliant,
        ComplianceType::NotApplicable => AwsComplianceType::NotApplicable,
    }
}

#[async_trait]
impl ConfigStore for AwsConfigStore {
    async fn put_resource(&self, resource: &StoredResource) -> Result<()> {
        self.client
            .put_resource_config()
            .resource_type(&resource.resource_type)
            .schema_version_id(&resource.schema_version_id)
            .resource_id(&resource.resource_id)
            .configuration(&resource.configuration)
            .send()
            .await
            .map_err(|e| {
                AdcError::Store(format!(
                    "PutResourceConfig {} failed: {}",
                    resource.resource_id,
                    aws_sdk_config::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn list_resources(
        &self,
        resource_type: &str,
        next_token: Option<String>,
    ) -> Result<ResourcePage> {
        let output = self.client
            .list_discovered_resources()
            .resource_type(ResourceType::from(resource_type))
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| {
                AdcError::Store(format!(
                    "ListDiscoveredResources {} failed: {}",
                    resource_type,
                    aws_sdk_config::error::DisplayErrorContext(&e)
                ))
            })?;

        let resource_ids = output
            .resource_identifiers()
            .iter()
            .filter_map(|r| r.resource_id().map(|id| id.to_string()))
            .collect();

        Ok(ResourcePage {
            resource_ids,
            next_token: output.next_token().map(|t| t.to_string()),
        })
    }

    async fn delete_resource(&self, resource_type: &str, resource_id: &str) -> Result<()> {
        self.client
            .delete_resource_config()
            .resource_type(resource_type)
            .resource_id(resource_id)
            .send()
            .await
            .map_err(|e| {
                AdcError::Store(format!(
                    "DeleteResourceConfig {} failed: {}",
                    resource_id,
                    aws_sdk_config::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn put_evaluation_result(&self, result: &EvaluationResult) -> Result<()> {
        let ordering_timestamp = DateTime::from_str(&result.ordering_timestamp, DateTimeFormat::DateTime)
            .map_err(|e| {
                AdcError::Data(format!(
                    "Invalid capture time {}: {}",
                    result.ordering_timestamp, e
                ))
            })?;

        let evaluation = Evaluation::builder()
            .compliance_resource_type(&result.resource_type)
            .compliance_resource_id(&result.resource_id)
            .compliance_type(to_aws_compliance(result.compliance_type))
            .annotation(&result.annotation)
            .ordering_timestamp(ordering_timestamp)
            .build()
            .map_err(|e| AdcError::Data(format!("Invalid evaluation: {}", e)))?;

        let output = self.client
            .put_evaluations()
            .evaluations(evaluation)
            .result_token(&result.result_token)
            .send()
            .await
            .map_err(|e| {
                AdcError::Store(format!(
                    "PutEvaluations {} failed: {}",
                    result.resource_id,
                    aws_sdk_config::error::DisplayErrorContext(&e)
                ))
            })?;

        if !output.failed_evaluations().is_empty() {
            return Err(AdcError::Store(format!(
                "PutEvaluations rejected {} evaluation(s) for {}",
                output.failed_evaluations().len(),
                result.resource_id
            )));
        }

        debug!(resource_id = %result.resource_id, "Evaluation reported");
        Ok(())
    }
}

pub struct CloudFormationTypeRegistry {
    client: aws_sdk_cloudformation::Client,
}

impl CloudFormationTypeRegistry {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_cloudformation::Client::new(config))
    }
}

#[async_trait]
impl TypeRegistry for CloudFormationTypeRegistry {
    async fn resolve_schema_version(&self, resource_type: &str) -> Result<String> {
        let output = self.client
            .describe_type()
            .r#type(RegistryType::Resource)
            .type_name(resource_type)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_type_not_found_exception() => AdcError::Configuration(format!(
                    "Resource type {} is not registered",
                    resource_type
                )),
                _ => AdcError::Store(format!(
                    "DescribeType {} failed: {}",
                    resource_type,
                    aws_sdk_cloudformation::error::DisplayErrorContext(&e)
                )),
            })?;

        let version = output.default_version_id().ok_or_else(|| {
            AdcError::Configuration(format!("Resource type {} has no default version", resource_type))
        })?;

        info!(resource_type = %resource_type, version = %version, "Resolved schema version");
        Ok(version.to_string())
    }
}
