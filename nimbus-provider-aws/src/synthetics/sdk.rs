//! [`SyntheticsApi`] over the AWS SDK

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_synthetics::Client;
use aws_sdk_synthetics::primitives::Blob;
use aws_sdk_synthetics::types::{
    CanaryCodeInput, CanaryRunConfigInput, CanaryScheduleInput, VpcConfigInput,
};
use nimbus_core::provider::{ApiError, ApiResult};

use super::{
    Canary, CanaryCode, CanaryRunConfig, CanarySchedule, CanaryState, CanaryVpcConfig,
    CreateCanaryRequest, SyntheticsApi, UpdateCanaryRequest,
};
use crate::error::{classify, missing_field, resource_not_found};

pub struct SdkSynthetics {
    client: Client,
}

impl SdkSynthetics {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn code_input(operation: &'static str, code: &CanaryCode) -> ApiResult<CanaryCodeInput> {
    let _ = operation;
    Ok(CanaryCodeInput::builder()
        .handler(&code.handler)
        .set_zip_file(code.zip_file.clone().map(Blob::new))
        .set_s3_bucket(code.s3_bucket.clone())
        .set_s3_key(code.s3_key.clone())
        .set_s3_version(code.s3_version.clone())
        .build())
}

fn schedule_input(
    operation: &'static str,
    schedule: &CanarySchedule,
) -> ApiResult<CanaryScheduleInput> {
    CanaryScheduleInput::builder()
        .expression(&schedule.expression)
        .set_duration_in_seconds(schedule.duration_in_seconds)
        .build()
        .map_err(|e| ApiError::invalid_request(operation, e.to_string()))
}

fn run_config_input(run_config: &CanaryRunConfig) -> CanaryRunConfigInput {
    CanaryRunConfigInput::builder()
        .set_timeout_in_seconds(run_config.timeout_in_seconds)
        .set_memory_in_mb(run_config.memory_in_mb)
        .build()
}

fn vpc_config_input(vpc_config: &CanaryVpcConfig) -> VpcConfigInput {
    VpcConfigInput::builder()
        .set_subnet_ids(Some(vpc_config.subnet_ids.clone()))
        .set_security_group_ids(Some(vpc_config.security_group_ids.clone()))
        .build()
}

fn canary_from(canary: &aws_sdk_synthetics::types::Canary) -> ApiResult<Canary> {
    const OP: &str = "GetCanary";
    let name = canary.name().ok_or_else(|| missing_field(OP, "canary name"))?;
    let status = canary.status();
    let state = status
        .and_then(|s| s.state())
        .map(|s| CanaryState::from_api(s.as_str()))
        .ok_or_else(|| missing_field(OP, "canary state"))?;

    Ok(Canary {
        name: name.to_string(),
        state,
        state_reason: status
            .and_then(|s| s.state_reason())
            .map(str::to_string),
        engine_arn: canary.engine_arn().map(str::to_string),
        execution_role_arn: canary.execution_role_arn().map(str::to_string),
        runtime_version: canary.runtime_version().map(str::to_string),
        artifact_s3_location: canary.artifact_s3_location().map(str::to_string),
        failure_retention_period: canary.failure_retention_period_in_days(),
        success_retention_period: canary.success_retention_period_in_days(),
        handler: canary
            .code()
            .and_then(|c| c.handler())
            .map(str::to_string),
        source_location_arn: canary
            .code()
            .and_then(|c| c.source_location_arn())
            .map(str::to_string),
        schedule: canary.schedule().map(|s| CanarySchedule {
            expression: s.expression().unwrap_or_default().to_string(),
            duration_in_seconds: s.duration_in_seconds(),
        }),
        run_config: canary.run_config().map(|r| CanaryRunConfig {
            timeout_in_seconds: r.timeout_in_seconds(),
            memory_in_mb: r.memory_in_mb(),
        }),
        vpc_config: canary.vpc_config().map(|v| CanaryVpcConfig {
            subnet_ids: v.subnet_ids().to_vec(),
            security_group_ids: v.security_group_ids().to_vec(),
            vpc_id: v.vpc_id().map(str::to_string),
        }),
        tags: canary.tags().cloned().unwrap_or_default(),
    })
}

#[async_trait]
impl SyntheticsApi for SdkSynthetics {
    async fn create_canary(&self, request: &CreateCanaryRequest) -> ApiResult<String> {
        const OP: &str = "CreateCanary";
        let tags = (!request.tags.is_empty()).then(|| request.tags.clone());
        let output = self
            .client
            .create_canary()
            .name(&request.name)
            .artifact_s3_location(&request.artifact_s3_location)
            .execution_role_arn(&request.execution_role_arn)
            .runtime_version(&request.runtime_version)
            .code(code_input(OP, &request.code)?)
            .schedule(schedule_input(OP, &request.schedule)?)
            .set_run_config(request.run_config.as_ref().map(run_config_input))
            .set_vpc_config(request.vpc_config.as_ref().map(vpc_config_input))
            .set_failure_retention_period_in_days(request.failure_retention_period)
            .set_success_retention_period_in_days(request.success_retention_period)
            .set_tags(tags)
            .send()
            .await
            .map_err(|e| classify(OP, e, resource_not_found))?;

        output
            .canary()
            .and_then(|c| c.name())
            .map(str::to_string)
            .ok_or_else(|| missing_field(OP, "canary name"))
    }

    async fn get_canary(&self, name: &str) -> ApiResult<Canary> {
        let output = self
            .client
            .get_canary()
            .name(name)
            .send()
            .await
            .map_err(|e| classify("GetCanary", e, resource_not_found))?;
        let canary = output
            .canary()
            .ok_or_else(|| missing_field("GetCanary", "canary"))?;
        canary_from(canary)
    }

    async fn update_canary(&self, request: &UpdateCanaryRequest) -> ApiResult<()> {
        const OP: &str = "UpdateCanary";
        let code = request
            .code
            .as_ref()
            .map(|c| code_input(OP, c))
            .transpose()?;
        let schedule = request
            .schedule
            .as_ref()
            .map(|s| schedule_input(OP, s))
            .transpose()?;
        self.client
            .update_canary()
            .name(&request.name)
            .set_code(code)
            .set_execution_role_arn(request.execution_role_arn.clone())
            .set_schedule(schedule)
            .set_run_config(request.run_config.as_ref().map(run_config_input))
            .set_vpc_config(request.vpc_config.as_ref().map(vpc_config_input))
            .set_failure_retention_period_in_days(request.failure_retention_period)
            .set_success_retention_period_in_days(request.success_retention_period)
            .send()
            .await
            .map_err(|e| classify(OP, e, resource_not_found))?;
        Ok(())
    }

    async fn start_canary(&self, name: &str) -> ApiResult<()> {
        self.client
            .start_canary()
            .name(name)
            .send()
            .await
            .map_err(|e| classify("StartCanary", e, resource_not_found))?;
        Ok(())
    }

    async fn stop_canary(&self, name: &str) -> ApiResult<()> {
        self.client
            .stop_canary()
            .name(name)
            .send()
            .await
            .map_err(|e| classify("StopCanary", e, resource_not_found))?;
        Ok(())
    }

    async fn delete_canary(&self, name: &str) -> ApiResult<()> {
        self.client
            .delete_canary()
            .name(name)
            .send()
            .await
            .map_err(|e| classify("DeleteCanary", e, resource_not_found))?;
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> ApiResult<()> {
        self.client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| classify("TagResource", e, resource_not_found))?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> ApiResult<()> {
        self.client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(keys))
            .send()
            .await
            .map_err(|e| classify("UntagResource", e, resource_not_found))?;
        Ok(())
    }
}
