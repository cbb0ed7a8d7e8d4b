//! [`SageMakerApi`] over the AWS SDK

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sagemaker::Client;
use aws_sdk_sagemaker::types::{DirectInternetAccess, InstanceType, RootAccess, Tag};
use nimbus_core::provider::ApiResult;

use super::{
    CreateNotebookInstanceRequest, NotebookInstance, NotebookInstanceStatus, SageMakerApi,
    UpdateNotebookInstanceRequest,
};
use crate::error::{classify, missing_field, sagemaker_not_found};

pub struct SdkSageMaker {
    client: Client,
}

impl SdkSageMaker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn tags_input(operation: &'static str, tags: &HashMap<String, String>) -> ApiResult<Vec<Tag>> {
    tags.iter()
        .map(|(key, value)| {
            let _ = operation;
            Ok(Tag::builder().key(key).value(value).build())
        })
        .collect()
}

#[async_trait]
impl SageMakerApi for SdkSageMaker {
    async fn create_notebook_instance(
        &self,
        request: &CreateNotebookInstanceRequest,
    ) -> ApiResult<String> {
        const OP: &str = "CreateNotebookInstance";
        let tags = if request.tags.is_empty() {
            None
        } else {
            Some(tags_input(OP, &request.tags)?)
        };
        let output = self
            .client
            .create_notebook_instance()
            .notebook_instance_name(&request.name)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .role_arn(&request.role_arn)
            .set_subnet_id(request.subnet_id.clone())
            .set_security_group_ids(Some(request.security_group_ids.clone()))
            .set_kms_key_id(request.kms_key_id.clone())
            .set_lifecycle_config_name(request.lifecycle_config_name.clone())
            .set_root_access(request.root_access.as_deref().map(RootAccess::from))
            .set_direct_internet_access(
                request
                    .direct_internet_access
                    .as_deref()
                    .map(DirectInternetAccess::from),
            )
            .set_tags(tags)
            .send()
            .await
            .map_err(|e| classify(OP, e, sagemaker_not_found))?;

        output
            .notebook_instance_arn()
            .map(str::to_string)
            .ok_or_else(|| missing_field(OP, "notebook instance ARN"))
    }

    async fn describe_notebook_instance(&self, name: &str) -> ApiResult<NotebookInstance> {
        const OP: &str = "DescribeNotebookInstance";
        let output = self
            .client
            .describe_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await
            .map_err(|e| classify(OP, e, sagemaker_not_found))?;

        let arn = output
            .notebook_instance_arn()
            .ok_or_else(|| missing_field(OP, "notebook instance ARN"))?;
        let status = output
            .notebook_instance_status()
            .map(|s| NotebookInstanceStatus::from_api(s.as_str()))
            .ok_or_else(|| missing_field(OP, "notebook instance status"))?;

        Ok(NotebookInstance {
            name: output
                .notebook_instance_name()
                .unwrap_or(name)
                .to_string(),
            arn: arn.to_string(),
            status,
            failure_reason: output.failure_reason().map(str::to_string),
            url: output.url().map(str::to_string),
            instance_type: output.instance_type().map(|t| t.as_str().to_string()),
            role_arn: output.role_arn().map(str::to_string),
            subnet_id: output.subnet_id().map(str::to_string),
            security_groups: output.security_groups().to_vec(),
            kms_key_id: output.kms_key_id().map(str::to_string),
            lifecycle_config_name: output
                .notebook_instance_lifecycle_config_name()
                .map(str::to_string),
            network_interface_id: output.network_interface_id().map(str::to_string),
            root_access: output.root_access().map(|r| r.as_str().to_string()),
            direct_internet_access: output
                .direct_internet_access()
                .map(|d| d.as_str().to_string()),
        })
    }

    async fn update_notebook_instance(
        &self,
        request: &UpdateNotebookInstanceRequest,
    ) -> ApiResult<()> {
        self.client
            .update_notebook_instance()
            .notebook_instance_name(&request.name)
            .set_instance_type(request.instance_type.as_deref().map(InstanceType::from))
            .set_role_arn(request.role_arn.clone())
            .set_lifecycle_config_name(request.lifecycle_config_name.clone())
            .set_disassociate_lifecycle_config(
                request.disassociate_lifecycle_config.then_some(true),
            )
            .set_root_access(request.root_access.as_deref().map(RootAccess::from))
            .send()
            .await
            .map_err(|e| classify("UpdateNotebookInstance", e, sagemaker_not_found))?;
        Ok(())
    }

    async fn start_notebook_instance(&self, name: &str) -> ApiResult<()> {
        self.client
            .start_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await
            .map_err(|e| classify("StartNotebookInstance", e, sagemaker_not_found))?;
        Ok(())
    }

    async fn stop_notebook_instance(&self, name: &str) -> ApiResult<()> {
        self.client
            .stop_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await
            .map_err(|e| classify("StopNotebookInstance", e, sagemaker_not_found))?;
        Ok(())
    }

    async fn delete_notebook_instance(&self, name: &str) -> ApiResult<()> {
        self.client
            .delete_notebook_instance()
            .notebook_instance_name(name)
            .send()
            .await
            .map_err(|e| classify("DeleteNotebookInstance", e, sagemaker_not_found))?;
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> ApiResult<HashMap<String, String>> {
        let mut tags = HashMap::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_tags()
                .resource_arn(arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify("ListTags", e, sagemaker_not_found))?;

            tags.extend(
                output
                    .tags()
                    .iter()
                    .map(|t| (t.key().unwrap_or_default().to_string(), t.value().unwrap_or_default().to_string())),
            );

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(tags)
    }

    async fn add_tags(&self, arn: &str, tags: HashMap<String, String>) -> ApiResult<()> {
        const OP: &str = "AddTags";
        self.client
            .add_tags()
            .resource_arn(arn)
            .set_tags(Some(tags_input(OP, &tags)?))
            .send()
            .await
            .map_err(|e| classify(OP, e, sagemaker_not_found))?;
        Ok(())
    }

    async fn delete_tags(&self, arn: &str, keys: Vec<String>) -> ApiResult<()> {
        self.client
            .delete_tags()
            .resource_arn(arn)
            .set_tag_keys(Some(keys))
            .send()
            .await
            .map_err(|e| classify("DeleteTags", e, sagemaker_not_found))?;
        Ok(())
    }
}
