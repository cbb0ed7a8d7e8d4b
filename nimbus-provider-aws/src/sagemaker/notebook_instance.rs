//! `sagemaker_notebook_instance` resource
//!
//! The remote identifier is the instance name. SageMaker only accepts
//! updates on a stopped instance, so an update stops the instance, applies
//! the change and brings it back in service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use nimbus_core::differ;
use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nimbus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use nimbus_core::waiter::WaitSpec;

use super::waiter::{
    deleted_spec, in_service_spec, started_spec, stopped_spec, updated_spec, wait,
};
use super::{
    ACCESS_VALUES, CreateNotebookInstanceRequest, NotebookInstance, NotebookInstanceStatus,
    SageMakerApi, UpdateNotebookInstanceRequest,
};
use crate::config::WaitSettings;
use crate::resources::{ResourceHandler, prepare, required_str};
use crate::utils::{diff_tags, ignore_aws_tags, tags_value};

pub const TYPE_NAME: &str = "sagemaker_notebook_instance";

fn access() -> AttributeType {
    AttributeType::Enum(ACCESS_VALUES.iter().map(|v| v.to_string()).collect())
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("SageMaker notebook instance")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("role_arn", types::arn()).required())
        .attribute(AttributeSchema::new("instance_type", AttributeType::String).required())
        .attribute(AttributeSchema::new("subnet_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new("security_groups", types::string_list()).force_new())
        .attribute(AttributeSchema::new("kms_key_id", AttributeType::String).force_new())
        .attribute(AttributeSchema::new(
            "lifecycle_config_name",
            AttributeType::String,
        ))
        .attribute(
            AttributeSchema::new("root_access", access())
                .with_default(Value::string("Enabled")),
        )
        .attribute(
            AttributeSchema::new("direct_internet_access", access())
                .with_default(Value::string("Enabled"))
                .force_new(),
        )
        .attribute(AttributeSchema::new("tags", types::string_map()))
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("url", AttributeType::String).computed())
        .attribute(AttributeSchema::new("network_interface_id", AttributeType::String).computed())
}

fn state_from(id: &ResourceId, instance: NotebookInstance, tags: HashMap<String, String>) -> State {
    let mut attributes = HashMap::from([
        ("name".to_string(), Value::String(instance.name.clone())),
        ("arn".to_string(), Value::String(instance.arn)),
        (
            "security_groups".to_string(),
            Value::string_list(instance.security_groups),
        ),
        ("tags".to_string(), tags_value(tags)),
    ]);
    for (key, value) in [
        ("url", instance.url),
        ("instance_type", instance.instance_type),
        ("role_arn", instance.role_arn),
        ("subnet_id", instance.subnet_id),
        ("kms_key_id", instance.kms_key_id),
        ("lifecycle_config_name", instance.lifecycle_config_name),
        ("network_interface_id", instance.network_interface_id),
        ("root_access", instance.root_access),
        ("direct_internet_access", instance.direct_internet_access),
    ] {
        if let Some(value) = value {
            attributes.insert(key.to_string(), Value::String(value));
        }
    }
    State::existing(id.clone(), attributes).with_identifier(instance.name)
}

pub struct NotebookInstanceHandler {
    api: Arc<dyn SageMakerApi>,
    waits: WaitSettings,
}

impl NotebookInstanceHandler {
    pub fn new(api: Arc<dyn SageMakerApi>, waits: WaitSettings) -> Self {
        Self { api, waits }
    }

    async fn wait_for(
        &self,
        name: &str,
        spec: WaitSpec<NotebookInstanceStatus>,
        what: &str,
    ) -> ProviderResult<()> {
        wait(self.api.as_ref(), name, spec, &self.waits)
            .await
            .map(|_| ())
            .map_err(|e| {
                ProviderError::from(e).context(format!("waiting for notebook instance to be {what}"))
            })
    }

    async fn describe(&self, name: &str) -> ProviderResult<NotebookInstance> {
        self.api
            .describe_notebook_instance(name)
            .await
            .map_err(|e| ProviderError::from(e).context("reading notebook instance"))
    }

    async fn stop(&self, name: &str) -> ProviderResult<()> {
        debug!("stopping notebook instance {}", name);
        self.api
            .stop_notebook_instance(name)
            .await
            .map_err(|e| ProviderError::from(e).context("stopping notebook instance"))?;
        self.wait_for(name, stopped_spec(), "stopped").await
    }

    async fn start(&self, name: &str) -> ProviderResult<()> {
        debug!("starting notebook instance {}", name);
        self.api
            .start_notebook_instance(name)
            .await
            .map_err(|e| ProviderError::from(e).context("starting notebook instance"))?;
        self.wait_for(name, started_spec(), "in service").await
    }

    async fn update_tags(&self, arn: &str, from: &State, to: &Resource) -> ProviderResult<()> {
        let changes = diff_tags(&from.get_string_map("tags"), &to.get_string_map("tags"));
        if !changes.remove.is_empty() {
            debug!("removing tags {:?} from {}", changes.remove, arn);
            self.api
                .delete_tags(arn, changes.remove)
                .await
                .map_err(|e| ProviderError::from(e).context("removing notebook instance tags"))?;
        }
        if !changes.upsert.is_empty() {
            debug!("tagging {}", arn);
            self.api
                .add_tags(arn, changes.upsert.into_iter().collect())
                .await
                .map_err(|e| ProviderError::from(e).context("tagging notebook instance"))?;
        }
        Ok(())
    }
}

fn update_request(name: &str, from: &State, to: &Resource) -> UpdateNotebookInstanceRequest {
    let changes = differ::diff(&schema(), from, to);
    let changed = |key: &str| {
        if changes.has_change(key) {
            to.get_non_empty_str(key).map(str::to_string)
        } else {
            None
        }
    };

    let mut request = UpdateNotebookInstanceRequest::new(name);
    request.instance_type = changed("instance_type");
    request.role_arn = changed("role_arn");
    request.root_access = changed("root_access");
    request.lifecycle_config_name = changed("lifecycle_config_name");
    request.disassociate_lifecycle_config = changes.has_change("lifecycle_config_name")
        && request.lifecycle_config_name.is_none();
    request
}

#[async_trait]
impl ResourceHandler for NotebookInstanceHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let resource = prepare(&schema(), resource)?;
        let optional = |key: &str| resource.get_non_empty_str(key).map(str::to_string);
        let request = CreateNotebookInstanceRequest {
            name: required_str(&resource, "name")?.to_string(),
            instance_type: required_str(&resource, "instance_type")?.to_string(),
            role_arn: required_str(&resource, "role_arn")?.to_string(),
            subnet_id: optional("subnet_id"),
            security_group_ids: resource.get_strings("security_groups"),
            kms_key_id: optional("kms_key_id"),
            lifecycle_config_name: optional("lifecycle_config_name"),
            root_access: optional("root_access"),
            direct_internet_access: optional("direct_internet_access"),
            tags: ignore_aws_tags(resource.get_string_map("tags")),
        };

        debug!("creating notebook instance {}", request.name);
        self.api
            .create_notebook_instance(&request)
            .await
            .map_err(|e| ProviderError::from(e).context("creating notebook instance"))?;

        self.wait_for(&request.name, in_service_spec(), "in service")
            .await
            .map_err(|e| e.with_identifier(&request.name))?;

        self.read(&resource.id, &request.name).await
    }

    async fn read(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let instance = match self.api.describe_notebook_instance(identifier).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                warn!(
                    "notebook instance {} not found, removing from state",
                    identifier
                );
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(ProviderError::from(e).context("reading notebook instance")),
        };
        let tags = self
            .api
            .list_tags(&instance.arn)
            .await
            .map_err(|e| ProviderError::from(e).context("listing notebook instance tags"))?;
        Ok(state_from(id, instance, tags))
    }

    async fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let to = prepare(&schema(), to)?;
        let request = update_request(identifier, from, &to);

        if request.has_changes() {
            // Only an instance that was running, or about to, is started again
            let was_running = match self.describe(identifier).await?.status {
                NotebookInstanceStatus::Pending => {
                    self.wait_for(identifier, in_service_spec(), "in service")
                        .await?;
                    self.stop(identifier).await?;
                    true
                }
                NotebookInstanceStatus::InService => {
                    self.stop(identifier).await?;
                    true
                }
                NotebookInstanceStatus::Stopping => {
                    self.wait_for(identifier, stopped_spec(), "stopped").await?;
                    false
                }
                NotebookInstanceStatus::Updating => {
                    self.wait_for(identifier, updated_spec(), "updated").await?;
                    false
                }
                _ => false,
            };

            debug!("updating notebook instance {}", identifier);
            self.api
                .update_notebook_instance(&request)
                .await
                .map_err(|e| ProviderError::from(e).context("updating notebook instance"))?;
            self.wait_for(identifier, updated_spec(), "updated").await?;
            if was_running {
                self.start(identifier).await?;
            }
        }

        let arn = self.describe(identifier).await?.arn;
        self.update_tags(&arn, from, &to).await?;

        self.read(id, identifier).await
    }

    async fn delete(&self, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let instance = match self.api.describe_notebook_instance(identifier).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(ProviderError::from(e).context("reading notebook instance")),
        };

        match instance.status {
            NotebookInstanceStatus::Pending => {
                self.wait_for(identifier, in_service_spec(), "in service")
                    .await?;
                self.stop(identifier).await?;
            }
            NotebookInstanceStatus::InService => self.stop(identifier).await?,
            NotebookInstanceStatus::Stopping => {
                self.wait_for(identifier, stopped_spec(), "stopped").await?
            }
            NotebookInstanceStatus::Updating => {
                self.wait_for(identifier, updated_spec(), "updated").await?
            }
            _ => {}
        }

        debug!("deleting notebook instance {}", identifier);
        match self.api.delete_notebook_instance(identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(ProviderError::from(e).context("deleting notebook instance"));
            }
        }
        self.wait_for(identifier, deleted_spec(), "deleted").await
    }
}
