//! SageMaker notebook instances

pub mod notebook_instance;
pub mod sdk;
pub mod waiter;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use nimbus_core::provider::ApiResult;

pub use sdk::SdkSageMaker;

/// Lifecycle status of a notebook instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotebookInstanceStatus {
    Pending,
    InService,
    Stopping,
    Stopped,
    Failed,
    Deleting,
    Updating,
    Unknown(String),
}

impl NotebookInstanceStatus {
    pub fn from_api(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "InService" => Self::InService,
            "Stopping" => Self::Stopping,
            "Stopped" => Self::Stopped,
            "Failed" => Self::Failed,
            "Deleting" => Self::Deleting,
            "Updating" => Self::Updating,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::InService => "InService",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
            Self::Updating => "Updating",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for NotebookInstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values accepted by `RootAccess` and `DirectInternetAccess`
pub const ACCESS_VALUES: [&str; 2] = ["Enabled", "Disabled"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateNotebookInstanceRequest {
    pub name: String,
    pub instance_type: String,
    pub role_arn: String,
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
    pub kms_key_id: Option<String>,
    pub lifecycle_config_name: Option<String>,
    pub root_access: Option<String>,
    pub direct_internet_access: Option<String>,
    pub tags: HashMap<String, String>,
}

/// UpdateNotebookInstance input; `None` fields are left unchanged
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateNotebookInstanceRequest {
    pub name: String,
    pub instance_type: Option<String>,
    pub role_arn: Option<String>,
    pub lifecycle_config_name: Option<String>,
    /// Detach the lifecycle configuration instead of replacing it
    pub disassociate_lifecycle_config: bool,
    pub root_access: Option<String>,
}

impl UpdateNotebookInstanceRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.instance_type.is_some()
            || self.role_arn.is_some()
            || self.lifecycle_config_name.is_some()
            || self.disassociate_lifecycle_config
            || self.root_access.is_some()
    }
}

/// Notebook instance as reported by DescribeNotebookInstance
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookInstance {
    pub name: String,
    pub arn: String,
    pub status: NotebookInstanceStatus,
    pub failure_reason: Option<String>,
    pub url: Option<String>,
    pub instance_type: Option<String>,
    pub role_arn: Option<String>,
    pub subnet_id: Option<String>,
    pub security_groups: Vec<String>,
    pub kms_key_id: Option<String>,
    pub lifecycle_config_name: Option<String>,
    pub network_interface_id: Option<String>,
    pub root_access: Option<String>,
    pub direct_internet_access: Option<String>,
}

/// The SageMaker calls used by the notebook instance handler
#[async_trait]
pub trait SageMakerApi: Send + Sync {
    /// Returns the ARN of the created instance
    async fn create_notebook_instance(
        &self,
        request: &CreateNotebookInstanceRequest,
    ) -> ApiResult<String>;

    async fn describe_notebook_instance(&self, name: &str) -> ApiResult<NotebookInstance>;

    async fn update_notebook_instance(
        &self,
        request: &UpdateNotebookInstanceRequest,
    ) -> ApiResult<()>;

    async fn start_notebook_instance(&self, name: &str) -> ApiResult<()>;

    async fn stop_notebook_instance(&self, name: &str) -> ApiResult<()>;

    async fn delete_notebook_instance(&self, name: &str) -> ApiResult<()>;

    /// All tags of a resource, following pagination
    async fn list_tags(&self, arn: &str) -> ApiResult<HashMap<String, String>>;

    async fn add_tags(&self, arn: &str, tags: HashMap<String, String>) -> ApiResult<()>;

    async fn delete_tags(&self, arn: &str, keys: Vec<String>) -> ApiResult<()>;
}
