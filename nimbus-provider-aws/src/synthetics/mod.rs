//! CloudWatch Synthetics canaries

pub mod canary;
pub mod sdk;
pub mod waiter;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use nimbus_core::provider::ApiResult;

pub use sdk::SdkSynthetics;

/// Runtime every canary is created with
pub const RUNTIME_VERSION: &str = "syn-1.0";

/// Lifecycle state of a canary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanaryState {
    Creating,
    Ready,
    Starting,
    Running,
    Updating,
    Stopping,
    Stopped,
    Error,
    Deleting,
    Unknown(String),
}

impl CanaryState {
    pub fn from_api(s: &str) -> Self {
        match s {
            "CREATING" => Self::Creating,
            "READY" => Self::Ready,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "UPDATING" => Self::Updating,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "ERROR" => Self::Error,
            "DELETING" => Self::Deleting,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "CREATING",
            Self::Ready => "READY",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Updating => "UPDATING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
            Self::Deleting => "DELETING",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for CanaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script of a canary: an inline zip archive or an object in S3
#[derive(Debug, Clone, PartialEq)]
pub struct CanaryCode {
    pub handler: String,
    pub zip_file: Option<Vec<u8>>,
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub s3_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanarySchedule {
    pub expression: String,
    pub duration_in_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanaryRunConfig {
    pub timeout_in_seconds: Option<i32>,
    pub memory_in_mb: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanaryVpcConfig {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    /// Only reported by the service
    pub vpc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCanaryRequest {
    pub name: String,
    pub artifact_s3_location: String,
    pub execution_role_arn: String,
    pub runtime_version: String,
    pub code: CanaryCode,
    pub schedule: CanarySchedule,
    pub run_config: Option<CanaryRunConfig>,
    pub vpc_config: Option<CanaryVpcConfig>,
    pub failure_retention_period: Option<i32>,
    pub success_retention_period: Option<i32>,
    pub tags: HashMap<String, String>,
}

/// UpdateCanary input; `None` fields are left unchanged
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateCanaryRequest {
    pub name: String,
    pub code: Option<CanaryCode>,
    pub execution_role_arn: Option<String>,
    pub schedule: Option<CanarySchedule>,
    pub run_config: Option<CanaryRunConfig>,
    pub vpc_config: Option<CanaryVpcConfig>,
    pub failure_retention_period: Option<i32>,
    pub success_retention_period: Option<i32>,
}

impl UpdateCanaryRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether the request would change anything
    pub fn has_changes(&self) -> bool {
        self.code.is_some()
            || self.execution_role_arn.is_some()
            || self.schedule.is_some()
            || self.run_config.is_some()
            || self.vpc_config.is_some()
            || self.failure_retention_period.is_some()
            || self.success_retention_period.is_some()
    }
}

/// Canary as reported by GetCanary
#[derive(Debug, Clone, PartialEq)]
pub struct Canary {
    pub name: String,
    pub state: CanaryState,
    pub state_reason: Option<String>,
    pub engine_arn: Option<String>,
    pub execution_role_arn: Option<String>,
    pub runtime_version: Option<String>,
    pub artifact_s3_location: Option<String>,
    pub failure_retention_period: Option<i32>,
    pub success_retention_period: Option<i32>,
    pub handler: Option<String>,
    pub source_location_arn: Option<String>,
    pub schedule: Option<CanarySchedule>,
    pub run_config: Option<CanaryRunConfig>,
    pub vpc_config: Option<CanaryVpcConfig>,
    pub tags: HashMap<String, String>,
}

/// The Synthetics calls used by the canary handler
#[async_trait]
pub trait SyntheticsApi: Send + Sync {
    /// Returns the name of the created canary
    async fn create_canary(&self, request: &CreateCanaryRequest) -> ApiResult<String>;

    async fn get_canary(&self, name: &str) -> ApiResult<Canary>;

    async fn update_canary(&self, request: &UpdateCanaryRequest) -> ApiResult<()>;

    async fn start_canary(&self, name: &str) -> ApiResult<()>;

    async fn stop_canary(&self, name: &str) -> ApiResult<()>;

    async fn delete_canary(&self, name: &str) -> ApiResult<()>;

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> ApiResult<()>;

    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> ApiResult<()>;
}
