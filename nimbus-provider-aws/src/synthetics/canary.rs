//! `synthetics_canary` resource
//!
//! The remote identifier is the canary name. A canary must be stopped
//! before UpdateCanary is accepted, and after every mutation it goes through
//! transitional states that are awaited before the next call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use nimbus_core::differ;
use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nimbus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::waiter::{wait_deleted, wait_ready, wait_running, wait_stopped};
use super::{
    Canary, CanaryCode, CanaryRunConfig, CanarySchedule, CanaryState, CanaryVpcConfig,
    CreateCanaryRequest, RUNTIME_VERSION, SyntheticsApi, UpdateCanaryRequest,
};
use crate::account::AccountInfo;
use crate::config::WaitSettings;
use crate::resources::{ResourceHandler, prepare, required_str, with_declared};
use crate::utils::{diff_tags, ignore_aws_tags, strip_s3_scheme, tags_value};

pub const TYPE_NAME: &str = "synthetics_canary";

const CODE_ATTRIBUTES: [&str; 5] = ["handler", "zip_file", "s3_bucket", "s3_key", "s3_version"];

/// Largest `memory_in_mb` a canary run accepts
const MAX_MEMORY_IN_MB: i64 = 3008;

/// Declared attributes that GetCanary does not report
const LOCAL_ATTRIBUTES: [&str; 5] = ["zip_file", "s3_bucket", "s3_key", "s3_version", "start_canary"];

// =============================================================================
// Schema
// =============================================================================

fn int_between(value: &Value, min: i64, max: i64) -> Result<(), String> {
    match value {
        Value::Int(n) if (min..=max).contains(n) => Ok(()),
        Value::Int(n) => Err(format!("{} is not between {} and {}", n, min, max)),
        _ => Err("Expected integer".to_string()),
    }
}

fn canary_name() -> AttributeType {
    AttributeType::Custom {
        name: "CanaryName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if (1..=21).contains(&s.len()) => Ok(()),
            Value::String(s) => Err(format!(
                "canary name {:?} must be between 1 and 21 characters",
                s
            )),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn retention_period() -> AttributeType {
    AttributeType::Custom {
        name: "RetentionPeriod".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| int_between(value, 1, 455),
    }
}

fn memory_in_mb() -> AttributeType {
    AttributeType::Custom {
        name: "MemoryInMb".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (960..=MAX_MEMORY_IN_MB).contains(n) && n % 64 == 0 => Ok(()),
            Value::Int(n) => Err(format!(
                "memory_in_mb {} must be a multiple of 64 between 960 and {}",
                n, MAX_MEMORY_IN_MB
            )),
            _ => Err("Expected integer".to_string()),
        },
    }
}

/// The service reports artifact locations without the `s3://` scheme
fn artifact_location(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::string(strip_s3_scheme(s)),
        other => other.clone(),
    }
}

fn run_timeout() -> AttributeType {
    AttributeType::Custom {
        name: "RunTimeout".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| int_between(value, 60, 840),
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("CloudWatch Synthetics canary")
        .attribute(AttributeSchema::new("name", canary_name()).required().force_new())
        .attribute(
            AttributeSchema::new("artifact_s3_location", AttributeType::String)
                .required()
                .force_new()
                .normalized_with(artifact_location),
        )
        .attribute(AttributeSchema::new("handler", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("zip_file", AttributeType::String)
                .with_description("Path of a local zip archive holding the script")
                .conflicts_with(&["s3_bucket", "s3_key", "s3_version"]),
        )
        .attribute(
            AttributeSchema::new("s3_bucket", AttributeType::String)
                .conflicts_with(&["zip_file"])
                .required_with(&["s3_key"]),
        )
        .attribute(
            AttributeSchema::new("s3_key", AttributeType::String)
                .conflicts_with(&["zip_file"])
                .required_with(&["s3_bucket"]),
        )
        .attribute(
            AttributeSchema::new("s3_version", AttributeType::String).conflicts_with(&["zip_file"]),
        )
        .attribute(AttributeSchema::new("execution_role_arn", types::arn()).required())
        .attribute(
            AttributeSchema::new("start_canary", AttributeType::Bool)
                .with_default(Value::Bool(false)),
        )
        .attribute(
            AttributeSchema::new("failure_retention_period", retention_period())
                .with_default(Value::Int(31)),
        )
        .attribute(
            AttributeSchema::new("success_retention_period", retention_period())
                .with_default(Value::Int(31)),
        )
        .attribute(AttributeSchema::new(
            "run_config",
            AttributeType::Block(vec![
                AttributeSchema::new("memory_in_mb", memory_in_mb()),
                AttributeSchema::new("timeout_in_seconds", run_timeout())
                    .with_default(Value::Int(840)),
            ]),
        ))
        .attribute(
            AttributeSchema::new(
                "schedule",
                AttributeType::Block(vec![
                    AttributeSchema::new("expression", AttributeType::String).required(),
                    AttributeSchema::new("duration_in_seconds", AttributeType::Int),
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new(
            "vpc_config",
            AttributeType::Block(vec![
                AttributeSchema::new("subnet_ids", types::string_list()),
                AttributeSchema::new("security_group_ids", types::string_list()),
                AttributeSchema::new("vpc_id", AttributeType::String).computed(),
            ]),
        ))
        .attribute(AttributeSchema::new("tags", types::string_map()))
        .attribute(AttributeSchema::new("engine_arn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("source_location_arn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("runtime_version", AttributeType::String).computed())
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
}

// =============================================================================
// Declared attributes to requests
// =============================================================================

async fn code_of(resource: &Resource) -> ProviderResult<CanaryCode> {
    let handler = required_str(resource, "handler")?.to_string();

    if let Some(path) = resource.get_non_empty_str("zip_file") {
        let zip_file = tokio::fs::read(path).await.map_err(|e| {
            let message = format!("unable to load {:?}: {}", path, e);
            ProviderError::validation(message).with_cause(e)
        })?;
        return Ok(CanaryCode {
            handler,
            zip_file: Some(zip_file),
            s3_bucket: None,
            s3_key: None,
            s3_version: None,
        });
    }

    let (Some(s3_bucket), Some(s3_key)) = (
        resource.get_non_empty_str("s3_bucket"),
        resource.get_non_empty_str("s3_key"),
    ) else {
        return Err(ProviderError::validation(
            "one of zip_file or s3_bucket and s3_key must be set",
        ));
    };
    Ok(CanaryCode {
        handler,
        zip_file: None,
        s3_bucket: Some(s3_bucket.to_string()),
        s3_key: Some(s3_key.to_string()),
        s3_version: resource.get_non_empty_str("s3_version").map(str::to_string),
    })
}

fn block_int(block: &HashMap<String, Value>, key: &str) -> Option<i64> {
    block.get(key).and_then(Value::as_int)
}

fn schedule_of(resource: &Resource) -> ProviderResult<CanarySchedule> {
    let expression = resource
        .get_map("schedule")
        .and_then(|s| s.get("expression"))
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::validation("schedule.expression is required"))?;
    Ok(CanarySchedule {
        expression: expression.to_string(),
        duration_in_seconds: resource
            .get_map("schedule")
            .and_then(|s| block_int(s, "duration_in_seconds")),
    })
}

/// The Synthetics API takes 32-bit integers
fn narrow(key: &str, n: i64) -> ProviderResult<i32> {
    i32::try_from(n)
        .map_err(|_| ProviderError::validation(format!("{} {} is out of range", key, n)))
}

fn run_config_of(resource: &Resource) -> ProviderResult<Option<CanaryRunConfig>> {
    let Some(run_config) = resource.get_map("run_config") else {
        return Ok(None);
    };
    let field = |key: &str| {
        block_int(run_config, key)
            .map(|n| narrow(key, n))
            .transpose()
    };
    Ok(Some(CanaryRunConfig {
        timeout_in_seconds: field("timeout_in_seconds")?,
        memory_in_mb: field("memory_in_mb")?,
    }))
}

fn vpc_config_of(resource: &Resource) -> Option<CanaryVpcConfig> {
    resource.get_map("vpc_config").map(|v| CanaryVpcConfig {
        subnet_ids: v.get("subnet_ids").map(Value::string_items).unwrap_or_default(),
        security_group_ids: v
            .get("security_group_ids")
            .map(Value::string_items)
            .unwrap_or_default(),
        vpc_id: None,
    })
}

fn retention_of(resource: &Resource, key: &str) -> ProviderResult<Option<i32>> {
    resource.get_int(key).map(|n| narrow(key, n)).transpose()
}

/// Only the declared run settings are compared, the service fills in the rest
fn run_config_changed(from: &State, to: &Resource) -> bool {
    let Some(desired) = to.get_map("run_config") else {
        return false;
    };
    let current = from.get_map("run_config");
    desired
        .iter()
        .any(|(key, value)| current.and_then(|c| c.get(key)) != Some(value))
}

/// Subnets and security groups are sets; `vpc_id` is only reported
fn vpc_config_changed(from: &State, to: &Resource) -> bool {
    let normalized = |block: Option<&HashMap<String, Value>>| {
        block.map(|b| {
            let mut subnets = b.get("subnet_ids").map(Value::string_items).unwrap_or_default();
            let mut groups = b
                .get("security_group_ids")
                .map(Value::string_items)
                .unwrap_or_default();
            subnets.sort();
            groups.sort();
            (subnets, groups)
        })
    };
    normalized(from.get_map("vpc_config")) != normalized(to.get_map("vpc_config"))
}

// =============================================================================
// Remote canary to state
// =============================================================================

fn state_from(id: &ResourceId, canary: Canary, account: &AccountInfo) -> State {
    let name = canary.name.clone();
    let mut attributes = HashMap::new();
    let mut set = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            attributes.insert(key.to_string(), Value::String(value));
        }
    };

    if let Some(arn) = account.arn("synthetics", &format!("canary:{}", name)) {
        set("arn", Some(arn));
    }
    set("name", Some(canary.name));
    set("status", Some(canary.state.to_string()));
    set("engine_arn", canary.engine_arn);
    set("execution_role_arn", canary.execution_role_arn);
    set("runtime_version", canary.runtime_version);
    set("artifact_s3_location", canary.artifact_s3_location);
    set("handler", canary.handler);
    set("source_location_arn", canary.source_location_arn);

    for (key, days) in [
        ("failure_retention_period", canary.failure_retention_period),
        ("success_retention_period", canary.success_retention_period),
    ] {
        if let Some(days) = days {
            attributes.insert(key.to_string(), Value::Int(days as i64));
        }
    }

    if let Some(schedule) = canary.schedule {
        let mut block = HashMap::from([(
            "expression".to_string(),
            Value::String(schedule.expression),
        )]);
        if let Some(duration) = schedule.duration_in_seconds.filter(|d| *d > 0) {
            block.insert("duration_in_seconds".to_string(), Value::Int(duration));
        }
        attributes.insert("schedule".to_string(), Value::Map(block));
    }

    if let Some(run_config) = canary.run_config {
        let mut block = HashMap::new();
        if let Some(timeout) = run_config.timeout_in_seconds {
            block.insert(
                "timeout_in_seconds".to_string(),
                Value::Int(timeout as i64),
            );
        }
        if let Some(memory) = run_config.memory_in_mb.filter(|m| *m > 0) {
            block.insert("memory_in_mb".to_string(), Value::Int(memory as i64));
        }
        attributes.insert("run_config".to_string(), Value::Map(block));
    }

    if let Some(vpc_config) = canary.vpc_config {
        let mut block = HashMap::from([
            (
                "subnet_ids".to_string(),
                Value::string_list(vpc_config.subnet_ids),
            ),
            (
                "security_group_ids".to_string(),
                Value::string_list(vpc_config.security_group_ids),
            ),
        ]);
        if let Some(vpc_id) = vpc_config.vpc_id {
            block.insert("vpc_id".to_string(), Value::String(vpc_id));
        }
        attributes.insert("vpc_config".to_string(), Value::Map(block));
    }

    attributes.insert("tags".to_string(), tags_value(canary.tags));

    State::existing(id.clone(), attributes).with_identifier(name)
}

// =============================================================================
// Handler
// =============================================================================

pub struct CanaryHandler {
    api: Arc<dyn SyntheticsApi>,
    account: AccountInfo,
    waits: WaitSettings,
}

impl CanaryHandler {
    pub fn new(api: Arc<dyn SyntheticsApi>, account: AccountInfo, waits: WaitSettings) -> Self {
        Self {
            api,
            account,
            waits,
        }
    }

    async fn start(&self, name: &str) -> ProviderResult<()> {
        debug!("starting canary {}", name);
        self.api
            .start_canary(name)
            .await
            .map_err(|e| ProviderError::from(e).context("starting canary"))?;
        wait_running(self.api.as_ref(), name, &self.waits)
            .await
            .map_err(|e| ProviderError::from(e).context("waiting for canary to be running"))?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> ProviderResult<()> {
        debug!("stopping canary {}", name);
        self.api
            .stop_canary(name)
            .await
            .map_err(|e| ProviderError::from(e).context("stopping canary"))?;
        wait_stopped(self.api.as_ref(), name, &self.waits)
            .await
            .map_err(|e| ProviderError::from(e).context("waiting for canary to be stopped"))?;
        Ok(())
    }

    async fn current(&self, name: &str) -> ProviderResult<Canary> {
        self.api
            .get_canary(name)
            .await
            .map_err(|e| ProviderError::from(e).context("reading canary"))
    }

    async fn update_request(
        &self,
        name: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<UpdateCanaryRequest> {
        let changes = differ::diff(&schema(), from, to);
        let mut request = UpdateCanaryRequest::new(name);

        if changes.has_any(&CODE_ATTRIBUTES) {
            request.code = Some(code_of(to).await?);
        }
        if changes.has_change("execution_role_arn") {
            request.execution_role_arn = to.get_str("execution_role_arn").map(str::to_string);
        }
        if changes.has_change("schedule") {
            request.schedule = Some(schedule_of(to)?);
        }
        if run_config_changed(from, to) {
            request.run_config = run_config_of(to)?;
        }
        if vpc_config_changed(from, to) {
            request.vpc_config = Some(vpc_config_of(to).unwrap_or_default());
        }
        if changes.has_change("failure_retention_period") {
            request.failure_retention_period = retention_of(to, "failure_retention_period")?;
        }
        if changes.has_change("success_retention_period") {
            request.success_retention_period = retention_of(to, "success_retention_period")?;
        }
        Ok(request)
    }

    async fn update_tags(&self, name: &str, from: &State, to: &Resource) -> ProviderResult<()> {
        let changes = diff_tags(&from.get_string_map("tags"), &to.get_string_map("tags"));
        if changes.is_empty() {
            return Ok(());
        }
        let arn = self
            .account
            .arn("synthetics", &format!("canary:{}", name))
            .ok_or_else(|| {
                ProviderError::new("cannot update canary tags: the account id is unknown")
            })?;

        if !changes.remove.is_empty() {
            debug!("removing tags {:?} from {}", changes.remove, arn);
            self.api
                .untag_resource(&arn, changes.remove)
                .await
                .map_err(|e| ProviderError::from(e).context("untagging canary"))?;
        }
        if !changes.upsert.is_empty() {
            debug!("tagging {}", arn);
            self.api
                .tag_resource(&arn, changes.upsert.into_iter().collect())
                .await
                .map_err(|e| ProviderError::from(e).context("tagging canary"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceHandler for CanaryHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let resource = prepare(&schema(), resource)?;
        let request = CreateCanaryRequest {
            name: required_str(&resource, "name")?.to_string(),
            artifact_s3_location: required_str(&resource, "artifact_s3_location")?.to_string(),
            execution_role_arn: required_str(&resource, "execution_role_arn")?.to_string(),
            runtime_version: RUNTIME_VERSION.to_string(),
            code: code_of(&resource).await?,
            schedule: schedule_of(&resource)?,
            run_config: run_config_of(&resource)?,
            vpc_config: vpc_config_of(&resource),
            failure_retention_period: retention_of(&resource, "failure_retention_period")?,
            success_retention_period: retention_of(&resource, "success_retention_period")?,
            tags: ignore_aws_tags(resource.get_string_map("tags")),
        };

        debug!("creating canary {}", request.name);
        let name = self
            .api
            .create_canary(&request)
            .await
            .map_err(|e| ProviderError::from(e).context("creating canary"))?;

        wait_ready(self.api.as_ref(), &name, &self.waits)
            .await
            .map_err(|e| {
                ProviderError::from(e)
                    .context("waiting for canary to be ready")
                    .with_identifier(&name)
            })?;

        if resource.get_bool("start_canary") == Some(true) {
            self.start(&name)
                .await
                .map_err(|e| e.with_identifier(&name))?;
        }

        let state = self.read(&resource.id, &name).await?;
        Ok(with_declared(state, &resource, &LOCAL_ATTRIBUTES))
    }

    async fn read(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        match self.api.get_canary(identifier).await {
            Ok(canary) => Ok(state_from(id, canary, &self.account)),
            Err(e) if e.is_not_found() => {
                warn!("canary {} not found, removing from state", identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(ProviderError::from(e).context("reading canary")),
        }
    }

    async fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let to = prepare(&schema(), to)?;
        let request = self.update_request(identifier, from, &to).await?;

        if request.has_changes() {
            if self.current(identifier).await?.state == CanaryState::Running {
                self.stop(identifier).await?;
            }
            debug!("updating canary {}", identifier);
            self.api
                .update_canary(&request)
                .await
                .map_err(|e| ProviderError::from(e).context("updating canary"))?;
            wait_ready(self.api.as_ref(), identifier, &self.waits)
                .await
                .map_err(|e| ProviderError::from(e).context("waiting for canary to be ready"))?;
        }

        let running = self.current(identifier).await?.state == CanaryState::Running;
        match (to.get_bool("start_canary").unwrap_or(false), running) {
            (true, false) => self.start(identifier).await?,
            (false, true) => self.stop(identifier).await?,
            _ => {}
        }

        self.update_tags(identifier, from, &to).await?;

        let state = self.read(id, identifier).await?;
        Ok(with_declared(state, &to, &LOCAL_ATTRIBUTES))
    }

    async fn delete(&self, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let canary = match self.api.get_canary(identifier).await {
            Ok(canary) => canary,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(ProviderError::from(e).context("reading canary")),
        };
        if canary.state == CanaryState::Running {
            self.stop(identifier).await?;
        }

        debug!("deleting canary {}", identifier);
        match self.api.delete_canary(identifier).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(ProviderError::from(e).context("deleting canary")),
        }

        match wait_deleted(self.api.as_ref(), identifier, &self.waits).await {
            Err(e) if e.is_not_found() => Ok(()),
            result => result
                .map_err(|e| ProviderError::from(e).context("waiting for canary deletion")),
        }
    }
}
