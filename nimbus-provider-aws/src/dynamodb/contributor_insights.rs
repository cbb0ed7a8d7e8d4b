//! `dynamodb_table_contributor_insights` resource
//!
//! The remote identifier is the table name, followed by `/index/<name>` when
//! a global secondary index is targeted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use nimbus_core::differ;
use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Attributes, Resource, ResourceId, State, Value};
use nimbus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::waiter::{wait_disabled, wait_enabled};
use super::{
    ContributorInsightsAction, ContributorInsightsDescription, ContributorInsightsKey,
    ContributorInsightsStatus, DynamoDbApi,
};
use crate::config::WaitSettings;
use crate::resources::{ResourceHandler, prepare, required_str};

pub const TYPE_NAME: &str = "dynamodb_table_contributor_insights";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Contributor insights of a DynamoDB table or global secondary index")
        .attribute(
            AttributeSchema::new("table_name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new(
                "contributor_insights_action",
                AttributeType::Enum(
                    ContributorInsightsAction::VALUES
                        .iter()
                        .map(|v| v.to_string())
                        .collect(),
                ),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("index_name", AttributeType::String).force_new())
        .attribute(
            AttributeSchema::new("contributor_insights_rule_list", types::string_list())
                .computed(),
        )
}

pub struct ContributorInsightsHandler {
    api: Arc<dyn DynamoDbApi>,
    waits: WaitSettings,
}

impl ContributorInsightsHandler {
    pub fn new(api: Arc<dyn DynamoDbApi>, waits: WaitSettings) -> Self {
        Self { api, waits }
    }

    /// Issue the action and block until the status settles
    async fn apply(
        &self,
        key: &ContributorInsightsKey,
        action: ContributorInsightsAction,
    ) -> ProviderResult<()> {
        debug!(
            "updating contributor insights of {} to {}",
            key,
            action.as_str()
        );
        self.api
            .update_contributor_insights(key, action)
            .await
            .map_err(|e| ProviderError::from(e).context("updating contributor insights"))?;

        let api = self.api.as_ref();
        let (waited, target) = match action {
            ContributorInsightsAction::Enable => {
                (wait_enabled(api, key, &self.waits).await, "enabled")
            }
            ContributorInsightsAction::Disable => {
                (wait_disabled(api, key, &self.waits).await, "disabled")
            }
        };
        waited.map(|_| ()).map_err(|e| {
            ProviderError::from(e)
                .context(format!("waiting for contributor insights to be {}", target))
        })
    }
}

fn action_of(resource: &Resource) -> ProviderResult<ContributorInsightsAction> {
    required_str(resource, "contributor_insights_action")?.parse()
}

fn state_from(
    id: &ResourceId,
    key: &ContributorInsightsKey,
    description: ContributorInsightsDescription,
) -> State {
    let action = match description.status {
        Some(ContributorInsightsStatus::Enabled) => ContributorInsightsAction::Enable,
        _ => ContributorInsightsAction::Disable,
    };

    let mut attributes = HashMap::new();
    attributes.insert(
        "table_name".to_string(),
        Value::String(description.table_name),
    );
    if let Some(index) = description.index_name {
        attributes.insert("index_name".to_string(), Value::String(index));
    }
    attributes.insert(
        "contributor_insights_action".to_string(),
        Value::string(action.as_str()),
    );
    attributes.insert(
        "contributor_insights_rule_list".to_string(),
        Value::string_list(description.rule_list),
    );

    State::existing(id.clone(), attributes).with_identifier(key.identifier())
}

#[async_trait]
impl ResourceHandler for ContributorInsightsHandler {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let resource = prepare(&schema(), resource)?;
        let action = action_of(&resource)?;
        let key = ContributorInsightsKey::new(
            required_str(&resource, "table_name")?,
            resource.get_non_empty_str("index_name").map(str::to_string),
        );
        let identifier = key.identifier();

        self.apply(&key, action)
            .await
            .map_err(|e| e.with_identifier(&identifier))?;

        self.read(&resource.id, &identifier).await
    }

    async fn read(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let key = ContributorInsightsKey::parse(identifier)?;
        match self.api.describe_contributor_insights(&key).await {
            Ok(description) => Ok(state_from(id, &key, description)),
            Err(e) if e.is_not_found() => {
                warn!(
                    "contributor insights of {} not found, removing from state",
                    key
                );
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(ProviderError::from(e).context("reading contributor insights")),
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
        let key = ContributorInsightsKey::parse(identifier)?;

        if differ::diff(&schema(), from, &to).has_change("contributor_insights_action") {
            self.apply(&key, action_of(&to)?).await?;
        }

        self.read(id, identifier).await
    }

    async fn delete(&self, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let key = ContributorInsightsKey::parse(identifier)?;
        match self.apply(&key, ContributorInsightsAction::Disable).await {
            Err(e) if e.is_not_found() => {
                debug!("contributor insights of {} already gone", key);
                Ok(())
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{id, init_logger};
    use nimbus_core::provider::{ApiError, ApiResult, ErrorKind};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use ContributorInsightsStatus::*;

    /// In-memory DynamoDB that walks through transitional statuses
    #[derive(Default)]
    struct FakeDynamoDb {
        inner: Mutex<FakeState>,
    }

    #[derive(Default)]
    struct FakeState {
        calls: Vec<String>,
        table_exists: bool,
        current: Option<ContributorInsightsStatus>,
        script: VecDeque<ContributorInsightsStatus>,
        failure: Option<String>,
        /// Keep reporting the transitional status forever
        stuck: bool,
    }

    impl FakeDynamoDb {
        fn with_table() -> Self {
            let fake = Self::default();
            {
                let mut state = fake.inner.lock().unwrap();
                state.table_exists = true;
                state.current = Some(Disabled);
            }
            fake
        }

        fn calls(&self) -> Vec<String> {
            self.inner.lock().unwrap().calls.clone()
        }
    }

    #[async_trait]
    impl DynamoDbApi for FakeDynamoDb {
        async fn update_contributor_insights(
            &self,
            key: &ContributorInsightsKey,
            action: ContributorInsightsAction,
        ) -> ApiResult<()> {
            let mut state = self.inner.lock().unwrap();
            state
                .calls
                .push(format!("update {} {}", key, action.as_str()));
            if !state.table_exists {
                return Err(ApiError::not_found(
                    "UpdateContributorInsights",
                    "Requested resource not found",
                ));
            }
            if state.stuck {
                state.current = Some(Enabling);
            } else if state.script.is_empty() {
                let steps = match action {
                    ContributorInsightsAction::Enable => [Enabling, Enabled],
                    ContributorInsightsAction::Disable => [Disabling, Disabled],
                };
                state.script.extend(steps);
            }
            Ok(())
        }

        async fn describe_contributor_insights(
            &self,
            key: &ContributorInsightsKey,
        ) -> ApiResult<ContributorInsightsDescription> {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(format!("describe {}", key));
            if !state.table_exists {
                return Err(ApiError::not_found(
                    "DescribeContributorInsights",
                    "Requested resource not found",
                ));
            }
            if let Some(next) = state.script.pop_front() {
                state.current = Some(next);
            }
            let rule_list = match state.current {
                Some(Enabled) => vec!["DynamoDBContributorInsights-PKC-orders".to_string()],
                _ => Vec::new(),
            };
            Ok(ContributorInsightsDescription {
                table_name: key.table_name.clone(),
                index_name: key.index_name.clone(),
                rule_list,
                status: state.current.clone(),
                failure: state.failure.clone(),
            })
        }
    }

    fn handler(api: Arc<FakeDynamoDb>) -> ContributorInsightsHandler {
        ContributorInsightsHandler::new(api, WaitSettings::default())
    }

    fn declared(action: &str) -> Resource {
        Resource::new(TYPE_NAME, "orders")
            .with_attribute("table_name", Value::string("orders"))
            .with_attribute("contributor_insights_action", Value::string(action))
    }

    #[tokio::test(start_paused = true)]
    async fn create_enables_and_reads_back() {
        init_logger();
        let api = Arc::new(FakeDynamoDb::with_table());
        let state = handler(api.clone()).create(&declared("ENABLE")).await.unwrap();

        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("orders"));
        assert_eq!(state.get_str("contributor_insights_action"), Some("ENABLE"));
        assert_eq!(
            state.get_strings("contributor_insights_rule_list"),
            vec!["DynamoDBContributorInsights-PKC-orders"]
        );
        assert_eq!(
            api.calls(),
            vec![
                "update orders ENABLE",
                "describe orders",
                "describe orders",
                "describe orders",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn create_for_index_uses_composite_identifier() {
        let api = Arc::new(FakeDynamoDb::with_table());
        let resource =
            declared("ENABLE").with_attribute("index_name", Value::string("by-customer"));
        let state = handler(api).create(&resource).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("orders/index/by-customer"));
        assert_eq!(state.get_str("index_name"), Some("by-customer"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_surfaces_embedded_failure() {
        let api = Arc::new(FakeDynamoDb::with_table());
        {
            let mut state = api.inner.lock().unwrap();
            state.script.extend([Enabling, Failed]);
            state.failure = Some("ValidationException: table is being deleted".to_string());
        }
        let err = handler(api).create(&declared("ENABLE")).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::EmbeddedFailure);
        assert_eq!(err.identifier.as_deref(), Some("orders"));
        assert!(err.message.contains("table is being deleted"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_times_out_when_status_never_settles() {
        let api = Arc::new(FakeDynamoDb::with_table());
        api.inner.lock().unwrap().stuck = true;
        let handler = ContributorInsightsHandler::new(
            api,
            WaitSettings::default().with_timeout(Duration::from_secs(20)),
        );
        let err = handler.create(&declared("ENABLE")).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("last status: ENABLING"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_invalid_action() {
        let api = Arc::new(FakeDynamoDb::with_table());
        let err = handler(api.clone())
            .create(&declared("TOGGLE"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn read_missing_table_drops_state_twice() {
        let api = Arc::new(FakeDynamoDb::default());
        let handler = handler(api);
        let id = id(TYPE_NAME, "orders");

        let first = handler.read(&id, "orders").await.unwrap();
        let second = handler.read(&id, "orders").await.unwrap();
        assert!(!first.exists);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn read_maps_non_enabled_statuses_to_disable() {
        let api = Arc::new(FakeDynamoDb::with_table());
        api.inner.lock().unwrap().current = Some(Disabling);
        let state = handler(api)
            .read(&id(TYPE_NAME, "orders"), "orders")
            .await
            .unwrap();
        assert_eq!(state.get_str("contributor_insights_action"), Some("DISABLE"));
    }

    #[tokio::test(start_paused = true)]
    async fn update_switches_action() {
        let api = Arc::new(FakeDynamoDb::with_table());
        let handler = handler(api.clone());
        let created = handler.create(&declared("ENABLE")).await.unwrap();

        let updated = handler
            .update(&created.id, "orders", &created, &declared("DISABLE"))
            .await
            .unwrap();

        assert_eq!(updated.get_str("contributor_insights_action"), Some("DISABLE"));
        assert!(api.calls().contains(&"update orders DISABLE".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn update_without_action_change_only_reads() {
        let api = Arc::new(FakeDynamoDb::with_table());
        let handler = handler(api.clone());
        let created = handler.create(&declared("ENABLE")).await.unwrap();
        let calls_before = api.calls().len();

        handler
            .update(&created.id, "orders", &created, &declared("ENABLE"))
            .await
            .unwrap();

        assert_eq!(&api.calls()[calls_before..], ["describe orders"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_disables_and_waits() {
        let api = Arc::new(FakeDynamoDb::with_table());
        let handler = handler(api.clone());
        handler.create(&declared("ENABLE")).await.unwrap();

        handler.delete(&id(TYPE_NAME, "orders"), "orders").await.unwrap();

        let state = handler.read(&id(TYPE_NAME, "orders"), "orders").await.unwrap();
        assert_eq!(state.get_str("contributor_insights_action"), Some("DISABLE"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_of_missing_table_succeeds() {
        let api = Arc::new(FakeDynamoDb::default());
        handler(api)
            .delete(&id(TYPE_NAME, "orders"), "orders/index/by-customer")
            .await
            .unwrap();
    }
}
