//! Nimbus AWS Provider
//!
//! Resource handlers for AWS resources whose remote operations complete
//! asynchronously. Every handler issues its API call and then waits, through
//! [`nimbus_core::waiter`], until the remote side reports the desired state.

pub mod account;
pub mod config;
pub mod dynamodb;
pub mod error;
pub mod resources;
pub mod sagemaker;
pub mod sns;
pub mod synthetics;
pub mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use log::debug;
use nimbus_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use nimbus_core::resource::{Resource, ResourceId, State};
use tokio_util::sync::CancellationToken;

use crate::account::AccountInfo;
use crate::config::{ConfigError, ProviderConfig};
use crate::dynamodb::SdkDynamoDb;
use crate::dynamodb::contributor_insights::ContributorInsightsHandler;
use crate::resources::ResourceHandler;
use crate::sagemaker::SdkSageMaker;
use crate::sagemaker::notebook_instance::NotebookInstanceHandler;
use crate::sns::SdkSns;
use crate::sns::topic_subscription::TopicSubscriptionHandler;
use crate::synthetics::SdkSynthetics;
use crate::synthetics::canary::CanaryHandler;

/// AWS Provider
pub struct AwsProvider {
    handlers: Vec<Box<dyn ResourceHandler>>,
    cancel: CancellationToken,
}

impl AwsProvider {
    /// Create a new AWS Provider
    ///
    /// Credentials come from the default AWS chain, optionally narrowed to the
    /// configured profile.
    pub async fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.resolve_region() {
            loader = loader.region(Region::new(region));
        }
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or(ConfigError::MissingRegion)?;
        debug!("aws provider using region {}", region);

        let sts = aws_sdk_sts::Client::new(&sdk_config);
        let account = AccountInfo::resolve(&config, &region, &sts).await;

        let cancel = CancellationToken::new();
        let handlers: Vec<Box<dyn ResourceHandler>> = vec![
            Box::new(ContributorInsightsHandler::new(
                Arc::new(SdkDynamoDb::new(aws_sdk_dynamodb::Client::new(&sdk_config))),
                config.contributor_insights_waits(&cancel),
            )),
            Box::new(TopicSubscriptionHandler::new(
                Arc::new(SdkSns::new(aws_sdk_sns::Client::new(&sdk_config))),
                config.subscription_waits(&cancel),
            )),
            Box::new(CanaryHandler::new(
                Arc::new(SdkSynthetics::new(aws_sdk_synthetics::Client::new(
                    &sdk_config,
                ))),
                account,
                config.canary_waits(&cancel),
            )),
            Box::new(NotebookInstanceHandler::new(
                Arc::new(SdkSageMaker::new(aws_sdk_sagemaker::Client::new(
                    &sdk_config,
                ))),
                config.notebook_instance_waits(&cancel),
            )),
        ];

        Ok(Self::with_handlers(handlers, cancel))
    }

    /// Create with specific handlers (for testing)
    pub fn with_handlers(handlers: Vec<Box<dyn ResourceHandler>>, cancel: CancellationToken) -> Self {
        Self { handlers, cancel }
    }

    /// Token that stops every wait in progress
    ///
    /// Cancelling only ends the waiting; remote operations already issued
    /// keep running on the AWS side.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn handler(&self, id: &ResourceId) -> ProviderResult<&dyn ResourceHandler> {
        self.handlers
            .iter()
            .find(|h| h.type_name() == id.resource_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| {
                ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                    .for_resource(id.clone())
            })
    }
}

/// Attach the resource and its remote identifier to an error
fn locate(err: ProviderError, id: &ResourceId, identifier: Option<&str>) -> ProviderError {
    let err = err.for_resource(id.clone());
    match identifier {
        Some(identifier) if err.identifier.is_none() => err.with_identifier(identifier),
        _ => err,
    }
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            let handler = self.handler(&id)?;
            let Some(identifier) = identifier else {
                return Ok(State::not_found(id));
            };
            handler
                .read(&id, &identifier)
                .await
                .map_err(|e| locate(e, &id, Some(&identifier)))
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            self.handler(&resource.id)?
                .create(&resource)
                .await
                .map_err(|e| locate(e, &resource.id, None))
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            self.handler(&id)?
                .update(&id, &identifier, &from, &to)
                .await
                .map_err(|e| locate(e, &id, Some(&identifier)))
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            self.handler(&id)?
                .delete(&id, &identifier)
                .await
                .map_err(|e| locate(e, &id, Some(&identifier)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::id;
    use async_trait::async_trait;
    use nimbus_core::provider::ErrorKind;
    use nimbus_core::resource::Value;
    use nimbus_core::schema::ResourceSchema;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Handler keeping resources in memory, keyed by identifier
    #[derive(Default)]
    struct MemoryHandler {
        stored: Mutex<HashMap<String, Resource>>,
    }

    #[async_trait]
    impl ResourceHandler for MemoryHandler {
        fn type_name(&self) -> &'static str {
            "memory"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("memory")
        }

        async fn create(&self, resource: &Resource) -> ProviderResult<State> {
            if resource.attributes.contains_key("broken") {
                return Err(ProviderError::new("refused"));
            }
            let identifier = format!("mem-{}", resource.id.name);
            self.stored
                .lock()
                .unwrap()
                .insert(identifier.clone(), resource.clone());
            Ok(State::existing(resource.id.clone(), resource.attributes.clone())
                .with_identifier(identifier))
        }

        async fn read(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
            Ok(match self.stored.lock().unwrap().get(identifier) {
                Some(resource) => State::existing(id.clone(), resource.attributes.clone())
                    .with_identifier(identifier),
                None => State::not_found(id.clone()),
            })
        }

        async fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> ProviderResult<State> {
            let mut stored = self.stored.lock().unwrap();
            if !stored.contains_key(identifier) {
                return Err(ProviderError::new("gone").with_kind(ErrorKind::NotFound));
            }
            stored.insert(identifier.to_string(), to.clone());
            Ok(State::existing(id.clone(), to.attributes.clone()).with_identifier(identifier))
        }

        async fn delete(&self, _id: &ResourceId, identifier: &str) -> ProviderResult<()> {
            self.stored.lock().unwrap().remove(identifier);
            Ok(())
        }
    }

    fn provider() -> AwsProvider {
        AwsProvider::with_handlers(
            vec![Box::new(MemoryHandler::default())],
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn dispatches_by_resource_type() {
        let provider = provider();
        let resource =
            Resource::new("memory", "one").with_attribute("size", Value::Int(3));

        let created = provider.create(&resource).await.unwrap();
        let identifier = created.identifier.clone().unwrap();
        assert_eq!(identifier, "mem-one");

        let read = provider
            .read(&resource.id, Some(&identifier))
            .await
            .unwrap();
        assert!(read.exists);

        let resized = resource.clone().with_attribute("size", Value::Int(5));
        let updated = provider
            .update(&resource.id, &identifier, &read, &resized)
            .await
            .unwrap();
        assert_eq!(updated.attributes.get("size"), Some(&Value::Int(5)));

        provider.delete(&resource.id, &identifier).await.unwrap();
        let gone = provider
            .read(&resource.id, Some(&identifier))
            .await
            .unwrap();
        assert!(!gone.exists);
    }

    #[tokio::test]
    async fn read_without_identifier_is_not_found() {
        let state = provider()
            .read(&id("memory", "one"), None)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn unknown_resource_type_is_an_error() {
        let err = provider()
            .read(&id("s3_bucket", "logs"), Some("logs"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "[s3_bucket.logs] Unknown resource type: s3_bucket");
    }

    #[tokio::test]
    async fn errors_carry_resource_and_identifier() {
        let provider = provider();
        let resource = Resource::new("memory", "two");
        let state = provider.read(&resource.id, Some("mem-two")).await.unwrap();

        let err = provider
            .update(&resource.id, "mem-two", &state, &resource)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "[memory.two (mem-two)] gone");

        let broken = resource.with_attribute("broken", Value::Bool(true));
        let err = provider.create(&broken).await.unwrap_err();
        assert_eq!(err.to_string(), "[memory.two] refused");
    }

    #[test]
    fn resource_types_cover_every_handler() {
        let names: Vec<&str> = resources::resource_types()
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&"synthetics_canary"));
        assert!(names.contains(&"sagemaker_notebook_instance"));
    }
}
