//! Resource type definitions
//!
//! This module defines:
//! - The [`ResourceHandler`] trait implemented by every resource kind
//! - Resource type definitions (implementing the `ResourceType` trait)
//! - Shared preparation of declared resources before they reach a handler

use async_trait::async_trait;
use nimbus_core::provider::{ProviderError, ProviderResult, ResourceType};
use nimbus_core::resource::{Attributes, Resource, ResourceId, State};
use nimbus_core::schema::ResourceSchema;

use crate::dynamodb::contributor_insights;
use crate::sagemaker::notebook_instance;
use crate::sns::topic_subscription;
use crate::synthetics::canary;

/// CRUD entry points of one resource kind
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Create the remote resource and return its state with the identifier set
    async fn create(&self, resource: &Resource) -> ProviderResult<State>;

    /// Current state, or `State::not_found` when the remote resource is gone
    async fn read(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State>;

    async fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State>;

    /// Delete the remote resource; an already deleted resource is not an error
    async fn delete(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()>;
}

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $module::TYPE_NAME
            }
            fn schema(&self) -> ResourceSchema {
                $module::schema()
            }
        }
    };
}

define_resource_type!(ContributorInsightsType, contributor_insights);
define_resource_type!(TopicSubscriptionType, topic_subscription);
define_resource_type!(CanaryType, canary);
define_resource_type!(NotebookInstanceType, notebook_instance);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(ContributorInsightsType),
        Box::new(TopicSubscriptionType),
        Box::new(CanaryType),
        Box::new(NotebookInstanceType),
    ]
}

// =============================================================================
// Preparation
// =============================================================================

/// Apply schema defaults and validate a declared resource
pub fn prepare(schema: &ResourceSchema, resource: &Resource) -> ProviderResult<Resource> {
    let mut prepared = resource.clone();
    schema.apply_defaults(&mut prepared.attributes);
    schema.validate(&prepared.attributes).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        ProviderError::validation(messages.join("; "))
    })?;
    Ok(prepared)
}

/// A string attribute that must be set and non-empty
pub fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_non_empty_str(key).ok_or_else(|| {
        ProviderError::validation(format!("Required attribute '{}' is missing", key))
    })
}

/// Carry attributes the remote API never echoes back over from the declaration
pub fn with_declared(mut state: State, resource: &Resource, names: &[&str]) -> State {
    if !state.exists {
        return state;
    }
    for name in names {
        if let Some(value) = resource.get(name) {
            state.attributes.insert(name.to_string(), value.clone());
        }
    }
    state
}
