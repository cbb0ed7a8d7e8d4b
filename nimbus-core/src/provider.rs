//! Provider - Trait abstracting resource operations
//!
//! A Provider exposes a catalog of resource types and turns the hosting
//! engine's create/read/update/delete intents into remote API calls.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;
use crate::waiter::WaitError;

/// Classified failure of a single remote API call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The remote resource does not exist
    #[error("{operation}: resource not found: {message}")]
    NotFound {
        operation: &'static str,
        message: String,
    },

    /// The service rejected the request (validation, throttling, internal errors)
    #[error("{operation} failed ({code}): {message}")]
    Service {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// The request never produced a service response (network, timeout, signing)
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The request could not be built from the declared attributes
    #[error("{operation}: invalid request: {message}")]
    InvalidRequest {
        operation: &'static str,
        message: String,
    },

    /// The service answered, but without a field the caller relies on
    #[error("{operation} returned an invalid response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn not_found(operation: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            operation,
            message: message.into(),
        }
    }

    pub fn service(
        operation: &'static str,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Service {
            operation,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    pub fn invalid_request(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            operation,
            message: message.into(),
        }
    }

    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result of a remote API call
pub type ApiResult<T> = Result<T, ApiError>;

/// Category of a provider failure, for callers that need to branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote resource is absent
    NotFound,
    /// A remote call failed
    Api,
    /// The remote reported a failure status inside a successful response
    EmbeddedFailure,
    /// A waiter ran out of time
    Timeout,
    /// A waiter observed a status it does not model
    UnexpectedStatus,
    /// The waiter was cancelled by its caller
    Cancelled,
    /// The declared configuration is invalid
    Validation,
    Other,
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub kind: ErrorKind,
    pub resource_id: Option<ResourceId>,
    /// Remote identifier of the resource, when one was assigned
    pub identifier: Option<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.resource_id, &self.identifier) {
            (Some(id), Some(identifier)) => write!(
                f,
                "[{}.{} ({})] {}",
                id.resource_type, id.name, identifier, self.message
            ),
            (Some(id), None) => write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Other,
            resource_id: None,
            identifier: None,
            cause: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Validation)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Prefix the message with what was being attempted
    pub fn context(mut self, context: impl std::fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<ApiError> for ProviderError {
    fn from(err: ApiError) -> Self {
        let kind = match err {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::InvalidRequest { .. } => ErrorKind::Validation,
            _ => ErrorKind::Api,
        };
        Self::new(err.to_string()).with_kind(kind).with_cause(err)
    }
}

impl From<WaitError> for ProviderError {
    fn from(err: WaitError) -> Self {
        let kind = match &err {
            WaitError::Remote(api) if api.is_not_found() => ErrorKind::NotFound,
            WaitError::Remote(_) => ErrorKind::Api,
            WaitError::EmbeddedFailure { .. } => ErrorKind::EmbeddedFailure,
            WaitError::UnexpectedStatus { .. } | WaitError::Vanished { .. } => {
                ErrorKind::UnexpectedStatus
            }
            WaitError::Timeout { .. } => ErrorKind::Timeout,
            WaitError::Cancelled { .. } => ErrorKind::Cancelled,
        };
        Self::new(err.to_string()).with_kind(kind).with_cause(err)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "synthetics_canary")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
    }
}

/// Main Provider trait
///
/// Each cloud provider implements this trait. All operations are async and
/// involve side effects against the remote API.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "aws")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist, or if no
    /// identifier has been assigned yet.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the remote identifier
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    ///
    /// Deleting a resource that is already gone succeeds.
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}
