//! SNS topic subscriptions

pub mod sdk;
pub mod topic_subscription;
pub mod waiter;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use nimbus_core::provider::{ApiResult, ProviderError};

pub use sdk::SdkSns;

/// Delivery protocols a managed subscription may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Application,
    Http,
    Https,
    Lambda,
    Sms,
    Sqs,
}

impl Protocol {
    pub const VALUES: [&'static str; 6] = ["application", "http", "https", "lambda", "sms", "sqs"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Http => "http",
            Self::Https => "https",
            Self::Lambda => "lambda",
            Self::Sms => "sms",
            Self::Sqs => "sqs",
        }
    }

    /// Endpoints of these protocols must confirm the subscription themselves
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

impl FromStr for Protocol {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "application" => Ok(Self::Application),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "lambda" => Ok(Self::Lambda),
            "sms" => Ok(Self::Sms),
            "sqs" => Ok(Self::Sqs),
            _ => Err(ProviderError::validation(format!(
                "unsupported protocol {:?}, expected one of: {}",
                s,
                Self::VALUES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription attribute names used by the handler
pub mod attribute {
    pub const DELIVERY_POLICY: &str = "DeliveryPolicy";
    pub const ENDPOINT: &str = "Endpoint";
    pub const FILTER_POLICY: &str = "FilterPolicy";
    pub const OWNER: &str = "Owner";
    pub const PROTOCOL: &str = "Protocol";
    pub const RAW_MESSAGE_DELIVERY: &str = "RawMessageDelivery";
    pub const SUBSCRIPTION_ARN: &str = "SubscriptionArn";
    pub const TOPIC_ARN: &str = "TopicArn";
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    pub topic_arn: String,
    pub protocol: Protocol,
    pub endpoint: String,
    /// Only non-default attributes are sent
    pub attributes: HashMap<String, String>,
}

/// One entry of ListSubscriptionsByTopic
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionSummary {
    pub subscription_arn: Option<String>,
    pub owner: Option<String>,
    pub protocol: Option<String>,
    pub endpoint: Option<String>,
    pub topic_arn: Option<String>,
}

/// Existence of a subscription, as seen by the deletion wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Available,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("available"),
        }
    }
}

/// Whether a subscription created with a pending ARN has been confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    PendingConfirmation,
    Confirmed,
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingConfirmation => f.write_str("pending confirmation"),
            Self::Confirmed => f.write_str("confirmed"),
        }
    }
}

/// The SNS calls used by the subscription handler
#[async_trait]
pub trait SnsApi: Send + Sync {
    /// Returns the subscription ARN, which may be a "pending confirmation" placeholder
    async fn subscribe(&self, request: &SubscribeRequest) -> ApiResult<String>;

    async fn get_subscription_attributes(&self, arn: &str)
    -> ApiResult<HashMap<String, String>>;

    async fn set_subscription_attribute(&self, arn: &str, name: &str, value: &str)
    -> ApiResult<()>;

    async fn unsubscribe(&self, arn: &str) -> ApiResult<()>;

    /// All subscriptions of a topic, across every page
    async fn list_subscriptions_by_topic(
        &self,
        topic_arn: &str,
    ) -> ApiResult<Vec<SubscriptionSummary>>;
}
