//! Subscription probers and waits

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use nimbus_core::provider::ApiResult;
use nimbus_core::waiter::{Probe, StatusProber, WaitError, WaitSpec};

use super::{ConfirmationStatus, Protocol, SnsApi, SubscriptionStatus};
use crate::config::WaitSettings;
use crate::utils::{has_pending_confirmation, obfuscate_endpoint};

/// Reads the attributes of one subscription; a missing subscription is absent
pub struct SubscriptionProber<'a> {
    api: &'a dyn SnsApi,
    arn: &'a str,
}

impl<'a> SubscriptionProber<'a> {
    pub fn new(api: &'a dyn SnsApi, arn: &'a str) -> Self {
        Self { api, arn }
    }
}

#[async_trait]
impl StatusProber for SubscriptionProber<'_> {
    type Status = SubscriptionStatus;
    type Snapshot = HashMap<String, String>;

    async fn probe(&self) -> Result<Probe<Self::Snapshot, Self::Status>, WaitError> {
        match self.api.get_subscription_attributes(self.arn).await {
            Err(e) if e.is_not_found() => Ok(Probe::Absent),
            Err(e) => Err(e.into()),
            Ok(attributes) if attributes.is_empty() => Ok(Probe::Absent),
            Ok(attributes) => Ok(Probe::observed(SubscriptionStatus::Available, attributes)),
        }
    }
}

pub fn deleted_spec() -> WaitSpec<SubscriptionStatus> {
    WaitSpec::until_gone().pending([SubscriptionStatus::Available])
}

pub async fn wait_deleted(
    api: &dyn SnsApi,
    arn: &str,
    waits: &WaitSettings,
) -> Result<(), WaitError> {
    waits
        .waiter(arn, deleted_spec())
        .wait(&SubscriptionProber::new(api, arn))
        .await
        .map(|_| ())
}

/// Identifies a subscription by what was declared rather than by its ARN
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionLookup {
    pub topic_arn: String,
    pub protocol: Protocol,
    pub endpoint: String,
}

impl SubscriptionLookup {
    /// Find a confirmed subscription matching the lookup
    pub async fn find_confirmed(&self, api: &dyn SnsApi) -> ApiResult<Option<String>> {
        let endpoint = obfuscate_endpoint(&self.endpoint);
        let found = api
            .list_subscriptions_by_topic(&self.topic_arn)
            .await?
            .into_iter()
            .filter(|s| s.endpoint.as_deref() == Some(endpoint.as_str()))
            .filter(|s| s.protocol.as_deref() == Some(self.protocol.as_str()))
            .filter(|s| s.topic_arn.as_deref() == Some(self.topic_arn.as_str()))
            .find(|s| !has_pending_confirmation(s.subscription_arn.as_deref()))
            .and_then(|s| s.subscription_arn);
        Ok(found)
    }
}

/// Lists the topic's subscriptions until the declared one is confirmed
pub struct ConfirmationProber<'a> {
    api: &'a dyn SnsApi,
    lookup: &'a SubscriptionLookup,
}

#[async_trait]
impl StatusProber for ConfirmationProber<'_> {
    type Status = ConfirmationStatus;
    type Snapshot = Option<String>;

    async fn probe(&self) -> Result<Probe<Self::Snapshot, Self::Status>, WaitError> {
        let probe = match self.lookup.find_confirmed(self.api).await? {
            Some(arn) => Probe::observed(ConfirmationStatus::Confirmed, Some(arn)),
            None => Probe::observed(ConfirmationStatus::PendingConfirmation, None),
        };
        Ok(probe)
    }
}

pub fn confirmed_spec() -> WaitSpec<ConfirmationStatus> {
    WaitSpec::until([ConfirmationStatus::Confirmed])
        .pending([ConfirmationStatus::PendingConfirmation])
}

/// Wait for the endpoint to confirm the subscription
///
/// On timeout one final lookup is made. Returns `None` if the subscription
/// is still unconfirmed after it.
pub async fn wait_confirmed(
    api: &dyn SnsApi,
    lookup: &SubscriptionLookup,
    timeout: Duration,
    waits: &WaitSettings,
) -> Result<Option<String>, WaitError> {
    let waiter = waits
        .with_timeout(timeout)
        .waiter(&lookup.topic_arn, confirmed_spec());
    match waiter.wait(&ConfirmationProber { api, lookup }).await {
        Ok(arn) => Ok(arn.flatten()),
        Err(WaitError::Timeout { attempts, .. }) => {
            debug!(
                "{}: no confirmation after {} attempts, looking up once more",
                lookup.topic_arn, attempts
            );
            Ok(lookup.find_confirmed(api).await?)
        }
        Err(e) => Err(e),
    }
}
