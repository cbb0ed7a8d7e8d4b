//! Contributor insights status prober and waits

use async_trait::async_trait;
use nimbus_core::waiter::{Probe, StatusProber, WaitError, WaitSpec};

use super::{
    ContributorInsightsDescription, ContributorInsightsKey, ContributorInsightsStatus, DynamoDbApi,
};
use crate::config::WaitSettings;

/// Reads the contributor insights status of one table or index
///
/// A missing table is not treated as absence: it fails the wait.
pub struct ContributorInsightsProber<'a> {
    api: &'a dyn DynamoDbApi,
    key: &'a ContributorInsightsKey,
}

impl<'a> ContributorInsightsProber<'a> {
    pub fn new(api: &'a dyn DynamoDbApi, key: &'a ContributorInsightsKey) -> Self {
        Self { api, key }
    }
}

#[async_trait]
impl StatusProber for ContributorInsightsProber<'_> {
    type Status = ContributorInsightsStatus;
    type Snapshot = ContributorInsightsDescription;

    async fn probe(&self) -> Result<Probe<Self::Snapshot, Self::Status>, WaitError> {
        let description = self.api.describe_contributor_insights(self.key).await?;
        let status = description
            .status
            .clone()
            .unwrap_or_else(|| ContributorInsightsStatus::Unknown(String::new()));
        if status == ContributorInsightsStatus::Failed {
            return Err(WaitError::embedded_failure(
                &status,
                description.failure.as_deref(),
            ));
        }
        Ok(Probe::observed(status, description))
    }
}

pub fn enabled_spec() -> WaitSpec<ContributorInsightsStatus> {
    use ContributorInsightsStatus::*;
    WaitSpec::until([Enabled]).pending([Enabling, Disabled, Disabling])
}

pub fn disabled_spec() -> WaitSpec<ContributorInsightsStatus> {
    use ContributorInsightsStatus::*;
    WaitSpec::until([Disabled]).pending([Enabling, Disabling, Enabled])
}

pub async fn wait_enabled(
    api: &dyn DynamoDbApi,
    key: &ContributorInsightsKey,
    waits: &WaitSettings,
) -> Result<Option<ContributorInsightsDescription>, WaitError> {
    waits
        .waiter(key.identifier(), enabled_spec())
        .wait(&ContributorInsightsProber::new(api, key))
        .await
}

pub async fn wait_disabled(
    api: &dyn DynamoDbApi,
    key: &ContributorInsightsKey,
    waits: &WaitSettings,
) -> Result<Option<ContributorInsightsDescription>, WaitError> {
    waits
        .waiter(key.identifier(), disabled_spec())
        .wait(&ContributorInsightsProber::new(api, key))
        .await
}
