//! Account, partition and region used to compute ARNs

use log::{debug, warn};

use crate::config::ProviderConfig;
use crate::utils::{arn_partition, build_arn, partition_for_region};

/// Where the provider's resources live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub partition: String,
    pub region: String,
    /// Unknown when neither configured nor resolvable through STS
    pub account_id: Option<String>,
}

impl AccountInfo {
    pub fn new(
        partition: impl Into<String>,
        region: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            partition: partition.into(),
            region: region.into(),
            account_id,
        }
    }

    /// ARN of a regional resource, if the account is known
    pub fn arn(&self, service: &str, resource: &str) -> Option<String> {
        self.account_id.as_deref().map(|account_id| {
            build_arn(&self.partition, service, &self.region, account_id, resource)
        })
    }

    /// Fill in whatever the configuration leaves open through STS
    ///
    /// STS failures are not fatal: ARNs that need the account are then
    /// left out of the reported state.
    pub async fn resolve(
        config: &ProviderConfig,
        region: &str,
        sts: &aws_sdk_sts::Client,
    ) -> Self {
        let mut info = Self::new(
            config
                .partition
                .clone()
                .unwrap_or_else(|| partition_for_region(region).to_string()),
            region,
            config.account_id.clone(),
        );
        if info.account_id.is_some() && config.partition.is_some() {
            return info;
        }

        match sts.get_caller_identity().send().await {
            Ok(identity) => {
                if info.account_id.is_none() {
                    info.account_id = identity.account().map(str::to_string);
                }
                if config.partition.is_none()
                    && let Some(partition) = identity.arn().and_then(arn_partition)
                {
                    info.partition = partition.to_string();
                }
                debug!(
                    "resolved account {:?} in partition {}",
                    info.account_id, info.partition
                );
            }
            Err(e) => warn!(
                "unable to resolve the caller identity, ARNs will be omitted: {}",
                aws_sdk_sts::error::DisplayErrorContext(&e)
            ),
        }
        info
    }
}
