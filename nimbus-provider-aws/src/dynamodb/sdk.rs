//! [`DynamoDbApi`] over the AWS SDK

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::ContributorInsightsAction as SdkAction;
use nimbus_core::provider::ApiResult;

use super::{
    ContributorInsightsAction, ContributorInsightsDescription, ContributorInsightsKey,
    ContributorInsightsStatus, DynamoDbApi,
};
use crate::error::{classify, missing_field, resource_not_found};

pub struct SdkDynamoDb {
    client: Client,
}

impl SdkDynamoDb {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl From<ContributorInsightsAction> for SdkAction {
    fn from(action: ContributorInsightsAction) -> Self {
        match action {
            ContributorInsightsAction::Enable => SdkAction::Enable,
            ContributorInsightsAction::Disable => SdkAction::Disable,
        }
    }
}

#[async_trait]
impl DynamoDbApi for SdkDynamoDb {
    async fn update_contributor_insights(
        &self,
        key: &ContributorInsightsKey,
        action: ContributorInsightsAction,
    ) -> ApiResult<()> {
        const OP: &str = "UpdateContributorInsights";
        self.client
            .update_contributor_insights()
            .table_name(&key.table_name)
            .set_index_name(key.index_name.clone())
            .contributor_insights_action(action.into())
            .send()
            .await
            .map_err(|e| classify(OP, e, resource_not_found))?;
        Ok(())
    }

    async fn describe_contributor_insights(
        &self,
        key: &ContributorInsightsKey,
    ) -> ApiResult<ContributorInsightsDescription> {
        const OP: &str = "DescribeContributorInsights";
        let output = self
            .client
            .describe_contributor_insights()
            .table_name(&key.table_name)
            .set_index_name(key.index_name.clone())
            .send()
            .await
            .map_err(|e| classify(OP, e, resource_not_found))?;

        let table_name = output
            .table_name()
            .ok_or_else(|| missing_field(OP, "table name"))?
            .to_string();
        let failure = output.failure_exception().map(|f| {
            format!(
                "{}: {}",
                f.exception_name().unwrap_or("Unknown"),
                f.exception_description().unwrap_or_default()
            )
        });

        Ok(ContributorInsightsDescription {
            table_name,
            index_name: output.index_name().map(str::to_string),
            rule_list: output.contributor_insights_rule_list().to_vec(),
            status: output
                .contributor_insights_status()
                .map(|s| ContributorInsightsStatus::from_api(s.as_str())),
            failure,
        })
    }
}
