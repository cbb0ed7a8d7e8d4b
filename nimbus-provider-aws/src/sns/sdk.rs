//! [`SnsApi`] over the AWS SDK

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sns::Client;
use nimbus_core::provider::ApiResult;

use super::{SnsApi, SubscribeRequest, SubscriptionSummary};
use crate::error::{classify, sns_not_found};

pub struct SdkSns {
    client: Client,
}

impl SdkSns {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnsApi for SdkSns {
    async fn subscribe(&self, request: &SubscribeRequest) -> ApiResult<String> {
        let attributes = (!request.attributes.is_empty()).then(|| request.attributes.clone());
        let output = self
            .client
            .subscribe()
            .topic_arn(&request.topic_arn)
            .protocol(request.protocol.as_str())
            .endpoint(&request.endpoint)
            .set_attributes(attributes)
            .return_subscription_arn(false)
            .send()
            .await
            .map_err(|e| classify("Subscribe", e, sns_not_found))?;
        // A missing ARN is treated like a pending one by the caller
        Ok(output.subscription_arn().unwrap_or_default().to_string())
    }

    async fn get_subscription_attributes(
        &self,
        arn: &str,
    ) -> ApiResult<HashMap<String, String>> {
        let output = self
            .client
            .get_subscription_attributes()
            .subscription_arn(arn)
            .send()
            .await
            .map_err(|e| classify("GetSubscriptionAttributes", e, sns_not_found))?;
        Ok(output.attributes().cloned().unwrap_or_default())
    }

    async fn set_subscription_attribute(
        &self,
        arn: &str,
        name: &str,
        value: &str,
    ) -> ApiResult<()> {
        self.client
            .set_subscription_attributes()
            .subscription_arn(arn)
            .attribute_name(name)
            .attribute_value(value)
            .send()
            .await
            .map_err(|e| classify("SetSubscriptionAttributes", e, sns_not_found))?;
        Ok(())
    }

    async fn unsubscribe(&self, arn: &str) -> ApiResult<()> {
        self.client
            .unsubscribe()
            .subscription_arn(arn)
            .send()
            .await
            .map_err(|e| classify("Unsubscribe", e, sns_not_found))?;
        Ok(())
    }

    async fn list_subscriptions_by_topic(
        &self,
        topic_arn: &str,
    ) -> ApiResult<Vec<SubscriptionSummary>> {
        let mut subscriptions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_subscriptions_by_topic()
                .topic_arn(topic_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| classify("ListSubscriptionsByTopic", e, sns_not_found))?;

            subscriptions.extend(output.subscriptions().iter().map(|s| SubscriptionSummary {
                subscription_arn: s.subscription_arn().map(str::to_string),
                owner: s.owner().map(str::to_string),
                protocol: s.protocol().map(str::to_string),
                endpoint: s.endpoint().map(str::to_string),
                topic_arn: s.topic_arn().map(str::to_string),
            }));

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(subscriptions)
    }
}
