//! DynamoDB contributor insights

pub mod contributor_insights;
pub mod sdk;
pub mod waiter;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use nimbus_core::provider::{ApiResult, ProviderError};

pub use sdk::SdkDynamoDb;

/// Table, or global secondary index of a table, whose insights are managed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorInsightsKey {
    pub table_name: String,
    pub index_name: Option<String>,
}

const INDEX_SEPARATOR: &str = "/index/";

impl ContributorInsightsKey {
    pub fn new(table_name: impl Into<String>, index_name: Option<String>) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: index_name.filter(|i| !i.is_empty()),
        }
    }

    /// `table` or `table/index/index_name`
    pub fn identifier(&self) -> String {
        match &self.index_name {
            Some(index) => format!("{}{}{}", self.table_name, INDEX_SEPARATOR, index),
            None => self.table_name.clone(),
        }
    }

    pub fn parse(identifier: &str) -> Result<Self, ProviderError> {
        let (table, index) = match identifier.split_once(INDEX_SEPARATOR) {
            Some((table, index)) => (table, Some(index)),
            None => (identifier, None),
        };
        if table.is_empty() || index.is_some_and(str::is_empty) {
            return Err(ProviderError::validation(format!(
                "invalid contributor insights identifier {:?}, expected TABLE or TABLE/index/INDEX",
                identifier
            )));
        }
        Ok(Self::new(table, index.map(str::to_string)))
    }
}

impl fmt::Display for ContributorInsightsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributorInsightsAction {
    Enable,
    Disable,
}

impl ContributorInsightsAction {
    pub const VALUES: [&'static str; 2] = ["ENABLE", "DISABLE"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enable => "ENABLE",
            Self::Disable => "DISABLE",
        }
    }
}

impl FromStr for ContributorInsightsAction {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENABLE" => Ok(Self::Enable),
            "DISABLE" => Ok(Self::Disable),
            other => Err(ProviderError::validation(format!(
                "invalid contributor_insights_action {:?}, expected one of: {}",
                other,
                Self::VALUES.join(", ")
            ))),
        }
    }
}

/// Contributor insights status as reported by DescribeContributorInsights
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContributorInsightsStatus {
    Enabling,
    Enabled,
    Disabling,
    Disabled,
    Failed,
    Unknown(String),
}

impl ContributorInsightsStatus {
    pub fn from_api(s: &str) -> Self {
        match s {
            "ENABLING" => Self::Enabling,
            "ENABLED" => Self::Enabled,
            "DISABLING" => Self::Disabling,
            "DISABLED" => Self::Disabled,
            "FAILED" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Enabling => "ENABLING",
            Self::Enabled => "ENABLED",
            Self::Disabling => "DISABLING",
            Self::Disabled => "DISABLED",
            Self::Failed => "FAILED",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for ContributorInsightsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of DescribeContributorInsights
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorInsightsDescription {
    pub table_name: String,
    pub index_name: Option<String>,
    pub rule_list: Vec<String>,
    pub status: Option<ContributorInsightsStatus>,
    /// `name: description` of the failure exception, if any
    pub failure: Option<String>,
}

/// The DynamoDB calls used by the contributor insights handler
#[async_trait]
pub trait DynamoDbApi: Send + Sync {
    async fn update_contributor_insights(
        &self,
        key: &ContributorInsightsKey,
        action: ContributorInsightsAction,
    ) -> ApiResult<()>;

    async fn describe_contributor_insights(
        &self,
        key: &ContributorInsightsKey,
    ) -> ApiResult<ContributorInsightsDescription>;
}
