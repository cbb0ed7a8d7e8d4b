//! Classification of AWS SDK errors into [`ApiError`]

use std::error::Error;
use std::fmt::Debug;

// These types are shared by every aws-sdk-* crate through aws-smithy.
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use nimbus_core::provider::ApiError;

/// Decides whether a service error means "the resource does not exist"
///
/// Receives the error code and message of the service error.
pub type NotFoundPredicate = fn(&str, &str) -> bool;

/// DynamoDB and CloudWatch Synthetics
pub fn resource_not_found(code: &str, _message: &str) -> bool {
    code == "ResourceNotFoundException"
}

/// SNS reports missing subscriptions as `NotFound`
pub fn sns_not_found(code: &str, _message: &str) -> bool {
    code == "NotFound" || code == "NotFoundException"
}

/// SageMaker answers a describe of a missing notebook with a validation error
pub fn sagemaker_not_found(code: &str, message: &str) -> bool {
    code == "ValidationException" && message.contains("RecordNotFound")
}

/// Map an SDK error onto the provider's error taxonomy
pub fn classify<E, R>(
    operation: &'static str,
    err: SdkError<E, R>,
    not_found: NotFoundPredicate,
) -> ApiError
where
    E: ProvideErrorMetadata + Error + Send + Sync + 'static,
    R: Debug,
{
    match err.as_service_error() {
        Some(service) => {
            let code = service.code().unwrap_or("Unknown");
            let message = service.message().unwrap_or_default();
            if not_found(code, message) {
                ApiError::not_found(operation, message_or_code(message, code))
            } else {
                ApiError::service(operation, code, message_or_code(message, code))
            }
        }
        None => ApiError::transport(operation, DisplayErrorContext(&err).to_string()),
    }
}

fn message_or_code(message: &str, code: &str) -> String {
    if message.is_empty() {
        code.to_string()
    } else {
        message.to_string()
    }
}

/// Error for an SDK output lacking a field the handler relies on
pub fn missing_field(operation: &'static str, field: &str) -> ApiError {
    ApiError::invalid_response(operation, format!("missing {}", field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicates() {
        assert!(resource_not_found("ResourceNotFoundException", ""));
        assert!(!resource_not_found("ValidationException", "RecordNotFound"));

        assert!(sns_not_found("NotFound", "Subscription does not exist"));
        assert!(!sns_not_found("InvalidParameter", ""));

        assert!(sagemaker_not_found(
            "ValidationException",
            "RecordNotFound: notebook instance lab does not exist"
        ));
        assert!(!sagemaker_not_found(
            "ValidationException",
            "Status (InService) not in ([Stopped, Failed])"
        ));
    }

    #[test]
    fn missing_field_is_invalid_response() {
        let err = missing_field("CreateCanary", "canary name");
        assert_eq!(
            err.to_string(),
            "CreateCanary returned an invalid response: missing canary name"
        );
    }
}
