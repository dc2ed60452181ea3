//! AWS error classification
//!
//! Maps SQS and Auto Scaling SDK errors onto a small set of categories using
//! the `.code()` from `ProvideErrorMetadata`, for log context and for
//! deciding whether a discovery call is worth retrying.

use aws_sdk_sqs::error::ProvideErrorMetadata;
use std::error::Error as StdError;
use thiserror::Error;

/// AWS error categories
#[derive(Debug, Error)]
pub enum AwsError {
    /// Queue or resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Receipt handle expired or belongs to another receive
    #[error("Receipt handle is invalid: {0}")]
    ReceiptHandleInvalid(String),

    /// Lifecycle action already completed, timed out, or token is stale
    #[error("No active lifecycle action: {0}")]
    NoActiveLifecycleAction(String),

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled)
    }

    /// Short label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AwsError::NotFound(_) => "not_found",
            AwsError::ReceiptHandleInvalid(_) => "receipt_handle_invalid",
            AwsError::NoActiveLifecycleAction(_) => "no_active_lifecycle_action",
            AwsError::Throttled => "throttled",
            AwsError::Sdk { .. } => "sdk",
        }
    }
}

const NOT_FOUND_CODES: &[&str] = &[
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
    "ResourceNotFound",
];

const RECEIPT_HANDLE_CODES: &[&str] = &["ReceiptHandleIsInvalid", "InvalidReceiptHandle"];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestThrottled",
    "RequestLimitExceeded",
];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound(message),
        Some(c) if RECEIPT_HANDLE_CODES.contains(&c) => AwsError::ReceiptHandleInvalid(message),
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some("ValidationError") if message.contains("No active Lifecycle Action") => {
            AwsError::NoActiveLifecycleAction(message)
        }
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

fn metadata_of<E>(cause: &(dyn StdError + 'static)) -> Option<AwsError>
where
    E: ProvideErrorMetadata + StdError + 'static,
{
    cause
        .downcast_ref::<E>()
        .map(|e| classify_aws_error(e.code(), e.message()))
}

/// Classify an `anyhow::Error` by walking its chain for SDK operation errors.
///
/// Falls back to scanning the Debug representation for a known code.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_autoscaling::operation as asg;
    use aws_sdk_sqs::operation as sqs;

    type SqsError<E> = aws_sdk_sqs::error::SdkError<E>;
    type AsgError<E> = aws_sdk_autoscaling::error::SdkError<E>;

    for cause in error.chain() {
        let classified = metadata_of::<SqsError<sqs::receive_message::ReceiveMessageError>>(cause)
            .or_else(|| metadata_of::<SqsError<sqs::delete_message::DeleteMessageError>>(cause))
            .or_else(|| {
                metadata_of::<
                    SqsError<sqs::change_message_visibility::ChangeMessageVisibilityError>,
                >(cause)
            })
            .or_else(|| {
                metadata_of::<SqsError<sqs::get_queue_attributes::GetQueueAttributesError>>(cause)
            })
            .or_else(|| metadata_of::<SqsError<sqs::get_queue_url::GetQueueUrlError>>(cause))
            .or_else(|| {
                metadata_of::<
                    AsgError<asg::complete_lifecycle_action::CompleteLifecycleActionError>,
                >(cause)
            })
            .or_else(|| {
                metadata_of::<AsgError<asg::describe_lifecycle_hooks::DescribeLifecycleHooksError>>(
                    cause,
                )
            })
            .or_else(|| {
                metadata_of::<
                    AsgError<
                        asg::describe_auto_scaling_instances::DescribeAutoScalingInstancesError,
                    >,
                >(cause)
            });
        if let Some(classified) = classified {
            return classified;
        }
    }

    let debug_str = format!("{:?}", error);
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&error.to_string()));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    for code in NOT_FOUND_CODES
        .iter()
        .chain(RECEIPT_HANDLE_CODES)
        .chain(THROTTLING_CODES)
    {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}
