//! AWS SDK error categorization for tail diagnostics.
//!
//! The AWS SDK already retries transient failures with exponential backoff.
//! What reaches the tailing engine is the final error of one request; this
//! module sorts it into a category so the consumer can tell throttling or
//! network trouble apart from permission and validation problems.

use std::fmt;

/// Categorized error types for AWS SDK errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request was throttled due to rate limiting
    Throttled { service: String, error_code: String },
    /// Request timed out
    Timeout { operation: String },
    /// Network connectivity issues
    NetworkError { message: String },
    /// AWS service temporarily unavailable
    ServiceUnavailable { service: String, message: String },
    /// Non-retryable error (permissions, missing log group, validation)
    NonRetryable {
        code: String,
        message: String,
        is_permission_error: bool,
    },
}

impl ErrorCategory {
    /// Returns true if this error category is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Throttled { .. }
                | ErrorCategory::Timeout { .. }
                | ErrorCategory::NetworkError { .. }
                | ErrorCategory::ServiceUnavailable { .. }
        )
    }

    /// Short label for compact display
    pub fn short_label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttled { .. } => "throttled",
            ErrorCategory::Timeout { .. } => "timeout",
            ErrorCategory::NetworkError { .. } => "network",
            ErrorCategory::ServiceUnavailable { .. } => "unavailable",
            ErrorCategory::NonRetryable { .. } => "error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Throttled { service, .. } => write!(f, "{} rate limited", service),
            ErrorCategory::Timeout { operation } => write!(f, "{} timeout", operation),
            ErrorCategory::NetworkError { .. } => write!(f, "Network error"),
            ErrorCategory::ServiceUnavailable { service, .. } => {
                write!(f, "{} unavailable", service)
            }
            ErrorCategory::NonRetryable { code, .. } => write!(f, "{}", code),
        }
    }
}

/// Categorize an `anyhow::Error` wrapping an SDK error
///
/// SDK errors only name their error code in the `Debug` output, so the
/// detailed form is inspected whenever the display text is the generic
/// "service error".
pub fn categorize_error(error: &anyhow::Error, service: &str, operation: &str) -> ErrorCategory {
    let display = format!("{:#}", error);
    if display.contains("service error") {
        categorize_error_string(&format!("{:?}", error), service, operation)
    } else {
        categorize_error_string(&display, service, operation)
    }
}

/// Categorize an error based on its string representation
pub fn categorize_error_string(error_str: &str, service: &str, operation: &str) -> ErrorCategory {
    // DescribeLogStreams and FilterLogEvents share a low per-account TPS quota
    if error_str.contains("ThrottlingException")
        || error_str.contains("Throttling")
        || error_str.contains("TooManyRequestsException")
        || error_str.contains("LimitExceededException")
        || error_str.contains("Rate exceeded")
    {
        let error_code = extract_error_code(error_str).unwrap_or_else(|| "Throttling".to_string());
        return ErrorCategory::Throttled {
            service: service.to_string(),
            error_code,
        };
    }

    if error_str.contains("TimeoutError")
        || error_str.contains("timeout")
        || error_str.contains("timed out")
    {
        return ErrorCategory::Timeout {
            operation: operation.to_string(),
        };
    }

    if error_str.contains("DispatchFailure")
        || error_str.contains("connection")
        || error_str.contains("Connection")
        || error_str.contains("dns error")
        || error_str.contains("socket")
    {
        return ErrorCategory::NetworkError {
            message: truncate_message(error_str, 100),
        };
    }

    if error_str.contains("ServiceUnavailableException")
        || error_str.contains("ServiceUnavailable")
        || error_str.contains("InternalServerError")
        || error_str.contains("OperationAbortedException")
    {
        return ErrorCategory::ServiceUnavailable {
            service: service.to_string(),
            message: truncate_message(error_str, 100),
        };
    }

    let is_permission_error = error_str.contains("AccessDenied")
        || error_str.contains("UnrecognizedClientException")
        || error_str.contains("InvalidClientTokenId")
        || error_str.contains("ExpiredToken")
        || error_str.contains("SignatureDoesNotMatch");

    let code = extract_error_code(error_str).unwrap_or_else(|| {
        if is_permission_error {
            "AccessDenied".to_string()
        } else {
            "Error".to_string()
        }
    });

    ErrorCategory::NonRetryable {
        code,
        message: truncate_message(error_str, 200),
        is_permission_error,
    }
}

/// Extract AWS error code from error message if present
fn extract_error_code(error_str: &str) -> Option<String> {
    // "ResourceNotFoundException: The specified log group does not exist."
    // "service error: ThrottlingException: Rate exceeded"
    for segment in error_str.split(':') {
        let candidate = segment.trim();
        let candidate = candidate.rsplit("::").next().unwrap_or(candidate);
        if (candidate.ends_with("Exception") || candidate.ends_with("Error"))
            && !candidate.contains(' ')
            && candidate.len() < 50
        {
            return Some(candidate.to_string());
        }
    }

    // Debug output: code: Some("ValidationException")
    let start = error_str.find("code:")?;
    let after_code = &error_str[start + 5..];
    let quote_start = after_code.find('"')?;
    let after_quote = &after_code[quote_start + 1..];
    let quote_end = after_quote.find('"')?;
    let code = &after_quote[..quote_end];
    (!code.is_empty() && code.len() < 50).then(|| code.to_string())
}

/// Truncate a message to `max_chars` characters, adding an ellipsis if truncated
fn truncate_message(msg: &str, max_chars: usize) -> String {
    if msg.chars().count() <= max_chars {
        return msg.to_string();
    }
    let kept: String = msg.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
