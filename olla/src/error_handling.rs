//! # Error Handling and Validation
//!
//! Standardized error construction, context-aware logging, validation
//! helpers, and retry-with-backoff utilities used by `config` and
//! `handlers`. Grounded on the teacher's `error_handling.rs::ErrorHandler`,
//! trimmed of the auth/rate-limit/content-filter/plugin/cache variants
//! that module carried for its multi-provider chat gateway.

use crate::gateway_error::GatewayError;
use anyhow::Result;
use std::fmt;
use tracing::{error, warn};

/// Standardized error handling patterns used across the binary crate.
pub struct ErrorHandler;

impl ErrorHandler {
    /// Convert an anyhow error to a `GatewayError::Internal` with context.
    pub fn anyhow_to_gateway<T>(result: Result<T>, context: &str) -> Result<T, GatewayError> {
        result.map_err(|e| {
            let context_msg = format!("{context}: {e}");
            error!("{}", context_msg);
            GatewayError::Internal {
                message: context_msg,
            }
        })
    }

    pub fn config_error(message: &str) -> GatewayError {
        warn!("Configuration error: {}", message);
        GatewayError::Config {
            message: message.to_string(),
        }
    }

    pub fn internal_error(message: &str) -> GatewayError {
        error!("Internal error: {}", message);
        GatewayError::Internal {
            message: message.to_string(),
        }
    }

    pub fn invalid_request(message: &str) -> GatewayError {
        warn!("Invalid request: {}", message);
        GatewayError::InvalidRequest {
            message: message.to_string(),
        }
    }

    /// Log an error at the level appropriate to `error_type` and convert it.
    pub fn log_and_convert<E: fmt::Display + fmt::Debug>(
        error: E,
        context: &str,
        error_type: ErrorType,
    ) -> GatewayError {
        let message = format!("{context}: {error}");

        match error_type {
            ErrorType::Config => {
                warn!("Configuration error: {}", message);
                GatewayError::Config { message }
            }
            ErrorType::Internal => {
                error!("Internal error: {}", message);
                GatewayError::Internal { message }
            }
            ErrorType::InvalidRequest => {
                warn!("Invalid request: {}", message);
                GatewayError::InvalidRequest { message }
            }
        }
    }

    pub async fn handle_async_operation<F, Fut, T>(
        operation: F,
        context: &str,
        error_type: ErrorType,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        operation()
            .await
            .map_err(|e| Self::log_and_convert(e, context, error_type))
    }

    pub fn handle_sync_operation<F, T>(
        operation: F,
        context: &str,
        error_type: ErrorType,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Result<T, anyhow::Error>,
    {
        operation().map_err(|e| Self::log_and_convert(e, context, error_type))
    }

    pub fn validate_config<T, F>(value: T, validator: F, context: &str) -> Result<T, GatewayError>
    where
        F: FnOnce(&T) -> Result<(), String>,
    {
        match validator(&value) {
            Ok(()) => Ok(value),
            Err(message) => {
                let full_message = format!("{context}: {message}");
                warn!("Configuration validation failed: {}", full_message);
                Err(GatewayError::Config {
                    message: full_message,
                })
            }
        }
    }

    pub fn require_some<T>(value: Option<T>, context: &str) -> Result<T, GatewayError> {
        value.ok_or_else(|| {
            let message = format!("{context}: value is required but was None");
            warn!("Required value missing: {}", message);
            GatewayError::Config { message }
        })
    }

    pub fn validate_string(
        value: &str,
        context: &str,
        min_length: usize,
    ) -> Result<(), GatewayError> {
        if value.len() < min_length {
            let message = format!("{context}: string too short (minimum {min_length} characters)");
            warn!("String validation failed: {}", message);
            return Err(GatewayError::Config { message });
        }
        Ok(())
    }

    pub fn validate_range<T: PartialOrd + fmt::Display>(
        value: T,
        min: T,
        max: T,
        context: &str,
    ) -> Result<(), GatewayError> {
        if value < min || value > max {
            let message = format!("{context}: value {value} is outside valid range [{min}, {max}]");
            warn!("Range validation failed: {}", message);
            return Err(GatewayError::Config { message });
        }
        Ok(())
    }

    /// Retry `operation` up to `max_retries` additional times with
    /// exponential backoff capped at 30s, logging each failed attempt.
    pub async fn retry_with_backoff<F, Fut, T>(
        mut operation: F,
        max_retries: u32,
        initial_delay: std::time::Duration,
        context: ErrorContext,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        let mut delay = initial_delay;
        let mut last_error_message = None;

        for attempt in 0..=max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error_message = Some(e.to_string());
                    if attempt < max_retries {
                        warn!(
                            "Attempt {} failed in {}: {}. Retrying in {:?}",
                            attempt + 1,
                            context.operation,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        delay = std::cmp::min(delay.mul_f64(2.0), std::time::Duration::from_secs(30));
                    } else {
                        error!(
                            "All {} attempts failed in {}: {}",
                            max_retries + 1,
                            context.operation,
                            e,
                        );
                    }
                }
            }
        }

        Err(GatewayError::Internal {
            message: last_error_message.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// Error types for consistent categorization in `log_and_convert`.
#[derive(Debug, Clone, Copy)]
pub enum ErrorType {
    Config,
    Internal,
    InvalidRequest,
}

/// Extension trait for `Result` to add error-handling utilities.
pub trait ResultExt<T, E> {
    fn with_gateway_context(self, context: &str) -> Result<T, GatewayError>
    where
        E: Into<anyhow::Error>,
        T: fmt::Debug;

    fn log_and_convert(self, context: &str, error_type: ErrorType) -> Result<T, GatewayError>
    where
        E: fmt::Display + fmt::Debug;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn with_gateway_context(self, context: &str) -> Result<T, GatewayError>
    where
        E: Into<anyhow::Error>,
    {
        self.map_err(|e| {
            let anyhow_error: anyhow::Error = e.into();
            let context_msg = format!("{context}: {anyhow_error}");
            error!("{}", context_msg);
            GatewayError::Internal {
                message: context_msg,
            }
        })
    }

    fn log_and_convert(self, context: &str, error_type: ErrorType) -> Result<T, GatewayError>
    where
        E: fmt::Display + fmt::Debug,
    {
        self.map_err(|e| ErrorHandler::log_and_convert(e, context, error_type))
    }
}

/// Extension trait for `Option` to add error-handling utilities.
pub trait OptionExt<T> {
    fn ok_or_gateway_error(self, context: &str) -> Result<T, GatewayError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_gateway_error(self, context: &str) -> Result<T, GatewayError> {
        self.ok_or_else(|| ErrorHandler::config_error(&format!("{context}: value is required")))
    }
}

/// Rich error context carried through `ErrorHandler::handle_with_context`
/// and friends: which module/operation failed, at what severity.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub module: String,
    pub operation: String,
    pub details: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: Option<String>,
    pub severity: ErrorSeverity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorContext {
    pub fn new(module: &str, operation: &str, details: &str) -> Self {
        Self {
            module: module.to_string(),
            operation: operation.to_string(),
            details: details.to_string(),
            timestamp: chrono::Utc::now(),
            request_id: None,
            severity: ErrorSeverity::Medium,
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn format(&self) -> String {
        let mut parts = vec![
            format!("[{}] {}", self.module, self.operation),
            format!("Details: {}", self.details),
            format!("Timestamp: {}", self.timestamp),
        ];
        if let Some(request_id) = &self.request_id {
            parts.push(format!("Request ID: {request_id}"));
        }
        parts.push(format!("Severity: {:?}", self.severity));
        parts.join(" | ")
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Critical)
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Low | ErrorSeverity::Medium)
    }
}

impl ErrorHandler {
    fn log_at_severity(message: &str, severity: &ErrorSeverity) {
        match severity {
            ErrorSeverity::Low => tracing::debug!("{}", message),
            ErrorSeverity::Medium => tracing::warn!("{}", message),
            ErrorSeverity::High => tracing::error!("{}", message),
            ErrorSeverity::Critical => tracing::error!("CRITICAL ERROR: {}", message),
        }
    }

    pub fn handle_with_context<T, F>(operation: F, context: ErrorContext) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Result<T, anyhow::Error>,
    {
        operation().map_err(|e| {
            let error_msg = format!("{}: {}", context.format(), e);
            Self::log_at_severity(&error_msg, &context.severity);
            match context.module.as_str() {
                "config" => GatewayError::Config { message: error_msg },
                _ => GatewayError::Internal { message: error_msg },
            }
        })
    }

    pub async fn handle_async_with_context<F, Fut, T>(
        operation: F,
        context: ErrorContext,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        match operation().await {
            Ok(result) => Ok(result),
            Err(e) => {
                let error_msg = format!("{}: {}", context.format(), e);
                Self::log_at_severity(&error_msg, &context.severity);
                Err(match context.module.as_str() {
                    "config" => GatewayError::Config { message: error_msg },
                    _ => GatewayError::Internal { message: error_msg },
                })
            }
        }
    }

    pub fn validate_with_context<T, F>(
        value: T,
        validator: F,
        context: ErrorContext,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce(&T) -> Result<(), String>,
    {
        match validator(&value) {
            Ok(()) => Ok(value),
            Err(error_msg) => {
                let full_error = format!("{}: {}", context.format(), error_msg);
                Self::log_at_severity(&full_error, &context.severity);
                Err(GatewayError::InvalidRequest {
                    message: full_error,
                })
            }
        }
    }
}

/// Creates an `ErrorContext` inline.
#[macro_export]
macro_rules! error_context {
    ($module:expr, $operation:expr, $details:expr) => {
        ErrorContext::new($module, $operation, $details)
    };
}

/// Converts a `Result` into a `GatewayError` via `ErrorHandler::log_and_convert`.
#[macro_export]
macro_rules! handle_error {
    ($result:expr, $context:expr, $error_type:expr) => {
        match $result {
            Ok(value) => Ok(value),
            Err(e) => Err(ErrorHandler::log_and_convert(e, $context, $error_type)),
        }
    };
}

/// Validates a configuration value via `ErrorHandler::validate_config`.
#[macro_export]
macro_rules! validate_config {
    ($value:expr, $validator:expr, $context:expr) => {
        ErrorHandler::validate_config($value, $validator, $context)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_handler_config_error() {
        let error = ErrorHandler::config_error("test error");
        assert!(matches!(error, GatewayError::Config { .. }));
    }

    #[test]
    fn test_validate_string() {
        assert!(ErrorHandler::validate_string("test", "test", 3).is_ok());
        assert!(ErrorHandler::validate_string("ab", "test", 3).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(ErrorHandler::validate_range(5, 1, 10, "test").is_ok());
        assert!(ErrorHandler::validate_range(0, 1, 10, "test").is_err());
        assert!(ErrorHandler::validate_range(11, 1, 10, "test").is_err());
    }

    #[test]
    fn test_require_some() {
        assert!(ErrorHandler::require_some(Some(42), "test").is_ok());
        assert!(ErrorHandler::require_some(None::<i32>, "test").is_err());
    }

    #[test]
    fn test_result_ext() {
        let result: Result<i32, anyhow::Error> = Ok(42);
        assert!(result.with_gateway_context("test").is_ok());

        let result: Result<i32, anyhow::Error> = Err(anyhow::anyhow!("test error"));
        assert!(result.log_and_convert("test", ErrorType::Config).is_err());
    }

    #[test]
    fn test_option_ext() {
        let option: Option<i32> = Some(42);
        assert!(option.ok_or_gateway_error("test").is_ok());

        let option: Option<i32> = None;
        assert!(option.ok_or_gateway_error("test").is_err());
    }
}
