//! Error handling for Taskhive Core.
//!
//! This module provides:
//! - A single error type carrying a stable, machine-readable [`ErrorCode`]
//! - HTTP status code mapping for control API responses
//! - User-friendly messages vs detailed internal messages
//! - Severity-aware logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskhive_core::error::{HiveError, Result};
//!
//! fn remove(&self, id: TaskId) -> Result<Task> {
//!     self.tasks.remove(&id).ok_or_else(|| HiveError::task_not_found(id))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Taskhive operations.
pub type Result<T> = std::result::Result<T, HiveError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for control API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Task Errors (1000-1099)
    TaskNotFound,
    DuplicateTask,
    InvalidStateTransition,

    // Worker Errors (1100-1199)
    WorkerNotFound,
    WorkerPoolExhausted,
    StaleClaim,

    // Listener Errors (1200-1299)
    ListenerNotFound,
    LockedListener,
    UnknownEvent,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,

    // Validation Errors (4100-4199)
    InvalidInput,
    MissingRequiredField,
    UnknownAction,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::TaskNotFound => 1000,
            Self::DuplicateTask => 1001,
            Self::InvalidStateTransition => 1002,

            Self::WorkerNotFound => 1100,
            Self::WorkerPoolExhausted => 1101,
            Self::StaleClaim => 1102,

            Self::ListenerNotFound => 1200,
            Self::LockedListener => 1201,
            Self::UnknownEvent => 1202,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,

            Self::InvalidInput => 4101,
            Self::MissingRequiredField => 4102,
            Self::UnknownAction => 4103,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            // Not Found (404)
            Self::TaskNotFound
            | Self::WorkerNotFound
            | Self::ListenerNotFound
            | Self::UnknownAction => StatusCode::NOT_FOUND,

            // Conflict (409)
            Self::DuplicateTask
            | Self::InvalidStateTransition
            | Self::StaleClaim => StatusCode::CONFLICT,

            // Forbidden (403)
            Self::LockedListener => StatusCode::FORBIDDEN,

            // Too Many Requests (429)
            Self::WorkerPoolExhausted => StatusCode::TOO_MANY_REQUESTS,

            // Unprocessable Entity (422)
            Self::InvalidInput
            | Self::MissingRequiredField
            | Self::UnknownEvent => StatusCode::UNPROCESSABLE_ENTITY,

            // Internal Server Error (500)
            Self::SerializationError
            | Self::DeserializationError
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "task",
            1100..=1199 => "worker",
            1200..=1299 => "listener",
            2200..=2299 => "serialization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller mistakes (unknown ids, bad input)
    Low,
    /// Operational issues (pool limits, stale completions)
    Medium,
    /// System errors (serialization, configuration)
    High,
    /// Errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::TaskNotFound
            | ErrorCode::WorkerNotFound
            | ErrorCode::ListenerNotFound
            | ErrorCode::DuplicateTask
            | ErrorCode::InvalidStateTransition
            | ErrorCode::LockedListener
            | ErrorCode::UnknownEvent
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::UnknownAction => Self::Low,

            ErrorCode::WorkerPoolExhausted | ErrorCode::StaleClaim => Self::Medium,

            ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (task, worker, listener)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Taskhive Core.
///
/// Every fallible queue, pool, registry and control operation returns this
/// type; the [`ErrorCode`] decides the HTTP status, severity and category.
#[derive(Error, Debug)]
pub struct HiveError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for HiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl HiveError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Whether the error reports a missing task, worker or listener.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::TaskNotFound | ErrorCode::WorkerNotFound | ErrorCode::ListenerNotFound
        )
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::info!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request rejected"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "taskhive_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Domain Constructors
// ═══════════════════════════════════════════════════════════════════════════════

impl HiveError {
    pub fn task_not_found(task_id: impl fmt::Display) -> Self {
        let id = task_id.to_string();
        Self::new(ErrorCode::TaskNotFound, format!("Task not found: {}", id))
            .with_details(ErrorDetails::new().with_entity("task", id))
    }

    pub fn duplicate_task(task_id: impl fmt::Display) -> Self {
        let id = task_id.to_string();
        Self::new(ErrorCode::DuplicateTask, format!("Task already enqueued: {}", id))
            .with_details(ErrorDetails::new().with_entity("task", id))
    }

    pub fn invalid_state_transition(
        entity_type: &'static str,
        entity_id: impl fmt::Display,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        let id = entity_id.to_string();
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot move {} {} from {} to {}", entity_type, id, from, to),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity(entity_type, id)
                .with_context("from", from.to_string())
                .with_context("to", to.to_string()),
        )
    }

    pub fn worker_not_found(worker_id: impl fmt::Display) -> Self {
        let id = worker_id.to_string();
        Self::new(ErrorCode::WorkerNotFound, format!("Worker not found: {}", id))
            .with_details(ErrorDetails::new().with_entity("worker", id))
    }

    pub fn worker_pool_exhausted(current: usize, max: usize) -> Self {
        Self::new(
            ErrorCode::WorkerPoolExhausted,
            format!("Worker pool is full: {} of {} workers", current, max),
        )
        .with_context("current", current)
        .with_context("max", max)
    }

    pub fn stale_claim(worker_id: impl fmt::Display) -> Self {
        let id = worker_id.to_string();
        Self::new(
            ErrorCode::StaleClaim,
            format!("Worker {} no longer holds this task", id),
        )
        .with_details(ErrorDetails::new().with_entity("worker", id))
    }

    pub fn listener_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorCode::ListenerNotFound, format!("Listener not found: {}", name))
            .with_details(ErrorDetails::new().with_entity("listener", name))
    }

    pub fn locked_listener(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::LockedListener,
            format!("Listener {} is locked and cannot be removed", name),
        )
        .with_details(ErrorDetails::new().with_entity("listener", name))
    }

    pub fn unknown_event(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(ErrorCode::UnknownEvent, format!("Unknown event: {}", name))
            .with_context("event", name)
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("Missing required field: {}", field),
        )
        .with_context("field", field)
    }

    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message.into()).with_context("field", field)
    }

    pub fn unknown_action(action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(ErrorCode::UnknownAction, format!("Unknown action: {}", action))
            .with_context("action", action)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&HiveError> for ErrorResponse {
    fn from(error: &HiveError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for HiveError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| HiveError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| HiveError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| HiveError::internal(message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| HiveError::new(code, "Resource not found"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for HiveError {
    fn from(err: serde_json::Error) -> Self {
        let code = if err.is_data() || err.is_syntax() || err.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };
        HiveError::with_internal(code, "Failed to process JSON", err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for HiveError {
    fn from(err: std::io::Error) -> Self {
        HiveError::with_internal(ErrorCode::InternalError, "I/O error", err.to_string())
            .with_source(err)
    }
}

impl From<anyhow::Error> for HiveError {
    fn from(err: anyhow::Error) -> Self {
        HiveError::internal(format!("{:#}", err))
    }
}

impl From<config::ConfigError> for HiveError {
    fn from(err: config::ConfigError) -> Self {
        HiveError::with_internal(
            ErrorCode::ConfigurationError,
            "Failed to load configuration",
            err.to_string(),
        )
        .with_source(err)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::TaskNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DuplicateTask.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::LockedListener.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::InvalidInput.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::TaskNotFound.category(), "task");
        assert_eq!(ErrorCode::StaleClaim.category(), "worker");
        assert_eq!(ErrorCode::LockedListener.category(), "listener");
        assert_eq!(ErrorCode::UnknownAction.category(), "validation");
    }

    #[test]
    fn test_not_found_constructors() {
        let error = HiveError::task_not_found("abc");
        assert_eq!(error.code(), ErrorCode::TaskNotFound);
        assert!(error.is_not_found());
        assert_eq!(error.details().entity_type.as_deref(), Some("task"));
        assert_eq!(error.details().entity_id.as_deref(), Some("abc"));

        assert!(HiveError::worker_not_found("w").is_not_found());
        assert!(HiveError::listener_not_found("l").is_not_found());
        assert!(!HiveError::locked_listener("l").is_not_found());
    }

    #[test]
    fn test_invalid_transition_context() {
        let error = HiveError::invalid_state_transition("task", "t-1", "success", "kill");
        assert_eq!(error.code(), ErrorCode::InvalidStateTransition);
        assert_eq!(error.details().context["from"], "success");
        assert_eq!(error.details().context["to"], "kill");
    }

    #[test]
    fn test_error_response_serialization() {
        let error = HiveError::locked_listener("workers.logging");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("LOCKED_LISTENER"));
        assert!(json.contains("1201"));
        assert!(json.contains("workers.logging"));
        assert!(!response.success);
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::TaskNotFound),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::WorkerPoolExhausted),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::InvalidConfiguration),
            ErrorSeverity::High
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::InternalError),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_error_display() {
        let error = HiveError::with_internal(
            ErrorCode::InternalError,
            "Dispatcher stopped",
            "channel closed",
        );

        let display = format!("{}", error);
        assert!(display.contains("InternalError"));
        assert!(display.contains("Dispatcher stopped"));
        assert!(display.contains("channel closed"));
    }

    #[test]
    fn test_option_context() {
        let missing: Option<u32> = None;
        let error = missing.with_error_code(ErrorCode::WorkerNotFound).unwrap_err();
        assert_eq!(error.code(), ErrorCode::WorkerNotFound);
    }
}
