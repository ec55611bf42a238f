// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the OPC UA helper layer.
//!
//! Every fallible operation in this crate returns [`OpcUaResult`]. Errors are
//! grouped by the layer that raised them so callers can tell precondition
//! violations (surfaced synchronously, never retried) apart from failures of
//! the underlying protocol runtime.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── InvalidArgument - Empty strings, zero bounds
//! ├── Session         - Session missing, creation failures, disposed controller
//! ├── Security        - Application instance certificate problems
//! ├── NodeManager     - Address space not built, unknown nodes
//! ├── Subscription    - Subscription lifecycle failures
//! ├── Runtime         - Failures reported by the protocol runtime
//! └── Configuration   - Invalid settings
//! ```
//!
//! # Examples
//!
//! ```
//! use trap_opcua_helper::error::{OpcUaError, ErrorSeverity};
//!
//! let error = OpcUaError::empty_argument("session_name");
//! assert_eq!(error.argument_name(), Some("session_name"));
//! assert!(!error.is_retryable());
//! assert_eq!(error.severity(), ErrorSeverity::Error);
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for the helper layer.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// A required argument was empty, blank or zero.
    #[error("{0}")]
    InvalidArgument(#[from] ArgumentError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Certificate and application identity errors.
    #[error("{0}")]
    Security(#[from] SecurityError),

    /// Address space errors.
    #[error("{0}")]
    NodeManager(#[from] NodeManagerError),

    /// Subscription errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Errors reported by the underlying protocol runtime.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(error: ArgumentError) -> Self {
        Self::InvalidArgument(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a security error.
    #[inline]
    pub fn security(error: SecurityError) -> Self {
        Self::Security(error)
    }

    /// Creates a node manager error.
    #[inline]
    pub fn node_manager(error: NodeManagerError) -> Self {
        Self::NodeManager(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a runtime error.
    #[inline]
    pub fn runtime(error: RuntimeError) -> Self {
        Self::Runtime(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates an empty argument error.
    pub fn empty_argument(name: impl Into<String>) -> Self {
        Self::InvalidArgument(ArgumentError::empty(name))
    }

    /// Creates a zero-valued argument error.
    pub fn zero_argument(name: impl Into<String>) -> Self {
        Self::InvalidArgument(ArgumentError::zero(name))
    }

    /// Creates a session-not-ready error.
    pub fn session_not_ready() -> Self {
        Self::Session(SessionError::NotReady)
    }

    /// Creates a node-manager-not-ready error.
    pub fn node_manager_not_ready() -> Self {
        Self::NodeManager(NodeManagerError::NotReady)
    }

    /// Creates a certificate invalid error.
    pub fn certificate_invalid(application: impl Into<String>) -> Self {
        Self::Security(SecurityError::certificate_invalid(application))
    }

    /// Creates an endpoint unreachable error.
    pub fn endpoint_unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Runtime(RuntimeError::endpoint_unreachable(url, reason))
    }

    /// Creates a service fault error.
    pub fn service_fault(service: impl Into<String>, status: u32) -> Self {
        Self::Runtime(RuntimeError::service_fault(service, status))
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Returns the offending argument name for `InvalidArgument` errors.
    pub fn argument_name(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument(e) => Some(e.name()),
            _ => None,
        }
    }

    /// Returns `true` if a session-scoped call was made without a session.
    pub fn is_session_not_ready(&self) -> bool {
        matches!(self, Self::Session(SessionError::NotReady))
    }

    /// Returns `true` if an address space call was made before it was built.
    pub fn is_node_manager_not_ready(&self) -> bool {
        matches!(self, Self::NodeManager(NodeManagerError::NotReady))
    }

    /// Returns `true` if the application instance certificate was rejected.
    pub fn is_certificate_invalid(&self) -> bool {
        matches!(self, Self::Security(SecurityError::CertificateInvalid { .. }))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    ///
    /// Precondition violations are never retryable. Runtime failures usually
    /// are, which is what the reconnect supervisor relies on.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Session(e) => e.is_retryable(),
            Self::Runtime(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::InvalidArgument(_)
            | Self::Security(_)
            | Self::NodeManager(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidArgument(_) => ErrorSeverity::Error,
            Self::Session(e) => e.severity(),
            Self::Security(_) => ErrorSeverity::Critical,
            Self::NodeManager(e) => e.severity(),
            Self::Subscription(_) => ErrorSeverity::Error,
            Self::Runtime(e) => e.severity(),
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "argument",
            Self::Session(_) => "session",
            Self::Security(_) => "security",
            Self::NodeManager(_) => "node_manager",
            Self::Subscription(_) => "subscription",
            Self::Runtime(_) => "runtime",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Security(e) => e.error_code(),
            Self::NodeManager(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Runtime(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidArgument(e) => e.recovery_hints(),
            Self::Session(e) => e.recovery_hints(),
            Self::Security(e) => e.recovery_hints(),
            Self::NodeManager(e) => e.recovery_hints(),
            Self::Subscription(e) => e.recovery_hints(),
            Self::Runtime(e) => e.recovery_hints(),
            Self::Configuration(e) => e.recovery_hints(),
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidArgument(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
            Self::Security(e) => e.user_message(),
            Self::NodeManager(e) => e.user_message(),
            Self::Subscription(e) => e.user_message(),
            Self::Runtime(e) => e.user_message(),
            Self::Configuration(e) => e.user_message(),
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let level = self.tracing_level();
        let code = self.error_code();

        match level {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

// =============================================================================
// ArgumentError
// =============================================================================

/// Argument validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// A required string was empty or whitespace only.
    #[error("Argument '{name}' must not be empty")]
    Empty {
        /// Argument name.
        name: String,
    },

    /// A required numeric bound was zero.
    #[error("Argument '{name}' must be greater than zero")]
    Zero {
        /// Argument name.
        name: String,
    },

    /// An argument was outside its accepted range.
    #[error("Argument '{name}' is out of range: {reason}")]
    OutOfRange {
        /// Argument name.
        name: String,
        /// Reason.
        reason: String,
    },
}

impl ArgumentError {
    /// Creates an empty argument error.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::Empty { name: name.into() }
    }

    /// Creates a zero argument error.
    pub fn zero(name: impl Into<String>) -> Self {
        Self::Zero { name: name.into() }
    }

    /// Creates an out-of-range error.
    pub fn out_of_range(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the argument name.
    pub fn name(&self) -> &str {
        match self {
            Self::Empty { name } | Self::Zero { name } | Self::OutOfRange { name, .. } => name,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Empty { .. } => ErrorCode::new(1, 1),
            Self::Zero { .. } => ErrorCode::new(1, 2),
            Self::OutOfRange { .. } => ErrorCode::new(1, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Empty { .. } => vec!["Provide a non-blank value for the argument"],
            Self::Zero { .. } => vec!["Provide a value greater than zero"],
            Self::OutOfRange { .. } => vec!["Check the accepted range for the argument"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Empty { name } => format!("'{}' 값이 비어 있습니다", name),
            Self::Zero { name } => format!("'{}' 값은 0보다 커야 합니다", name),
            Self::OutOfRange { name, reason } => {
                format!("'{}' 값이 허용 범위를 벗어났습니다: {}", name, reason)
            }
        }
    }
}

/// Fails with [`ArgumentError::Empty`] if `value` is empty or whitespace only.
pub fn ensure_not_blank(name: &str, value: &str) -> OpcUaResult<()> {
    if value.trim().is_empty() {
        return Err(OpcUaError::empty_argument(name));
    }
    Ok(())
}

/// Fails with [`ArgumentError::Zero`] if `duration` is zero.
pub fn ensure_non_zero_duration(name: &str, duration: Duration) -> OpcUaResult<()> {
    if duration.is_zero() {
        return Err(OpcUaError::zero_argument(name));
    }
    Ok(())
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No session exists yet.
    #[error("Session has not yet been created")]
    NotReady,

    /// The runtime failed to create a session.
    #[error("Session creation failed: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// The controller has already been disposed.
    #[error("Session controller has been disposed")]
    Disposed,
}

impl SessionError {
    /// Creates a creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. })
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotReady => ErrorSeverity::Warning,
            Self::CreationFailed { .. } => ErrorSeverity::Error,
            Self::Disposed => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotReady => ErrorCode::new(2, 1),
            Self::CreationFailed { .. } => ErrorCode::new(2, 2),
            Self::Disposed => ErrorCode::new(2, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::NotReady => vec!["Call initialize_connection() or create_session() first"],
            Self::CreationFailed { .. } => vec![
                "Check that the server is running",
                "Verify the session timeout is accepted by the server",
            ],
            Self::Disposed => vec!["Create a new controller"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotReady => "세션이 아직 생성되지 않았습니다".to_string(),
            Self::CreationFailed { message } => format!("세션 생성 실패: {}", message),
            Self::Disposed => "세션 컨트롤러가 이미 해제되었습니다".to_string(),
        }
    }
}

// =============================================================================
// SecurityError
// =============================================================================

/// Certificate and application identity errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// The application instance certificate failed validation.
    #[error("Application instance certificate invalid")]
    CertificateInvalid {
        /// Application name.
        application: String,
    },
}

impl SecurityError {
    /// Creates a certificate invalid error.
    pub fn certificate_invalid(application: impl Into<String>) -> Self {
        Self::CertificateInvalid {
            application: application.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CertificateInvalid { .. } => ErrorCode::new(3, 1),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::CertificateInvalid { .. } => vec![
                "Regenerate the application instance certificate",
                "Check the certificate store path in the application configuration",
            ],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::CertificateInvalid { application } => {
                format!("애플리케이션 인증서가 유효하지 않습니다: {}", application)
            }
        }
    }
}

// =============================================================================
// NodeManagerError
// =============================================================================

/// Address space errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeManagerError {
    /// The node manager has not been built by server startup.
    #[error("Node Manager has not yet been created")]
    NotReady,

    /// The node does not exist in the address space.
    #[error("Node not found: '{node_id}'")]
    NodeNotFound {
        /// The node identifier.
        node_id: String,
    },

    /// The server was already initialized.
    #[error("Node Manager has already been created")]
    AlreadyInitialized,
}

impl NodeManagerError {
    /// Creates a node not found error.
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotReady => ErrorSeverity::Warning,
            Self::NodeNotFound { .. } => ErrorSeverity::Warning,
            Self::AlreadyInitialized => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotReady => ErrorCode::new(4, 1),
            Self::NodeNotFound { .. } => ErrorCode::new(4, 2),
            Self::AlreadyInitialized => ErrorCode::new(4, 3),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::NotReady => vec!["Call initialize() before modifying the address space"],
            Self::NodeNotFound { .. } => vec![
                "Verify the node identifier and namespace index",
                "Format: ns=<index>;s=<path>",
            ],
            Self::AlreadyInitialized => vec!["Call shutdown() before initializing again"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotReady => "노드 매니저가 아직 생성되지 않았습니다".to_string(),
            Self::NodeNotFound { node_id } => format!("노드를 찾을 수 없습니다: {}", node_id),
            Self::AlreadyInitialized => "노드 매니저가 이미 생성되었습니다".to_string(),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The subscription is not registered with the current session.
    #[error("Subscription '{display_name}' is not registered with the session")]
    NotRegistered {
        /// Subscription display name.
        display_name: String,
    },

    /// The runtime rejected the subscription.
    #[error("Subscription creation failed: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },
}

impl SubscriptionError {
    /// Creates a not registered error.
    pub fn not_registered(display_name: impl Into<String>) -> Self {
        Self::NotRegistered {
            display_name: display_name.into(),
        }
    }

    /// Creates a creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CreationFailed { .. })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotRegistered { .. } => ErrorCode::new(5, 1),
            Self::CreationFailed { .. } => ErrorCode::new(5, 2),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::NotRegistered { .. } => {
                vec!["The subscription may belong to a session that was replaced"]
            }
            Self::CreationFailed { .. } => vec![
                "Reduce the number of monitored items",
                "Increase the publishing interval",
            ],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotRegistered { display_name } => {
                format!("구독이 세션에 등록되어 있지 않습니다: {}", display_name)
            }
            Self::CreationFailed { message } => format!("구독 생성 실패: {}", message),
        }
    }
}

// =============================================================================
// RuntimeError
// =============================================================================

/// Failures reported by the underlying protocol runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The endpoint could not be reached or resolved.
    #[error("Endpoint '{url}' unreachable: {reason}")]
    EndpointUnreachable {
        /// Endpoint URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A service call was rejected with a bad status code.
    #[error("Service '{service}' failed with status 0x{status:08X}")]
    ServiceFault {
        /// Service name.
        service: String,
        /// Raw status code.
        status: u32,
    },

    /// The application configuration could not be loaded.
    #[error("Failed to load application configuration '{path}': {reason}")]
    ConfigurationLoad {
        /// Configuration path.
        path: String,
        /// Reason.
        reason: String,
    },

    /// An operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// Operation name.
        operation: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// The secure channel was closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl RuntimeError {
    /// Creates an endpoint unreachable error.
    pub fn endpoint_unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EndpointUnreachable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a service fault error.
    pub fn service_fault(service: impl Into<String>, status: u32) -> Self {
        Self::ServiceFault {
            service: service.into(),
            status,
        }
    }

    /// Creates a configuration load error.
    pub fn configuration_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EndpointUnreachable { .. } | Self::Timeout { .. } | Self::ConnectionClosed => {
                true
            }
            Self::ServiceFault { status, .. } => {
                // BadTooManyOperations, BadServerHalted, BadCommunicationError
                matches!(*status, 0x8010_0000 | 0x800E_0000 | 0x8005_0000)
            }
            Self::ConfigurationLoad { .. } => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ConnectionClosed | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::ConfigurationLoad { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EndpointUnreachable { .. } => ErrorCode::new(6, 1),
            Self::ServiceFault { .. } => ErrorCode::new(6, 2),
            Self::ConfigurationLoad { .. } => ErrorCode::new(6, 3),
            Self::Timeout { .. } => ErrorCode::new(6, 4),
            Self::ConnectionClosed => ErrorCode::new(6, 5),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::EndpointUnreachable { .. } => vec![
                "Check if the OPC UA server is running",
                "Verify the endpoint URL is correct",
                "Check firewall rules allow the connection",
            ],
            Self::ServiceFault { .. } => vec!["Check the server logs for the rejected request"],
            Self::ConfigurationLoad { .. } => vec![
                "Verify the configuration path exists",
                "Check the configuration file format",
            ],
            Self::Timeout { .. } => vec!["Increase the timeout", "Check network latency"],
            Self::ConnectionClosed => vec!["The session will be restored by the reconnect loop"],
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::EndpointUnreachable { url, .. } => {
                format!("OPC UA 서버({})에 연결할 수 없습니다", url)
            }
            Self::ServiceFault { service, status } => {
                format!("서비스 호출 실패 ({}): 0x{:08X}", service, status)
            }
            Self::ConfigurationLoad { path, .. } => {
                format!("애플리케이션 설정을 불러올 수 없습니다: {}", path)
            }
            Self::Timeout { operation, duration } => {
                format!("{} 작업이 {:?} 후 시간 초과되었습니다", operation, duration)
            }
            Self::ConnectionClosed => "연결이 종료되었습니다".to_string(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A timeout or interval is invalid.
    #[error("Invalid duration for '{field}': {duration:?}")]
    InvalidTimeout {
        /// Field name.
        field: String,
        /// Offending duration.
        duration: Duration,
    },

    /// A node identifier could not be parsed.
    #[error("Invalid node ID '{node_id}': {reason}")]
    InvalidNodeId {
        /// The node identifier.
        node_id: String,
        /// Reason.
        reason: String,
    },

    /// A required field is missing.
    #[error("Missing required field: '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A log level string was not recognized.
    #[error("Invalid log level: '{level}'")]
    InvalidLogLevel {
        /// The level string.
        level: String,
    },
}

impl ConfigurationError {
    /// Creates an invalid timeout error.
    pub fn invalid_timeout(field: impl Into<String>, duration: Duration) -> Self {
        Self::InvalidTimeout {
            field: field.into(),
            duration,
        }
    }

    /// Creates an invalid node ID error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid log level error.
    pub fn invalid_log_level(level: impl Into<String>) -> Self {
        Self::InvalidLogLevel {
            level: level.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidTimeout { .. } => ErrorCode::new(7, 1),
            Self::InvalidNodeId { .. } => ErrorCode::new(7, 2),
            Self::MissingField { .. } => ErrorCode::new(7, 3),
            Self::InvalidLogLevel { .. } => ErrorCode::new(7, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidTimeout { .. } => vec!["Durations must be greater than zero"],
            Self::InvalidNodeId { .. } => vec![
                "Format: ns=<index>;<type>=<value>",
                "Types: i (numeric), s (string), g (guid), b (opaque)",
            ],
            Self::MissingField { .. } => vec!["Provide the required configuration field"],
            Self::InvalidLogLevel { .. } => {
                vec!["Use one of: trace, debug, info, warn, error"]
            }
        }
    }

    /// Returns a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidTimeout { field, .. } => format!("잘못된 시간 설정: {}", field),
            Self::InvalidNodeId { node_id, .. } => format!("잘못된 노드 ID: {}", node_id),
            Self::MissingField { field } => format!("필수 설정 누락: {}", field),
            Self::InvalidLogLevel { level } => format!("잘못된 로그 레벨: {}", level),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Argument
/// - 2: Session
/// - 3: Security
/// - 4: Node manager
/// - 5: Subscription
/// - 6: Runtime
/// - 7: Configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-7).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }

    /// Creates from a u16.
    pub fn from_u16(value: u16) -> Self {
        Self {
            category: (value >> 8) as u8,
            code: (value & 0xFF) as u8,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A Result type with OpcUaError.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_error_names_argument() {
        let error = OpcUaError::empty_argument("client_name");
        assert_eq!(error.argument_name(), Some("client_name"));
        assert!(error.to_string().contains("client_name"));
        assert!(!error.is_retryable());

        let error = OpcUaError::zero_argument("publishing_interval");
        assert_eq!(error.argument_name(), Some("publishing_interval"));
        assert!(OpcUaError::session_not_ready().argument_name().is_none());
    }

    #[test]
    fn test_ensure_not_blank() {
        assert!(ensure_not_blank("name", "value").is_ok());
        assert!(ensure_not_blank("name", "").is_err());

        let error = ensure_not_blank("name", "   \t").unwrap_err();
        assert_eq!(error.argument_name(), Some("name"));
    }

    #[test]
    fn test_ensure_non_zero_duration() {
        assert!(ensure_non_zero_duration("timeout", Duration::from_millis(1)).is_ok());
        let error = ensure_non_zero_duration("timeout", Duration::ZERO).unwrap_err();
        assert!(matches!(
            error,
            OpcUaError::InvalidArgument(ArgumentError::Zero { .. })
        ));
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(
            OpcUaError::session_not_ready().to_string(),
            "Session has not yet been created"
        );
        assert_eq!(
            OpcUaError::node_manager_not_ready().to_string(),
            "Node Manager has not yet been created"
        );
        assert_eq!(
            OpcUaError::certificate_invalid("helper").to_string(),
            "Application instance certificate invalid"
        );
    }

    #[test]
    fn test_classification() {
        assert!(OpcUaError::session_not_ready().is_session_not_ready());
        assert!(OpcUaError::node_manager_not_ready().is_node_manager_not_ready());
        assert!(OpcUaError::certificate_invalid("app").is_certificate_invalid());
        assert!(!OpcUaError::empty_argument("x").is_session_not_ready());
    }

    #[test]
    fn test_runtime_error_retryable() {
        assert!(OpcUaError::endpoint_unreachable("opc.tcp://host:4840", "refused").is_retryable());
        assert!(OpcUaError::runtime(RuntimeError::ConnectionClosed).is_retryable());
        assert!(!OpcUaError::service_fault("Read", 0x8034_0000).is_retryable());
        assert!(OpcUaError::service_fault("Read", 0x800E_0000).is_retryable());
        assert!(
            OpcUaError::runtime(RuntimeError::timeout("Browse", Duration::from_secs(5)))
                .is_retryable()
        );
        assert!(
            !OpcUaError::runtime(RuntimeError::configuration_load("a.xml", "missing"))
                .is_retryable()
        );
        assert!(OpcUaError::subscription(SubscriptionError::creation_failed("busy")).is_retryable());
    }

    #[test]
    fn test_error_code() {
        let code = ErrorCode::new(2, 1);
        assert_eq!(code.to_string(), "UA-0201");
        assert_eq!(code.as_u16(), 0x0201);

        let from_u16 = ErrorCode::from_u16(0x0603);
        assert_eq!(from_u16.category, 6);
        assert_eq!(from_u16.code, 3);

        assert_eq!(OpcUaError::session_not_ready().error_code(), ErrorCode::new(2, 1));
    }

    #[test]
    fn test_severity_and_category() {
        assert_eq!(
            OpcUaError::certificate_invalid("app").severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            OpcUaError::session_not_ready().severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(OpcUaError::node_manager_not_ready().category(), "node_manager");
        assert_eq!(ErrorSeverity::Warning.to_tracing_level(), Level::WARN);
    }

    #[test]
    fn test_user_messages() {
        let error = OpcUaError::endpoint_unreachable("opc.tcp://192.168.1.100:4840", "refused");
        assert!(error.user_message().contains("192.168.1.100"));

        let error = OpcUaError::empty_argument("session_name");
        assert!(error.user_message().contains("session_name"));
    }

    #[test]
    fn test_recovery_hints() {
        let error = ConfigurationError::invalid_node_id("bad;format", "missing namespace");
        assert!(error.to_string().contains("bad;format"));
        assert!(error.recovery_hints().iter().any(|h| h.contains("ns=")));
        assert!(!OpcUaError::session_not_ready().recovery_hints().is_empty());
    }
}
