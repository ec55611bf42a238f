// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration for the session controller and the server helper.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use trap_opcua_helper::config::ControllerConfig;
//!
//! let config = ControllerConfig::builder()
//!     .reconnect_timeout(Duration::from_secs(60))
//!     .auto_accept_certificates(false)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.reconnect_period, Duration::from_secs(5));
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};

// =============================================================================
// UserIdentity
// =============================================================================

/// Identity presented when a session is activated.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserIdentity {
    /// Anonymous authentication.
    #[default]
    Anonymous,

    /// Username and password authentication.
    UserName {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl UserIdentity {
    /// Returns the token type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::UserName { .. } => "UserName",
        }
    }
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

// =============================================================================
// ControllerConfig
// =============================================================================

/// Session controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Supervising timer armed when keep-alive first fails.
    #[serde(default = "default_reconnect_timeout")]
    #[serde(with = "humantime_serde")]
    pub reconnect_timeout: Duration,

    /// Retry period handed to the runtime's reconnect primitive.
    #[serde(default = "default_reconnect_period")]
    #[serde(with = "humantime_serde")]
    pub reconnect_period: Duration,

    /// Interval of the pending write flush loop.
    #[serde(default = "default_write_flush_interval")]
    #[serde(with = "humantime_serde")]
    pub write_flush_interval: Duration,

    /// Endpoint discovery timeout.
    #[serde(default = "default_endpoint_discovery_timeout")]
    #[serde(with = "humantime_serde")]
    pub endpoint_discovery_timeout: Duration,

    /// Select a secured endpoint during discovery.
    #[serde(default)]
    pub use_security: bool,

    /// Accept every server certificate.
    #[serde(default = "default_true")]
    pub auto_accept_certificates: bool,

    /// Session identity.
    #[serde(default)]
    pub identity: UserIdentity,

    /// Namespace used when a caller passes a bare identifier.
    #[serde(default = "default_namespace_index")]
    pub default_namespace_index: u16,

    /// Defaults new subscriptions are built from.
    #[serde(default)]
    pub subscription: SubscriptionDefaults,
}

fn default_reconnect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reconnect_period() -> Duration {
    Duration::from_secs(5)
}

fn default_write_flush_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_endpoint_discovery_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_true() -> bool {
    true
}

fn default_namespace_index() -> u16 {
    2
}

impl ControllerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Validates this configuration.
    pub fn validate(&self) -> OpcUaResult<()> {
        let durations = [
            ("reconnect_timeout", self.reconnect_timeout),
            ("reconnect_period", self.reconnect_period),
            ("write_flush_interval", self.write_flush_interval),
            ("endpoint_discovery_timeout", self.endpoint_discovery_timeout),
            ("subscription.sampling_interval", self.subscription.sampling_interval),
        ];

        for (field, duration) in durations {
            if duration.is_zero() {
                return Err(OpcUaError::configuration(
                    ConfigurationError::invalid_timeout(field, duration),
                ));
            }
        }

        if let UserIdentity::UserName { username, .. } = &self.identity {
            if username.trim().is_empty() {
                return Err(OpcUaError::configuration(ConfigurationError::missing_field(
                    "identity.username",
                )));
            }
        }

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconnect_timeout: default_reconnect_timeout(),
            reconnect_period: default_reconnect_period(),
            write_flush_interval: default_write_flush_interval(),
            endpoint_discovery_timeout: default_endpoint_discovery_timeout(),
            use_security: false,
            auto_accept_certificates: true,
            identity: UserIdentity::default(),
            default_namespace_index: default_namespace_index(),
            subscription: SubscriptionDefaults::default(),
        }
    }
}

// =============================================================================
// ControllerConfigBuilder
// =============================================================================

/// Builder for `ControllerConfig`.
#[derive(Debug, Default)]
pub struct ControllerConfigBuilder {
    reconnect_timeout: Option<Duration>,
    reconnect_period: Option<Duration>,
    write_flush_interval: Option<Duration>,
    endpoint_discovery_timeout: Option<Duration>,
    use_security: Option<bool>,
    auto_accept_certificates: Option<bool>,
    identity: Option<UserIdentity>,
    default_namespace_index: Option<u16>,
    subscription: Option<SubscriptionDefaults>,
}

impl ControllerConfigBuilder {
    /// Sets the supervising reconnect timer.
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = Some(timeout);
        self
    }

    /// Sets the reconnect retry period.
    pub fn reconnect_period(mut self, period: Duration) -> Self {
        self.reconnect_period = Some(period);
        self
    }

    /// Sets the write flush interval.
    pub fn write_flush_interval(mut self, interval: Duration) -> Self {
        self.write_flush_interval = Some(interval);
        self
    }

    /// Sets the endpoint discovery timeout.
    pub fn endpoint_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.endpoint_discovery_timeout = Some(timeout);
        self
    }

    /// Selects a secured endpoint during discovery.
    pub fn use_security(mut self, enabled: bool) -> Self {
        self.use_security = Some(enabled);
        self
    }

    /// Accepts every server certificate.
    pub fn auto_accept_certificates(mut self, enabled: bool) -> Self {
        self.auto_accept_certificates = Some(enabled);
        self
    }

    /// Sets username/password authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.identity = Some(UserIdentity::UserName {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets anonymous authentication.
    pub fn anonymous(mut self) -> Self {
        self.identity = Some(UserIdentity::Anonymous);
        self
    }

    /// Sets the default namespace index.
    pub fn default_namespace_index(mut self, index: u16) -> Self {
        self.default_namespace_index = Some(index);
        self
    }

    /// Sets the subscription defaults.
    pub fn subscription(mut self, defaults: SubscriptionDefaults) -> Self {
        self.subscription = Some(defaults);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> OpcUaResult<ControllerConfig> {
        let config = ControllerConfig {
            reconnect_timeout: self.reconnect_timeout.unwrap_or_else(default_reconnect_timeout),
            reconnect_period: self.reconnect_period.unwrap_or_else(default_reconnect_period),
            write_flush_interval: self
                .write_flush_interval
                .unwrap_or_else(default_write_flush_interval),
            endpoint_discovery_timeout: self
                .endpoint_discovery_timeout
                .unwrap_or_else(default_endpoint_discovery_timeout),
            use_security: self.use_security.unwrap_or(false),
            auto_accept_certificates: self.auto_accept_certificates.unwrap_or(true),
            identity: self.identity.unwrap_or_default(),
            default_namespace_index: self
                .default_namespace_index
                .unwrap_or_else(default_namespace_index),
            subscription: self.subscription.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// SubscriptionDefaults
// =============================================================================

/// Session-level defaults applied to every new subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDefaults {
    /// Lifetime count (publishing intervals before the subscription expires).
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,

    /// Maximum notifications per publish (0 = unlimited).
    #[serde(default)]
    pub max_notifications_per_publish: u32,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,

    /// Sampling interval of monitored items.
    #[serde(default = "default_sampling_interval")]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,
}

fn default_lifetime_count() -> u32 {
    60
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(250)
}

impl Default for SubscriptionDefaults {
    fn default() -> Self {
        Self {
            lifetime_count: default_lifetime_count(),
            keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            sampling_interval: default_sampling_interval(),
        }
    }
}

// =============================================================================
// ServerConfig
// =============================================================================

/// Server helper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port the server listens on.
    pub port: u16,

    /// Name of the folder every helper node lives under.
    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: String,

    /// Locale of display names.
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_root_folder_name() -> String {
    "OpcUaServerHelper".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

impl ServerConfig {
    /// Creates a configuration for `port` with default names.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            root_folder_name: default_root_folder_name(),
            locale: default_locale(),
        }
    }

    /// Sets the root folder name.
    pub fn with_root_folder_name(mut self, name: impl Into<String>) -> Self {
        self.root_folder_name = name.into();
        self
    }

    /// Validates this configuration.
    pub fn validate(&self) -> OpcUaResult<()> {
        if self.port == 0 {
            return Err(OpcUaError::zero_argument("port"));
        }
        if self.root_folder_name.trim().is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::missing_field(
                "root_folder_name",
            )));
        }
        Ok(())
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
