// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.
//!
//! The helper only emits `tracing` events. Applications that do not install
//! their own subscriber can call [`init_logging`] once at startup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{ArgumentError, ConfigurationError, OpcUaError, OpcUaResult};

// =============================================================================
// LogFormat
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
    /// Minimal single-line output.
    Compact,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Compact => write!(f, "compact"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(OpcUaError::invalid_argument(ArgumentError::out_of_range(
                "log_format",
                format!("unknown format '{}'", s),
            ))),
        }
    }
}

// =============================================================================
// Logging Initialization
// =============================================================================

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Returns `Ok(false)` without
/// touching anything when a global subscriber is already installed.
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidLogLevel`] for unknown levels.
pub fn init_logging(level: &str, format: LogFormat) -> OpcUaResult<bool> {
    let level = parse_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    let installed = match format {
        LogFormat::Text => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt_layer::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(is_terminal),
                )
                .try_init()
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt_layer::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer::layer().compact().with_target(false))
            .try_init(),
    };

    match installed {
        Ok(()) => Ok(true),
        Err(e) => {
            tracing::debug!(error = %e, "Global subscriber already installed");
            Ok(false)
        }
    }
}

// =============================================================================
// Log Level Parsing
// =============================================================================

/// Parses a log level string into a `Level`.
pub fn parse_level(level: &str) -> OpcUaResult<Level> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(OpcUaError::configuration(
            ConfigurationError::invalid_log_level(level),
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
