// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # trap-opcua-helper
//!
//! Connection resilience and address-space mirroring for TRAP OPC UA
//! endpoints.
//!
//! The protocol stack itself stays behind two traits, [`ClientRuntime`] and
//! [`ServerRuntime`]. This crate adds the behavior around them:
//!
//! - **Client**: [`SessionController`] keeps one live session, detects
//!   keep-alive failures, drives a reconnect handler and falls back to a
//!   brand new session when reconnecting takes too long. Subscribers learn
//!   about replacement sessions through [`NewSessionEvent`].
//! - **Subscriptions**: [`SubscriptionManager`] builds monitored items,
//!   creates subscriptions and tears them down in parallel.
//! - **Writes**: [`PendingWriteQueue`] batches value writes and flushes them
//!   on a fixed interval.
//! - **Server**: [`AddressSpaceManager`] starts the server and mirrors
//!   remote nodes as folders, objects and variables, with data types
//!   derived by [`map_built_in_type`].
//!
//! ## Reconnect States
//!
//! ```text
//! Connected ──▶ KeepAliveFailing ──▶ Reconnecting ──▶ Reconnected ──▶ Connected
//!                      ▲                   │
//!                      │                   ▼
//!                      └────────── ReconnectExpired ──▶ Connected (new session)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use trap_opcua_helper::{ConnectionParams, ControllerConfig, SessionController};
//!
//! let controller = SessionController::new(Arc::new(runtime), ControllerConfig::default())?;
//! controller
//!     .initialize_connection(
//!         ConnectionParams::new(
//!             "gateway",
//!             "client.config.xml",
//!             "opc.tcp://plc:4840",
//!             "gateway-session",
//!             Duration::from_secs(60),
//!         ),
//!         None,
//!     )
//!     .await?;
//!
//! let mut sessions = controller.subscribe_new_session();
//! while let Ok(event) = sessions.recv().await {
//!     tracing::info!(session = %event.session_id, "Rebuilding subscriptions");
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// =============================================================================
// Client & Server Modules
// =============================================================================

pub mod client;
pub mod server;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use config::{ControllerConfig, ServerConfig, SubscriptionDefaults, UserIdentity};
pub use error::{
    ensure_non_zero_duration, ensure_not_blank, ArgumentError, ConfigurationError, ErrorCode,
    ErrorSeverity, NodeManagerError, OpcUaError, OpcUaResult, RuntimeError, SecurityError,
    SessionError, SubscriptionError,
};
pub use logging::{init_logging, LogFormat};
pub use types::*;

pub use client::{
    ApplicationConfig, ClientRuntime, ConnectionParams, KeepAliveEvent, KeepAliveHandler,
    MonitoredItem, MonitoredItemNotification, NewSessionEvent, NotificationHandler,
    PendingWriteQueue, ReconnectPhase, SessionController, SessionHandle, Subscription,
    SubscriptionManager,
};
pub use server::{
    map_built_in_type, AddressSpaceManager, AddressSpaceNode, NodeFactory, ServerRuntime,
    VariableOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
