// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client-side session supervision, subscriptions and batched writes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     SessionController                           │
//! │     (session slot, reconnect supervisor, queries, scoping)      │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                     │                      │
//!            ▼                     ▼                      ▼
//! ┌───────────────────┐ ┌─────────────────────┐ ┌───────────────────┐
//! │SubscriptionManager│ │  PendingWriteQueue  │ │ reconnect timer / │
//! │ (items, fan-out)  │ │  (1s flush loop)    │ │ reconnect handler │
//! └───────────────────┘ └─────────────────────┘ └───────────────────┘
//!            │                     │                      │
//!            ▼                     ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ClientRuntime                             │
//! │                (protocol stack boundary)                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use trap_opcua_helper::client::{ConnectionParams, SessionController};
//!
//! let controller = SessionController::new(runtime, ControllerConfig::default())?;
//! controller
//!     .initialize_connection(
//!         ConnectionParams::new("c", "cfg.xml", "opc.tcp://host:4840", "s", Duration::from_secs(30)),
//!         None,
//!     )
//!     .await?;
//!
//! let subscriptions = controller.subscriptions();
//! let item = subscriptions.create_monitored_item("Tank/Level", |n: &MonitoredItemNotification| {
//!     println!("{} = {:?}", n.node_id, n.value.value);
//! })?;
//! subscriptions
//!     .create_subscription(vec![item], Duration::from_millis(100), false)
//!     .await?;
//! ```

mod query;
pub mod runtime;
pub mod session;
pub mod subscription;
pub mod write_queue;

pub use runtime::{
    ApplicationConfig, BrowseDescription, BrowseDirection, BrowsePage, CertificatePolicy,
    ClientRuntime, ContinuationPoint, CreatedSubscription, EndpointDescription, KeepAliveEvent,
    KeepAliveHandler, MonitoredItemRequest, MonitoredItemResult, SessionHandle,
    SubscriptionRequest,
};
pub use session::{
    ConnectionParams, NewSessionEvent, ReconnectPhase, ReconnectToken, SessionController,
    SessionSlot, SessionStats,
};
pub use subscription::{
    ChannelHandler, FanOutReport, MonitoredItem, MonitoredItemNotification, NotificationHandler,
    Subscription, SubscriptionManager, SubscriptionManagerStats,
};
pub use write_queue::{FlushOutcome, PendingWriteQueue, WriteQueueStats};
