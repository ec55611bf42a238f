// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session ownership and automatic reconnection.
//!
//! A [`SessionController`] owns at most one live session. Keep-alive results
//! reported by the runtime are forwarded to a supervisor task, which drives
//! the reconnect state machine:
//!
//! ```text
//!              bad keep-alive, no handler active
//!  Connected ─────────────────────────────────► KeepAliveFailing
//!      ▲                                         │ (timer armed)
//!      │                                         ▼
//!      │          handler completes          Reconnecting
//!  Reconnected ◄──────────────────────────────── │
//!                                                │ timer elapsed or
//!                                                │ handler gave up
//!                                                ▼
//!  Connected ◄──── fresh session ────────── ReconnectExpired
//!                  (NewSessionEvent)             │
//!                                                │ recovery failed
//!                                                ▼
//!                                         KeepAliveFailing (timer re-armed)
//! ```
//!
//! Every reconnect attempt carries a [`ReconnectToken`]. Only the completion
//! whose token matches the active one is honored; completions from
//! superseded attempts are dropped.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::runtime::{
    ApplicationConfig, CertificatePolicy, ClientRuntime, EndpointDescription, KeepAliveEvent,
    KeepAliveHandler, SessionHandle,
};
use crate::client::subscription::SubscriptionManager;
use crate::client::write_queue::PendingWriteQueue;
use crate::config::ControllerConfig;
use crate::error::{
    ensure_non_zero_duration, ensure_not_blank, OpcUaError, OpcUaResult, RuntimeError,
    SessionError,
};

const NEW_SESSION_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// SessionSlot
// =============================================================================

/// Holder of the controller's single live session.
///
/// Shared with the subscription manager and the write flush loop, which
/// read the current handle on every call.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: RwLock<Option<SessionHandle>>,
}

impl SessionSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current session, if any.
    pub fn current(&self) -> Option<SessionHandle> {
        self.current.read().clone()
    }

    /// Returns the current session or [`SessionError::NotReady`].
    pub fn require(&self) -> OpcUaResult<SessionHandle> {
        self.current().ok_or_else(OpcUaError::session_not_ready)
    }

    /// Returns `true` if a session is present.
    pub fn is_present(&self) -> bool {
        self.current.read().is_some()
    }

    /// Stores `handle` and returns the previous session.
    pub fn replace(&self, handle: SessionHandle) -> Option<SessionHandle> {
        self.current.write().replace(handle)
    }

    /// Removes and returns the current session.
    pub fn take(&self) -> Option<SessionHandle> {
        self.current.write().take()
    }

    /// Removes and returns the current session if its id is `id`.
    pub fn take_if(&self, id: Uuid) -> Option<SessionHandle> {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|s| s.id == id) {
            current.take()
        } else {
            None
        }
    }
}

// =============================================================================
// ConnectionParams
// =============================================================================

/// Arguments of a full connection setup.
///
/// Remembered by the controller so an expired reconnect can rebuild the
/// session from scratch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Application name presented to the server.
    pub client_name: String,
    /// Application configuration path.
    pub config_path: String,
    /// Discovery URL of the server.
    pub server_url: String,
    /// Session name.
    pub session_name: String,
    /// Session timeout.
    pub session_timeout: Duration,
}

impl ConnectionParams {
    /// Creates connection parameters.
    pub fn new(
        client_name: impl Into<String>,
        config_path: impl Into<String>,
        server_url: impl Into<String>,
        session_name: impl Into<String>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            config_path: config_path.into(),
            server_url: server_url.into(),
            session_name: session_name.into(),
            session_timeout,
        }
    }

    /// Validates every argument.
    pub fn validate(&self) -> OpcUaResult<()> {
        ensure_not_blank("client_name", &self.client_name)?;
        ensure_not_blank("config_path", &self.config_path)?;
        ensure_not_blank("server_url", &self.server_url)?;
        ensure_not_blank("session_name", &self.session_name)?;
        ensure_non_zero_duration("session_timeout", self.session_timeout)
    }
}

// =============================================================================
// ReconnectPhase
// =============================================================================

/// Phase of the reconnect state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPhase {
    /// Keep-alive healthy, no reconnect in progress.
    #[default]
    Connected,

    /// Keep-alive failed; handler starting and supervising timer armed.
    KeepAliveFailing,

    /// Handler retrying on the reconnect period.
    Reconnecting,

    /// Handler restored the session; about to return to `Connected`.
    Reconnected,

    /// Handler gave up or the timer elapsed; rebuilding the session.
    ReconnectExpired,
}

impl ReconnectPhase {
    /// Returns `true` if no recovery is in progress.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while recovering from a keep-alive failure.
    #[inline]
    pub fn is_recovering(&self) -> bool {
        !self.is_connected()
    }

    /// Returns `true` if `next` is a legal successor of this phase.
    pub fn can_transition_to(&self, next: ReconnectPhase) -> bool {
        use ReconnectPhase::*;

        matches!(
            (self, next),
            (Connected, KeepAliveFailing)
                | (KeepAliveFailing, Reconnecting)
                | (KeepAliveFailing, Reconnected)
                | (KeepAliveFailing, ReconnectExpired)
                | (Reconnecting, Reconnected)
                | (Reconnecting, ReconnectExpired)
                | (Reconnected, Connected)
                | (ReconnectExpired, Connected)
                | (ReconnectExpired, KeepAliveFailing)
        )
    }
}

impl fmt::Display for ReconnectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::KeepAliveFailing => write!(f, "KeepAliveFailing"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Reconnected => write!(f, "Reconnected"),
            Self::ReconnectExpired => write!(f, "ReconnectExpired"),
        }
    }
}

// =============================================================================
// ReconnectToken
// =============================================================================

/// Generation id of a reconnect attempt or supervising timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconnectToken(u64);

impl ReconnectToken {
    /// Returns the generation number.
    pub fn generation(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReconnectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct ReconnectMachine {
    phase: ReconnectPhase,
    active: Option<ReconnectToken>,
    timer: Option<(ReconnectToken, CancellationToken)>,
    last_generation: u64,
}

impl ReconnectMachine {
    fn next_token(&mut self) -> ReconnectToken {
        self.last_generation += 1;
        ReconnectToken(self.last_generation)
    }

    fn stop_timer(&mut self) {
        if let Some((_, timer)) = self.timer.take() {
            timer.cancel();
        }
    }

    fn is_current_timer(&self, token: ReconnectToken) -> bool {
        matches!(&self.timer, Some((current, _)) if *current == token)
    }

    fn reset(&mut self) {
        self.stop_timer();
        self.active = None;
    }
}

// =============================================================================
// Events
// =============================================================================

/// Emitted once per successful recovery from an expired reconnect.
///
/// Delivered after the reconnect state has been reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionEvent {
    /// Identifier of the new session.
    pub session_id: Uuid,
    /// Generated name of the new session.
    pub session_name: String,
    /// Time the session was established.
    pub established_at: DateTime<Utc>,
}

#[derive(Debug)]
enum SupervisorEvent {
    KeepAlive(KeepAliveEvent),
    ReconnectFinished {
        token: ReconnectToken,
        result: OpcUaResult<SessionHandle>,
    },
    TimerElapsed {
        token: ReconnectToken,
    },
}

// =============================================================================
// SessionController
// =============================================================================

/// Owner of one session and its reconnect supervision.
///
/// Background work (supervisor, reconnect timer, write flush loop,
/// subscription fan-out) shares one cancellation token, fired by
/// [`dispose`](Self::dispose) or on drop.
///
/// Session creation and replacement must come from one logical owner at a
/// time; concurrent `initialize_connection` calls are not serialized.
pub struct SessionController<R: ClientRuntime> {
    inner: Arc<Inner<R>>,
}

struct Inner<R: ClientRuntime> {
    runtime: Arc<R>,
    config: ControllerConfig,
    session: Arc<SessionSlot>,
    params: Mutex<Option<ConnectionParams>>,
    machine: Mutex<ReconnectMachine>,
    phase_tx: watch::Sender<ReconnectPhase>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    new_session_tx: broadcast::Sender<NewSessionEvent>,
    cancel: CancellationToken,
    disposed: AtomicBool,
    stats: SessionStats,
    writes: Arc<PendingWriteQueue>,
    subscriptions: SubscriptionManager<R>,
}

impl<R: ClientRuntime> SessionController<R> {
    /// Creates a controller and starts its background tasks.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid or no tokio runtime is running.
    pub fn new(runtime: Arc<R>, config: ControllerConfig) -> OpcUaResult<Self> {
        config.validate()?;
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            OpcUaError::session(SessionError::creation_failed(format!(
                "no tokio runtime: {e}"
            )))
        })?;

        let cancel = CancellationToken::new();
        let session = Arc::new(SessionSlot::new());
        let (phase_tx, _) = watch::channel(ReconnectPhase::Connected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (new_session_tx, _) = broadcast::channel(NEW_SESSION_CHANNEL_CAPACITY);
        let writes = Arc::new(PendingWriteQueue::new());
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&runtime),
            Arc::clone(&session),
            &config,
            cancel.clone(),
        );

        let inner = Arc::new(Inner {
            runtime,
            config,
            session,
            params: Mutex::new(None),
            machine: Mutex::new(ReconnectMachine::default()),
            phase_tx,
            events_tx,
            new_session_tx,
            cancel,
            disposed: AtomicBool::new(false),
            stats: SessionStats::new(),
            writes,
            subscriptions,
        });

        handle.spawn(Arc::clone(&inner).run_supervisor(events_rx));
        handle.spawn(Arc::clone(&inner.writes).run_flush_loop(
            Arc::clone(&inner.runtime),
            Arc::clone(&inner.session),
            inner.config.write_flush_interval,
            inner.cancel.clone(),
        ));

        tracing::debug!(
            reconnect_timeout_ms = inner.config.reconnect_timeout.as_millis() as u64,
            reconnect_period_ms = inner.config.reconnect_period.as_millis() as u64,
            "Session controller started"
        );

        Ok(Self { inner })
    }

    /// Runs `f` with a fresh controller and disposes it afterwards.
    ///
    /// The controller is disposed whether `f` succeeds or fails.
    pub async fn scoped<F, Fut, T>(runtime: Arc<R>, config: ControllerConfig, f: F) -> OpcUaResult<T>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = OpcUaResult<T>>,
    {
        let controller = Arc::new(Self::new(runtime, config)?);
        let result = f(Arc::clone(&controller)).await;
        controller.dispose().await;
        result
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the runtime.
    pub fn runtime(&self) -> &Arc<R> {
        &self.inner.runtime
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Returns the current session, if any.
    pub fn session(&self) -> Option<SessionHandle> {
        self.inner.session.current()
    }

    /// Returns `true` if a session exists.
    pub fn has_session(&self) -> bool {
        self.inner.session.is_present()
    }

    pub(crate) fn require_session(&self) -> OpcUaResult<SessionHandle> {
        self.inner.session.require()
    }

    /// Returns the subscription manager bound to this controller's session.
    pub fn subscriptions(&self) -> &SubscriptionManager<R> {
        &self.inner.subscriptions
    }

    /// Returns the pending write queue.
    pub fn write_queue(&self) -> &Arc<PendingWriteQueue> {
        &self.inner.writes
    }

    /// Returns the session statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.inner.stats
    }

    /// Returns the current reconnect phase.
    pub fn reconnect_phase(&self) -> ReconnectPhase {
        self.inner.machine.lock().phase
    }

    /// Returns a receiver that observes reconnect phase changes.
    pub fn watch_reconnect_phase(&self) -> watch::Receiver<ReconnectPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Returns the token of the reconnect attempt in flight, if any.
    pub fn active_reconnect(&self) -> Option<ReconnectToken> {
        self.inner.machine.lock().active
    }

    /// Subscribes to new-session events.
    pub fn subscribe_new_session(&self) -> broadcast::Receiver<NewSessionEvent> {
        self.inner.new_session_tx.subscribe()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads the application, resolves the endpoint and creates a session.
    ///
    /// The parameters are remembered for recovery from an expired
    /// reconnect. Without `keep_alive` the reconnect watchdog is registered.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a blank string or zero timeout
    /// - `CertificateInvalid` if the application certificate is rejected
    /// - runtime errors from endpoint resolution or session creation
    pub async fn initialize_connection(
        &self,
        params: ConnectionParams,
        keep_alive: Option<KeepAliveHandler>,
    ) -> OpcUaResult<SessionHandle> {
        self.inner.ensure_not_disposed()?;
        params.validate()?;
        *self.inner.params.lock() = Some(params.clone());

        let session_name = params.session_name.clone();
        self.inner.connect(&params, &session_name, keep_alive).await
    }

    /// Creates a session on an already resolved endpoint.
    pub async fn create_session(
        &self,
        app: &ApplicationConfig,
        endpoint: &EndpointDescription,
        session_name: &str,
        session_timeout: Duration,
        keep_alive: Option<KeepAliveHandler>,
    ) -> OpcUaResult<SessionHandle> {
        self.inner.ensure_not_disposed()?;
        self.inner
            .create_session(app, endpoint, session_name, session_timeout, keep_alive)
            .await
    }

    /// Replaces the session with `session` and registers keep-alive on it.
    ///
    /// Subscriptions stay registered; the runtime carries them over on
    /// reconnect.
    pub async fn adopt_session(
        &self,
        session: SessionHandle,
        keep_alive: Option<KeepAliveHandler>,
    ) -> OpcUaResult<()> {
        self.inner.ensure_not_disposed()?;
        self.inner.adopt(session, keep_alive).await
    }

    /// Closes the current session.
    ///
    /// A no-op without a session. Any reconnect in progress is abandoned.
    pub async fn close_session(&self, delete_subscriptions: bool) -> OpcUaResult<()> {
        let Some(session) = self.inner.session.take() else {
            return Ok(());
        };

        {
            let mut machine = self.inner.machine.lock();
            machine.reset();
            self.inner.force_phase(&mut machine, ReconnectPhase::Connected);
        }
        self.inner.subscriptions.detach_all();

        if self.inner.runtime.is_connected(&session) {
            self.inner
                .runtime
                .close_session(&session, delete_subscriptions)
                .await?;
        }

        tracing::info!(session = %session, "Session closed");
        Ok(())
    }

    /// Cancels background work, stops the reconnect timer and closes the
    /// session.
    ///
    /// Safe to call more than once.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.cancel.cancel();
        {
            let mut machine = self.inner.machine.lock();
            machine.reset();
        }

        if let Some(session) = self.inner.session.take() {
            self.inner.subscriptions.detach_all();
            self.inner.close_quietly(&session).await;
        }
        self.inner.writes.clear().await;

        tracing::info!("Session controller disposed");
    }
}

impl<R: ClientRuntime> Drop for SessionController<R> {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl<R: ClientRuntime> fmt::Debug for SessionController<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session())
            .field("phase", &self.reconnect_phase())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// =============================================================================
// Inner: connection setup
// =============================================================================

impl<R: ClientRuntime> Inner<R> {
    fn ensure_not_disposed(&self) -> OpcUaResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(OpcUaError::session(SessionError::Disposed))
        } else {
            Ok(())
        }
    }

    async fn connect(
        &self,
        params: &ConnectionParams,
        session_name: &str,
        keep_alive: Option<KeepAliveHandler>,
    ) -> OpcUaResult<SessionHandle> {
        let app = self
            .runtime
            .load_application_config(&params.client_name, &params.config_path)
            .await?;

        if !self.runtime.check_application_certificate(&app).await? {
            return Err(OpcUaError::certificate_invalid(&app.application_name));
        }
        self.runtime.install_certificate_policy(
            &app,
            CertificatePolicy::from_auto_accept(self.config.auto_accept_certificates),
        );

        let discovery_timeout = self.config.endpoint_discovery_timeout;
        let endpoint = tokio::time::timeout(
            discovery_timeout,
            self.runtime.resolve_endpoint(
                &params.server_url,
                self.config.use_security,
                discovery_timeout,
            ),
        )
        .await
        .map_err(|_| {
            OpcUaError::runtime(RuntimeError::timeout("ResolveEndpoint", discovery_timeout))
        })??;

        self.create_session(&app, &endpoint, session_name, params.session_timeout, keep_alive)
            .await
    }

    async fn create_session(
        &self,
        app: &ApplicationConfig,
        endpoint: &EndpointDescription,
        session_name: &str,
        session_timeout: Duration,
        keep_alive: Option<KeepAliveHandler>,
    ) -> OpcUaResult<SessionHandle> {
        ensure_not_blank("session_name", session_name)?;
        ensure_non_zero_duration("session_timeout", session_timeout)?;

        let handle = self
            .runtime
            .create_session(app, endpoint, session_name, session_timeout, &self.config.identity)
            .await?;

        if let Some(previous) = self.install(handle.clone(), keep_alive) {
            self.subscriptions.detach_all();
            self.close_quietly(&previous).await;
        }
        self.release_if_disposed(&handle).await?;
        self.stats.sessions_created.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            session = %handle,
            endpoint = %endpoint.endpoint_url,
            secured = endpoint.secured,
            identity = self.config.identity.type_name(),
            "Session created"
        );
        Ok(handle)
    }

    async fn adopt(
        &self,
        session: SessionHandle,
        keep_alive: Option<KeepAliveHandler>,
    ) -> OpcUaResult<()> {
        if let Some(previous) = self.install(session.clone(), keep_alive) {
            self.close_quietly(&previous).await;
        }
        self.release_if_disposed(&session).await?;
        tracing::info!(session = %session, "Session adopted");
        Ok(())
    }

    /// Stores `handle`, registers keep-alive and returns the replaced
    /// session when it differs from `handle`.
    fn install(
        &self,
        handle: SessionHandle,
        keep_alive: Option<KeepAliveHandler>,
    ) -> Option<SessionHandle> {
        let handler = keep_alive.unwrap_or_else(|| self.watchdog());
        self.runtime.register_keep_alive(&handle, handler);

        let id = handle.id;
        self.session.replace(handle).filter(|previous| previous.id != id)
    }

    /// Closes `handle` and fails with [`SessionError::Disposed`] when the
    /// controller was disposed while `handle` was being installed.
    ///
    /// `dispose` raises the flag before emptying the slot, so either it
    /// takes `handle` itself or this check observes the flag.
    async fn release_if_disposed(&self, handle: &SessionHandle) -> OpcUaResult<()> {
        if !self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(orphan) = self.session.take_if(handle.id) {
            self.subscriptions.detach_all();
            self.close_quietly(&orphan).await;
            tracing::debug!(session = %orphan, "Session installed during dispose closed");
        }
        Err(OpcUaError::session(SessionError::Disposed))
    }

    fn watchdog(&self) -> KeepAliveHandler {
        let events = self.events_tx.clone();
        Arc::new(move |event| {
            // Closed mailbox means the controller is gone.
            let _ = events.send(SupervisorEvent::KeepAlive(event));
        })
    }

    async fn close_quietly(&self, session: &SessionHandle) {
        if !self.runtime.is_connected(session) {
            return;
        }
        if let Err(e) = self.runtime.close_session(session, true).await {
            tracing::debug!(session = %session, error = %e, "Closing replaced session failed");
        }
    }
}

// =============================================================================
// Inner: reconnect supervision
// =============================================================================

impl<R: ClientRuntime> Inner<R> {
    async fn run_supervisor(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SupervisorEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                SupervisorEvent::KeepAlive(event) => self.on_keep_alive(event),
                SupervisorEvent::ReconnectFinished { token, result } => {
                    self.on_reconnect_finished(token, result).await
                }
                SupervisorEvent::TimerElapsed { token } => self.on_timer_elapsed(token).await,
            }
        }

        tracing::debug!("Session supervisor stopped");
    }

    fn on_keep_alive(&self, event: KeepAliveEvent) {
        if event.status.is_good() {
            return;
        }

        let Some(session) = self.session.current() else {
            tracing::trace!(status = %event.status, "Keep-alive without session ignored");
            return;
        };
        if session.id != event.session_id {
            tracing::debug!(
                session_id = %event.session_id,
                "Keep-alive from replaced session ignored"
            );
            return;
        }

        let mut machine = self.machine.lock();
        if machine.active.is_some() || !machine.phase.is_connected() {
            tracing::trace!(phase = %machine.phase, "Reconnect already in progress");
            return;
        }

        self.stats.keep_alive_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            session = %session,
            status = %event.status,
            "Keep-alive failed, starting reconnect"
        );

        let token = machine.next_token();
        machine.active = Some(token);
        self.transition(&mut machine, ReconnectPhase::KeepAliveFailing);
        self.arm_timer(&mut machine);
        self.spawn_reconnect(token, session);
        self.transition(&mut machine, ReconnectPhase::Reconnecting);
    }

    async fn on_reconnect_finished(
        &self,
        token: ReconnectToken,
        result: OpcUaResult<SessionHandle>,
    ) {
        let stale = self.machine.lock().active != Some(token);
        if stale {
            self.stats.stale_completions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(token = %token, "Stale reconnect completion discarded");
            if let Ok(orphan) = result {
                let is_current = self.session.current().is_some_and(|s| s.id == orphan.id);
                if !is_current {
                    self.close_quietly(&orphan).await;
                }
            }
            return;
        }

        match result {
            Ok(session) => {
                {
                    let mut machine = self.machine.lock();
                    machine.reset();
                    self.transition(&mut machine, ReconnectPhase::Reconnected);
                }
                if let Err(e) = self.adopt(session, None).await {
                    tracing::debug!(token = %token, "Reconnected session dropped: {e}");
                    return;
                }
                {
                    let mut machine = self.machine.lock();
                    self.transition(&mut machine, ReconnectPhase::Connected);
                }
                self.stats.reconnections.fetch_add(1, Ordering::Relaxed);
                tracing::info!(token = %token, "Session reconnected");
            }
            Err(e) => {
                tracing::warn!(
                    token = %token,
                    error_code = %e.error_code(),
                    "Reconnect handler gave up: {e}"
                );
                let expired = {
                    let mut machine = self.machine.lock();
                    machine.active = None;
                    machine.stop_timer();
                    self.transition(&mut machine, ReconnectPhase::ReconnectExpired)
                };
                if expired {
                    self.recover_expired().await;
                }
            }
        }
    }

    async fn on_timer_elapsed(&self, token: ReconnectToken) {
        let expired = {
            let mut machine = self.machine.lock();
            if !machine.is_current_timer(token) {
                tracing::trace!(token = %token, "Stopped reconnect timer ignored");
                return;
            }
            machine.timer = None;
            self.transition(&mut machine, ReconnectPhase::ReconnectExpired)
        };

        if expired {
            tracing::warn!(
                timeout_ms = self.config.reconnect_timeout.as_millis() as u64,
                "Reconnect timer expired, creating a new session"
            );
            self.recover_expired().await;
        }
    }

    async fn recover_expired(&self) {
        let params = self.params.lock().clone();
        let result = match params {
            Some(params) => {
                let session_name = Uuid::new_v4().to_string();
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    result = self.connect(&params, &session_name, None) => result,
                }
            }
            None => Err(OpcUaError::session(SessionError::creation_failed(
                "no connection parameters to recover with",
            ))),
        };

        match result {
            Ok(session) => {
                {
                    let mut machine = self.machine.lock();
                    machine.reset();
                    self.transition(&mut machine, ReconnectPhase::Connected);
                }
                self.stats.expired_recoveries.fetch_add(1, Ordering::Relaxed);
                tracing::info!(session = %session, "Session recovered after reconnect expiry");

                // No receivers is fine.
                let _ = self.new_session_tx.send(NewSessionEvent {
                    session_id: session.id,
                    session_name: session.name.clone(),
                    established_at: Utc::now(),
                });
            }
            Err(OpcUaError::Session(SessionError::Disposed)) => {}
            Err(e) => {
                self.stats.expired_retries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error_code = %e.error_code(),
                    retry_in_ms = self.config.reconnect_timeout.as_millis() as u64,
                    "Session recovery failed, retry scheduled: {e}"
                );
                let mut machine = self.machine.lock();
                self.transition(&mut machine, ReconnectPhase::KeepAliveFailing);
                self.arm_timer(&mut machine);
            }
        }
    }

    fn spawn_reconnect(&self, token: ReconnectToken, session: SessionHandle) {
        let runtime = Arc::clone(&self.runtime);
        let events = self.events_tx.clone();
        let cancel = self.cancel.clone();
        let period = self.config.reconnect_period;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = runtime.reconnect(&session, period) => result,
            };
            let _ = events.send(SupervisorEvent::ReconnectFinished { token, result });
        });
    }

    fn arm_timer(&self, machine: &mut ReconnectMachine) {
        machine.stop_timer();
        let token = machine.next_token();
        let timer = self.cancel.child_token();
        machine.timer = Some((token, timer.clone()));

        let events = self.events_tx.clone();
        let timeout = self.config.reconnect_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = events.send(SupervisorEvent::TimerElapsed { token });
                }
            }
        });
    }

    fn transition(&self, machine: &mut ReconnectMachine, next: ReconnectPhase) -> bool {
        let current = machine.phase;
        if !current.can_transition_to(next) {
            tracing::debug!(from = %current, to = %next, "Reconnect transition rejected");
            return false;
        }
        self.force_phase(machine, next);
        true
    }

    fn force_phase(&self, machine: &mut ReconnectMachine, next: ReconnectPhase) {
        let previous = std::mem::replace(&mut machine.phase, next);
        self.phase_tx.send_replace(next);
        if previous != next {
            tracing::trace!(from = %previous, to = %next, "Reconnect phase changed");
        }
    }
}

// =============================================================================
// SessionStats
// =============================================================================

/// Statistics for session supervision.
#[derive(Debug, Default)]
pub struct SessionStats {
    sessions_created: AtomicU64,
    keep_alive_failures: AtomicU64,
    reconnections: AtomicU64,
    expired_recoveries: AtomicU64,
    expired_retries: AtomicU64,
    stale_completions: AtomicU64,
}

impl SessionStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sessions created.
    pub fn sessions_created(&self) -> u64 {
        self.sessions_created.load(Ordering::Relaxed)
    }

    /// Returns the number of keep-alive failures that started a reconnect.
    pub fn keep_alive_failures(&self) -> u64 {
        self.keep_alive_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of sessions restored by the reconnect handler.
    pub fn reconnections(&self) -> u64 {
        self.reconnections.load(Ordering::Relaxed)
    }

    /// Returns the number of sessions rebuilt after a reconnect expired.
    pub fn expired_recoveries(&self) -> u64 {
        self.expired_recoveries.load(Ordering::Relaxed)
    }

    /// Returns the number of failed rebuild attempts.
    pub fn expired_retries(&self) -> u64 {
        self.expired_retries.load(Ordering::Relaxed)
    }

    /// Returns the number of discarded reconnect completions.
    pub fn stale_completions(&self) -> u64 {
        self.stale_completions.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.sessions_created.store(0, Ordering::Relaxed);
        self.keep_alive_failures.store(0, Ordering::Relaxed);
        self.reconnections.store(0, Ordering::Relaxed);
        self.expired_recoveries.store(0, Ordering::Relaxed);
        self.expired_retries.store(0, Ordering::Relaxed);
        self.stale_completions.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
