// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Batched value writes.
//!
//! Producers append [`WriteValue`]s at any time. A background loop owned by
//! the session controller drains the queue into a single write call about
//! once per second whenever a session exists. The queue lock is held across
//! the drain and the write, so a producer never observes a half-cleared
//! batch, and entries are discarded after every attempt whether or not the
//! server accepted them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::runtime::{ClientRuntime, SessionHandle};
use crate::client::session::SessionSlot;
use crate::error::{OpcUaError, OpcUaResult};
use crate::types::{StatusCode, WriteValue};

// =============================================================================
// FlushOutcome
// =============================================================================

/// Result of one flush attempt.
#[derive(Debug)]
pub struct FlushOutcome {
    /// Number of values handed to the runtime.
    pub attempted: usize,
    /// Per-value status codes, or the error of the whole call.
    pub result: OpcUaResult<Vec<StatusCode>>,
}

impl FlushOutcome {
    /// Returns `true` if the call succeeded and every value was accepted.
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(statuses) if statuses.iter().all(StatusCode::is_good))
    }

    /// Returns the number of values the server rejected.
    ///
    /// A failed call counts every attempted value as rejected.
    pub fn rejected(&self) -> usize {
        match &self.result {
            Ok(statuses) => statuses.iter().filter(|s| !s.is_good()).count(),
            Err(_) => self.attempted,
        }
    }
}

// =============================================================================
// PendingWriteQueue
// =============================================================================

/// Queue of writes waiting for the next flush.
#[derive(Debug, Default)]
pub struct PendingWriteQueue {
    entries: Mutex<Vec<WriteValue>>,
    stats: WriteQueueStats,
}

impl PendingWriteQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a write to the next batch.
    pub async fn enqueue(&self, value: WriteValue) {
        self.entries.lock().await.push(value);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of queued writes.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Discards every queued write.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Returns the queue statistics.
    pub fn stats(&self) -> &WriteQueueStats {
        &self.stats
    }

    /// Writes every queued value in one call and clears the queue.
    ///
    /// Returns `None` without calling the runtime when the queue is empty.
    pub async fn flush<R>(&self, runtime: &R, session: &SessionHandle) -> Option<FlushOutcome>
    where
        R: ClientRuntime + ?Sized,
    {
        let mut entries = self.entries.lock().await;
        if entries.is_empty() {
            return None;
        }

        let batch = std::mem::take(&mut *entries);
        let result = runtime.write(session, &batch).await;
        drop(entries);

        let outcome = FlushOutcome {
            attempted: batch.len(),
            result,
        };
        self.stats.record(&outcome);
        Some(outcome)
    }

    /// Flushes every `interval` until `cancel` fires.
    ///
    /// Ticks without a session leave the queue untouched.
    pub(crate) async fn run_flush_loop<R>(
        self: Arc<Self>,
        runtime: Arc<R>,
        session: Arc<SessionSlot>,
        interval: Duration,
        cancel: CancellationToken,
    ) where
        R: ClientRuntime,
    {
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Write flush loop started");

        while !cancel.is_cancelled() {
            match session.current() {
                Some(handle) => {
                    if let Some(outcome) = self.flush(runtime.as_ref(), &handle).await {
                        log_outcome(&outcome);
                    }
                }
                None => tracing::trace!("No session, write flush skipped"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::debug!("Write flush loop stopped");
    }
}

fn log_outcome(outcome: &FlushOutcome) {
    match &outcome.result {
        Ok(_) if outcome.is_success() => {
            tracing::trace!(values = outcome.attempted, "Pending writes flushed");
        }
        Ok(_) => tracing::warn!(
            values = outcome.attempted,
            rejected = outcome.rejected(),
            "Server rejected some pending writes"
        ),
        Err(e) => log_write_error(e, outcome.attempted),
    }
}

fn log_write_error(error: &OpcUaError, values: usize) {
    tracing::warn!(
        error_code = %error.error_code(),
        values,
        "Pending write batch failed, values discarded: {error}"
    );
}

// =============================================================================
// WriteQueueStats
// =============================================================================

/// Statistics for the pending write queue.
#[derive(Debug, Default)]
pub struct WriteQueueStats {
    enqueued: AtomicU64,
    batches: AtomicU64,
    written: AtomicU64,
    rejected: AtomicU64,
}

impl WriteQueueStats {
    fn record(&self, outcome: &FlushOutcome) {
        let rejected = outcome.rejected() as u64;
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.written
            .fetch_add((outcome.attempted as u64).saturating_sub(rejected), Ordering::Relaxed);
        self.rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    /// Returns the number of enqueued writes.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Returns the number of flushed batches.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Returns the number of values the server accepted.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Returns the number of values that were rejected or lost to a failed call.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        self.enqueued.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
        self.written.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
