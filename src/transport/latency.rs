//! Deferred release of computed commands
//!
//! Commands wait here until their release instant instead of the driver
//! sleeping through the actuation latency.

use std::collections::VecDeque;
use std::time::Instant;

use crate::path_tracking::actuator::PendingCommand;

/// Pending commands ordered by release instant
#[derive(Debug, Default)]
pub struct LatencyQueue {
    pending: VecDeque<PendingCommand>,
}

impl LatencyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Insert keeping release order; equal instants stay in arrival order
    pub fn push(&mut self, command: PendingCommand) {
        let idx = self
            .pending
            .partition_point(|p| p.ready_at <= command.ready_at);
        self.pending.insert(idx, command);
    }

    /// Remove and return every command due at `now`, oldest first
    pub fn pop_ready(&mut self, now: Instant) -> Vec<PendingCommand> {
        let due = self.pending.partition_point(|p| p.is_ready(now));
        self.pending.drain(..due).collect()
    }

    /// Instant at which the next command becomes due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.front().map(|p| p.ready_at)
    }

    /// Release everything regardless of deadlines
    pub fn drain_all(&mut self) -> Vec<PendingCommand> {
        self.pending.drain(..).collect()
    }
}
