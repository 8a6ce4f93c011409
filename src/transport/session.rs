//! One simulator connection
//!
//! A session owns its control loop and its latency queue. Frames are
//! processed strictly in arrival order; no error raised while handling a
//! frame ends the session.

use std::time::Instant;

use log::{debug, error, info, warn};

use crate::common::MpcResult;
use crate::config::MpcConfig;
use crate::path_tracking::actuator::PendingCommand;
use crate::path_tracking::control_loop::{ControlLoop, CycleStatus};
use crate::transport::latency::LatencyQueue;
use crate::transport::protocol::{decode_frame, encode_frame, Inbound, Outbound};

/// Cycle counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: usize,
    pub solved: usize,
    pub fallbacks: usize,
    pub skipped: usize,
    pub manual: usize,
}

pub struct Session {
    control: ControlLoop,
    queue: LatencyQueue,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: MpcConfig) -> MpcResult<Self> {
        info!("Starting session (N = {}, dt = {}, latency = {} ms)", config.n, config.dt, config.latency_ms);
        Ok(Self {
            control: ControlLoop::new(config)?,
            queue: LatencyQueue::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn control(&self) -> &ControlLoop {
        &self.control
    }

    /// Handle one inbound frame received at `now`.
    ///
    /// Returns a frame to send right away (the manual acknowledgment), if
    /// any. Steer frames are queued and come out of `poll` once due.
    pub fn handle_frame(&mut self, frame: &str, now: Instant) -> Option<String> {
        self.stats.frames += 1;

        let telemetry = match decode_frame(frame) {
            Ok(Inbound::Telemetry(t)) => t,
            Ok(Inbound::Ignored) => return None,
            Ok(Inbound::Manual) => {
                self.stats.manual += 1;
                return self.manual_ack();
            }
            Err(e) => {
                warn!("Dropping frame: {}", e);
                self.stats.skipped += 1;
                return self.manual_ack();
            }
        };

        match self.control.run_cycle(&telemetry, now) {
            Ok(output) => {
                match output.status {
                    CycleStatus::Solved { iterations, cost } => {
                        debug!("Solved in {} iterations, cost {:.4e}", iterations, cost);
                        self.stats.solved += 1;
                    }
                    CycleStatus::Fallback { .. } => self.stats.fallbacks += 1,
                }
                self.queue.push(output.pending);
                None
            }
            Err(e) => {
                if e.is_per_cycle() {
                    warn!("Skipping control cycle: {}", e);
                } else {
                    error!("Control cycle failed: {}", e);
                }
                self.stats.skipped += 1;
                self.manual_ack()
            }
        }
    }

    /// Encoded steer frames whose latency has elapsed at `now`
    pub fn poll(&mut self, now: Instant) -> Vec<String> {
        let due = self.queue.pop_ready(now);
        Self::encode_steer(due)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Release every queued command, e.g. when the input ends
    pub fn flush(&mut self) -> Vec<String> {
        let all = self.queue.drain_all();
        Self::encode_steer(all)
    }

    fn encode_steer(pending: Vec<PendingCommand>) -> Vec<String> {
        pending
            .into_iter()
            .filter_map(|p| {
                let outbound = Outbound::Steer {
                    command: p.command,
                    visualization: p.visualization,
                };
                match encode_frame(&outbound) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!("Dropping command: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    fn manual_ack(&self) -> Option<String> {
        match encode_frame(&Outbound::Manual) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Cannot encode manual acknowledgment: {}", e);
                None
            }
        }
    }
}
