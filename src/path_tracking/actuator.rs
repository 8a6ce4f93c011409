//! Raw actuation to simulator command units, plus release scheduling

use std::time::{Duration, Instant};

use crate::common::{ActuatorCommand, Visualization};
use crate::path_tracking::bicycle::Actuation;

/// When a computed command may be handed to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyPolicy {
    /// Release as soon as it is computed
    Immediate,
    /// Hold for a fixed actuation delay
    Deferred(Duration),
}

impl LatencyPolicy {
    pub fn from_latency(latency: Duration) -> Self {
        if latency.is_zero() {
            LatencyPolicy::Immediate
        } else {
            LatencyPolicy::Deferred(latency)
        }
    }

    pub fn delay(&self) -> Duration {
        match self {
            LatencyPolicy::Immediate => Duration::ZERO,
            LatencyPolicy::Deferred(d) => *d,
        }
    }
}

/// A command waiting for its release instant
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub command: ActuatorCommand,
    pub visualization: Visualization,
    pub ready_at: Instant,
}

impl PendingCommand {
    pub fn is_ready(&self, now: Instant) -> bool {
        now >= self.ready_at
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActuatorMapper {
    max_steer: f64,
    policy: LatencyPolicy,
}

impl ActuatorMapper {
    pub fn new(max_steer: f64, policy: LatencyPolicy) -> Self {
        Self { max_steer, policy }
    }

    /// Steering is `-delta / max_steer` (the simulator steers right for
    /// positive values); throttle passes through.
    pub fn map(&self, act: &Actuation) -> ActuatorCommand {
        let steering = (-act.delta / self.max_steer).clamp(-1.0, 1.0);
        let throttle = act.accel.clamp(-1.0, 1.0);
        ActuatorCommand::new(steering, throttle)
    }

    /// Inverse of `map` for the steering channel
    pub fn unmap(&self, command: &ActuatorCommand) -> Actuation {
        Actuation::new(-command.steering * self.max_steer, command.throttle)
    }

    pub fn schedule(
        &self,
        command: ActuatorCommand,
        visualization: Visualization,
        computed_at: Instant,
    ) -> PendingCommand {
        PendingCommand {
            command,
            visualization,
            ready_at: computed_at + self.policy.delay(),
        }
    }
}
