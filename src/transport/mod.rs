//! Simulator connection handling: wire format, deferred release and the
//! per-connection session

pub mod latency;
pub mod protocol;
pub mod session;

pub use latency::LatencyQueue;
pub use protocol::{decode_frame, encode_frame, encode_telemetry, Inbound, Outbound};
pub use session::{Session, SessionStats};
