//! Simulator wire format
//!
//! Frames are socket.io event messages: the `42` message-type prefix followed
//! by a JSON array `["<event>", {payload}]`. The only inbound event acted on
//! is `telemetry`; outbound frames are `steer` (command + visualization) and
//! `manual` (empty acknowledgment).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{
    ActuatorCommand, Frame, MpcError, MpcResult, Pose2D, Telemetry, Visualization, Waypoints,
};

const EVENT_PREFIX: &str = "42";
const TELEMETRY_EVENT: &str = "telemetry";

/// What an inbound frame asks of the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Not an event frame, or an event that is not handled
    Ignored,
    /// No payload: the simulator is driven manually
    Manual,
    Telemetry(Telemetry),
}

/// Frames sent back to the simulator
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Steer {
        command: ActuatorCommand,
        visualization: Visualization,
    },
    Manual,
}

/// Telemetry payload as it appears on the wire; every field may be absent
#[derive(Debug, Deserialize)]
struct RawTelemetry {
    ptsx: Option<Vec<f64>>,
    ptsy: Option<Vec<f64>>,
    x: Option<f64>,
    y: Option<f64>,
    psi: Option<f64>,
    speed: Option<f64>,
}

fn required<T>(value: Option<T>, name: &str) -> MpcResult<T> {
    value.ok_or_else(|| MpcError::invalid_input(format!("telemetry is missing `{}`", name)))
}

impl TryFrom<RawTelemetry> for Telemetry {
    type Error = MpcError;

    fn try_from(raw: RawTelemetry) -> MpcResult<Self> {
        let ptsx = required(raw.ptsx, "ptsx")?;
        let ptsy = required(raw.ptsy, "ptsy")?;
        let pose = Pose2D::new(
            required(raw.x, "x")?,
            required(raw.y, "y")?,
            required(raw.psi, "psi")?,
        );
        let speed = required(raw.speed, "speed")?;
        let waypoints = Waypoints::new(Frame::Global, ptsx, ptsy)?;
        Ok(Telemetry::new(waypoints, pose, speed))
    }
}

#[derive(Serialize)]
struct SteerPayload<'a> {
    steering_angle: f64,
    throttle: f64,
    mpc_x: &'a [f64],
    mpc_y: &'a [f64],
    next_x: &'a [f64],
    next_y: &'a [f64],
}

#[derive(Serialize)]
struct EmptyPayload {}

#[derive(Serialize)]
struct TelemetryPayload<'a> {
    ptsx: &'a [f64],
    ptsy: &'a [f64],
    x: f64,
    y: f64,
    psi: f64,
    speed: f64,
}

/// Body of an event frame, or `None` when it carries no usable payload.
///
/// Any `null` in the frame means the simulator is in manual mode. Otherwise
/// the body runs from the first `[` to the last `}]`.
fn event_body(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None;
    }
    let start = frame.find('[')?;
    let end = frame.rfind("}]")?;
    if end < start {
        return None;
    }
    Some(&frame[start..end + 2])
}

/// Decode one inbound frame.
///
/// Malformed JSON is a `Decode` error and missing telemetry fields are an
/// `InvalidInput` error; the caller answers both with a manual
/// acknowledgment.
pub fn decode_frame(frame: &str) -> MpcResult<Inbound> {
    let frame = frame.trim();
    if frame.len() <= EVENT_PREFIX.len() || !frame.starts_with(EVENT_PREFIX) {
        return Ok(Inbound::Ignored);
    }

    let body = match event_body(&frame[EVENT_PREFIX.len()..]) {
        Some(body) => body,
        None => return Ok(Inbound::Manual),
    };

    let value: Value = serde_json::from_str(body)?;
    let event = value
        .get(0)
        .and_then(Value::as_str)
        .ok_or_else(|| MpcError::Decode("event frame has no event name".to_string()))?;

    if event != TELEMETRY_EVENT {
        return Ok(Inbound::Ignored);
    }

    let payload = value
        .get(1)
        .cloned()
        .ok_or_else(|| MpcError::invalid_input("telemetry event has no payload"))?;
    let raw: RawTelemetry = serde_json::from_value(payload)
        .map_err(|e| MpcError::invalid_input(format!("malformed telemetry: {}", e)))?;

    Ok(Inbound::Telemetry(Telemetry::try_from(raw)?))
}

/// Encode an outbound frame
pub fn encode_frame(outbound: &Outbound) -> MpcResult<String> {
    let body = match outbound {
        Outbound::Steer { command, visualization } => {
            let payload = SteerPayload {
                steering_angle: command.steering,
                throttle: command.throttle,
                mpc_x: &visualization.mpc_x,
                mpc_y: &visualization.mpc_y,
                next_x: &visualization.next_x,
                next_y: &visualization.next_y,
            };
            serde_json::to_string(&("steer", payload))?
        }
        Outbound::Manual => serde_json::to_string(&("manual", EmptyPayload {}))?,
    };
    Ok(format!("{}{}", EVENT_PREFIX, body))
}

/// Encode a telemetry event the way the simulator sends it
pub fn encode_telemetry(telemetry: &Telemetry) -> MpcResult<String> {
    let payload = TelemetryPayload {
        ptsx: telemetry.waypoints.xs(),
        ptsy: telemetry.waypoints.ys(),
        x: telemetry.pose.x,
        y: telemetry.pose.y,
        psi: telemetry.pose.yaw,
        speed: telemetry.speed,
    };
    let body = serde_json::to_string(&(TELEMETRY_EVENT, payload))?;
    Ok(format!("{}{}", EVENT_PREFIX, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TELEMETRY: &str = r#"42["telemetry",{"ptsx":[10.0,20.0,30.0],"ptsy":[0.0,1.0,2.0],"psi_unity":4.12,"psi":3.5,"x":-40.6,"y":108.7,"steering_angle":0.0,"throttle":0.0,"speed":12.5}]"#;

    #[test]
    fn test_decode_telemetry() {
        let decoded = decode_frame(TELEMETRY).unwrap();
        let telemetry = match decoded {
            Inbound::Telemetry(t) => t,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(telemetry.waypoints.xs(), &[10.0, 20.0, 30.0]);
        assert_eq!(telemetry.waypoints.frame(), Frame::Global);
        assert_eq!(telemetry.pose, Pose2D::new(-40.6, 108.7, 3.5));
        assert_eq!(telemetry.speed, 12.5);
    }

    #[test]
    fn test_null_payload_is_manual() {
        assert_eq!(decode_frame(r#"42["telemetry",null]"#).unwrap(), Inbound::Manual);
        assert_eq!(decode_frame(r#"42["manual"]"#).unwrap(), Inbound::Manual);
    }

    #[test]
    fn test_non_event_frames_ignored() {
        assert_eq!(decode_frame("2").unwrap(), Inbound::Ignored);
        assert_eq!(decode_frame("40").unwrap(), Inbound::Ignored);
        assert_eq!(decode_frame("").unwrap(), Inbound::Ignored);
        assert_eq!(decode_frame(r#"42["reset",{}]"#).unwrap(), Inbound::Ignored);
    }

    #[test]
    fn test_missing_field_is_invalid_input() {
        let frame = r#"42["telemetry",{"ptsx":[1.0,2.0],"ptsy":[0.0,0.0],"x":0.0,"y":0.0,"speed":1.0}]"#;
        let err = decode_frame(frame).unwrap_err();
        assert!(matches!(err, MpcError::InvalidInput(ref m) if m.contains("psi")));
    }

    #[test]
    fn test_mismatched_waypoints_is_invalid_input() {
        let frame = r#"42["telemetry",{"ptsx":[1.0,2.0],"ptsy":[0.0],"x":0.0,"y":0.0,"psi":0.0,"speed":1.0}]"#;
        assert!(matches!(decode_frame(frame), Err(MpcError::InvalidInput(_))));
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        let frame = r#"42["telemetry",{"ptsx":[1.0,}]"#;
        assert!(matches!(decode_frame(frame), Err(MpcError::Decode(_))));
    }

    #[test]
    fn test_recorded_telemetry_decodes() {
        let waypoints = Waypoints::new(Frame::Global, vec![1.5, 2.5], vec![-3.0, 4.0]).unwrap();
        let telemetry = Telemetry::new(waypoints, Pose2D::new(7.0, -8.0, 7.5), 33.0);
        let frame = encode_telemetry(&telemetry).unwrap();
        assert!(frame.starts_with(r#"42["telemetry",{"ptsx":[1.5,2.5]"#));
        assert_eq!(decode_frame(&frame).unwrap(), Inbound::Telemetry(telemetry));
    }

    #[test]
    fn test_encode_manual() {
        assert_eq!(encode_frame(&Outbound::Manual).unwrap(), r#"42["manual",{}]"#);
    }

    #[test]
    fn test_encode_steer() {
        let frame = encode_frame(&Outbound::Steer {
            command: ActuatorCommand::new(-0.25, 0.5),
            visualization: Visualization {
                mpc_x: vec![0.0, 1.0],
                mpc_y: vec![0.0, 0.5],
                next_x: vec![10.0],
                next_y: vec![2.0],
            },
        })
        .unwrap();
        assert_eq!(
            frame,
            r#"42["steer",{"steering_angle":-0.25,"throttle":0.5,"mpc_x":[0.0,1.0],"mpc_y":[0.0,0.5],"next_x":[10.0],"next_y":[2.0]}]"#
        );
    }
}
