//! Envelope decoding for inbound device messages
//!
//! ## Overview
//!
//! Devices publish small JSON envelopes over the transport:
//!
//! ```json
//! {"cmd": 1, "seq": 42, "ts": 1700000000, "dev_id": "mac1",
//!  "data": {"flow_state": 9, "heart_rate": 70}}
//! ```
//!
//! The `cmd` tag selects the payload shape, and decoding is strict: the
//! payload is parsed into a typed variant of [`Payload`], unknown command
//! tags and unknown payload fields are decode errors, and decode errors
//! drop the message (logged by the caller, never retried).
//!
//! A tagged decode instead of a loose keyed map means downstream code gets
//! an exhaustive `match` over known shapes rather than per-field string
//! lookups.

use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, DecodeResult};
use crate::time::Timestamp;

/// Message semantics tag carried in the envelope's `cmd` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Per-second attribute state report (respiratory/heart/posture/...)
    AttributeReport = 1,
    /// Discrete event report (presence, posture class, warning code)
    EventReport = 2,
    /// Closed session report with per-sample metric arrays
    SessionReport = 3,
    /// Standalone warning notification
    Warning = 4,
}

impl TryFrom<u32> for Command {
    type Error = DecodeError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Command::AttributeReport),
            2 => Ok(Command::EventReport),
            3 => Ok(Command::SessionReport),
            4 => Ok(Command::Warning),
            other => Err(DecodeError::UnknownCommand(other)),
        }
    }
}

/// Latest attribute state sampled by the device.
///
/// Fields the device did not report default to zero; the snapshot merge in
/// the ingest path only treats reported changes as significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttributePayload {
    /// Breaths per minute
    pub respiratory_rate: i32,
    /// Beats per minute
    pub heart_rate: i32,
    /// Concentration / flow score, 0-100
    pub flow_state: i32,
    /// Posture classification code
    pub posture: i32,
    /// Movement events per minute
    pub activity_freq: i32,
    /// Coarse body status code (absent/still/active/...)
    pub body_status: i32,
    /// Seconds of study time covered by this sample
    pub study_secs: u32,
}

/// Discrete event state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventPayload {
    /// Whether a person is present
    pub present: bool,
    /// Posture classification code
    pub posture_class: i32,
    /// Warning code fired by this event, 0 = none
    pub warning: i32,
}

/// One closed reporting interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportPayload {
    /// Interval start, epoch seconds
    pub start: Timestamp,
    /// Interval end, epoch seconds
    pub end: Timestamp,
    /// Per-sample flow/concentration scores, 0-100
    pub flow_samples: Vec<f32>,
    /// Per-sample respiratory rates
    pub respiratory_samples: Vec<f32>,
    /// Per-sample heart rates
    pub heart_rate_samples: Vec<f32>,
    /// Total study time in the interval, seconds
    pub study_time: u32,
    /// Scalar concentration score for the interval, 0-100
    pub concentration: f32,
    /// Scalar evaluation score for the interval, 0-100
    pub evaluation: f32,
}

/// Standalone warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarningPayload {
    /// Warning code
    pub code: i32,
}

/// Typed payload, selected by the envelope's command tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Attribute state (`cmd = 1`)
    Attribute(AttributePayload),
    /// Discrete event (`cmd = 2`)
    Event(EventPayload),
    /// Session report (`cmd = 3`)
    Report(ReportPayload),
    /// Warning (`cmd = 4`)
    Warning(WarningPayload),
}

/// One decoded inbound device message.
///
/// Immutable once decoded; the device id keys every downstream step.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Message semantics tag
    pub command: Command,
    /// Device-assigned sequence number
    pub sequence: u64,
    /// Device timestamp, epoch seconds
    pub timestamp: Timestamp,
    /// Device identifier, the aggregation key throughout
    pub device_id: String,
    /// Typed payload
    pub payload: Payload,
}

/// Wire shape of the envelope before the payload is typed.
#[derive(Deserialize)]
struct RawEnvelope {
    cmd: u32,
    #[serde(default)]
    seq: u64,
    ts: Timestamp,
    dev_id: String,
    data: serde_json::Value,
}

impl Envelope {
    /// Decode an envelope from raw transport bytes.
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let raw: RawEnvelope = serde_json::from_slice(bytes)?;
        if raw.dev_id.is_empty() {
            return Err(DecodeError::MissingDeviceId);
        }

        let command = Command::try_from(raw.cmd)?;
        let payload = match command {
            Command::AttributeReport => Payload::Attribute(serde_json::from_value(raw.data)?),
            Command::EventReport => Payload::Event(serde_json::from_value(raw.data)?),
            Command::SessionReport => Payload::Report(serde_json::from_value(raw.data)?),
            Command::Warning => Payload::Warning(serde_json::from_value(raw.data)?),
        };

        Ok(Self {
            command,
            sequence: raw.seq,
            timestamp: raw.ts,
            device_id: raw.dev_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_attribute_report() {
        let bytes = br#"{"cmd":1,"seq":7,"ts":1700000000,"dev_id":"mac1",
                         "data":{"flow_state":9,"heart_rate":70}}"#;
        let env = Envelope::decode(bytes).unwrap();

        assert_eq!(env.command, Command::AttributeReport);
        assert_eq!(env.device_id, "mac1");
        match env.payload {
            Payload::Attribute(attr) => {
                assert_eq!(attr.flow_state, 9);
                assert_eq!(attr.heart_rate, 70);
                // Unreported fields default to zero
                assert_eq!(attr.respiratory_rate, 0);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn decodes_session_report() {
        let bytes = br#"{"cmd":3,"ts":1700000000,"dev_id":"mac1",
                         "data":{"start":1699990000,"end":1700000000,
                                 "flow_samples":[40.0,60.0,80.0],
                                 "study_time":1800,"evaluation":85.0}}"#;
        let env = Envelope::decode(bytes).unwrap();

        match env.payload {
            Payload::Report(report) => {
                assert_eq!(report.study_time, 1800);
                assert_eq!(report.flow_samples.len(), 3);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_command() {
        let bytes = br#"{"cmd":99,"ts":1,"dev_id":"mac1","data":{}}"#;
        assert!(matches!(
            Envelope::decode(bytes),
            Err(DecodeError::UnknownCommand(99))
        ));
    }

    #[test]
    fn rejects_unknown_payload_fields() {
        let bytes = br#"{"cmd":2,"ts":1,"dev_id":"mac1","data":{"bogus":1}}"#;
        assert!(matches!(
            Envelope::decode(bytes),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_empty_device_id() {
        let bytes = br#"{"cmd":1,"ts":1,"dev_id":"","data":{}}"#;
        assert!(matches!(
            Envelope::decode(bytes),
            Err(DecodeError::MissingDeviceId)
        ));
    }
}
