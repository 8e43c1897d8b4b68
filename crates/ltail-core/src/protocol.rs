use crate::channel::Channel;
use crate::index::FileEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_RECORD_BYTES: usize = 256 * 1024;

/// Every inbound `type` the client understands.
pub const RECORD_TYPES: [&str; 8] = [
    "index", "attach", "detach", "log", "error", "stats", "pong", "host",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Attach {
        #[serde(default, skip_serializing_if = "Channel::is_index")]
        channel: Channel,
    },
    Detach {
        #[serde(default, skip_serializing_if = "Channel::is_index")]
        channel: Channel,
    },
    Ping,
    Host,
    Stats,
    Trace {
        channel: String,
    },
}

impl Outbound {
    pub fn trace(enabled: bool) -> Self {
        Outbound::Trace {
            channel: if enabled { "on" } else { "off" }.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Attach { .. } => "attach",
            Outbound::Detach { .. } => "detach",
            Outbound::Ping => "ping",
            Outbound::Host => "host",
            Outbound::Stats => "stats",
            Outbound::Trace { .. } => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Index {
        data: FileEntry,
    },
    Attach {
        #[serde(default, skip_serializing_if = "Channel::is_index")]
        channel: Channel,
    },
    Detach {
        #[serde(default, skip_serializing_if = "Channel::is_index")]
        channel: Channel,
    },
    Log {
        #[serde(default)]
        data: String,
    },
    Error {
        #[serde(default)]
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    Stats {
        #[serde(default)]
        data: Value,
    },
    Pong,
    Host {
        #[serde(default)]
        data: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record exceeds max size: {size} > {max}")]
    OversizedRecord { size: usize, max: usize },
    #[error("record is not valid json: {0}")]
    Malformed(String),
    #[error("record has no type")]
    MissingType,
    #[error("unknown record type '{0}'")]
    UnknownType(String),
    #[error("invalid '{kind}' record: {reason}")]
    Invalid { kind: String, reason: String },
    #[error("record encode failed: {0}")]
    Encode(String),
}

impl RecordError {
    /// Unknown types are expected from newer servers and only warrant a warning.
    pub fn is_soft(&self) -> bool {
        matches!(self, RecordError::UnknownType(_))
    }
}

/// Records decoded from one frame, in order, plus the per-record failures.
#[derive(Debug, Clone, Default)]
pub struct DecodeReport {
    pub records: Vec<Inbound>,
    pub errors: Vec<RecordError>,
}

pub fn encode_record(record: &Outbound) -> Result<String, RecordError> {
    serde_json::to_string(record).map_err(|err| RecordError::Encode(err.to_string()))
}

pub fn decode_record(raw: &str, max_record_bytes: usize) -> Result<Inbound, RecordError> {
    if raw.len() > max_record_bytes {
        return Err(RecordError::OversizedRecord {
            size: raw.len(),
            max: max_record_bytes,
        });
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|err| RecordError::Malformed(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(RecordError::MissingType)?
        .to_string();
    if !RECORD_TYPES.contains(&kind.as_str()) {
        return Err(RecordError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|err| RecordError::Invalid {
        kind,
        reason: err.to_string(),
    })
}

/// Splits one transport frame into newline-delimited records.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_record_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_record_bytes: usize) -> Self {
        Self { max_record_bytes }
    }

    pub fn decode(&self, frame: &str) -> DecodeReport {
        let mut report = DecodeReport::default();
        for line in frame.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            match decode_record(line, self.max_record_bytes) {
                Ok(record) => report.records.push(record),
                Err(err) => report.errors.push(err),
            }
        }
        report
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Timestamp;
    use chrono::{TimeZone, Utc};

    #[test]
    fn batched_frame_keeps_record_order() {
        let report = FrameDecoder::default()
            .decode("{\"type\":\"log\",\"data\":\"line1\"}\n{\"type\":\"log\",\"data\":\"line2\"}");
        assert!(report.errors.is_empty());
        assert_eq!(
            report.records,
            vec![
                Inbound::Log {
                    data: "line1".to_string()
                },
                Inbound::Log {
                    data: "line2".to_string()
                },
            ]
        );
    }

    #[test]
    fn malformed_record_does_not_abort_frame() {
        let frame = concat!(
            "{\"type\":\"log\",\"data\":\"a\"}\n",
            "{\"type\":\"log\",\"data\":\n",
            "{\"type\":\"attach\"}\r\n",
            "{\"type\":\"index\",\"data\":{\"name\":\"x.log\"}}\n",
            "{\"type\":\"log\",\"data\":\"b\"}\n",
        );
        let report = FrameDecoder::default().decode(frame);

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[1], Inbound::Attach { channel: Channel::Index });
        assert_eq!(report.errors.len(), 2);
        assert!(matches!(report.errors[0], RecordError::Malformed(_)));
        assert!(matches!(report.errors[1], RecordError::Invalid { ref kind, .. } if kind == "index"));
    }

    #[test]
    fn unknown_type_is_soft_error() {
        let report = FrameDecoder::default().decode(
            "{\"type\":\"list\",\"data\":{}}\n{\"channel\":\"a\"}\n{\"type\":\"pong\"}",
        );
        assert_eq!(report.records, vec![Inbound::Pong]);
        assert_eq!(report.errors[0], RecordError::UnknownType("list".to_string()));
        assert!(report.errors[0].is_soft());
        assert_eq!(report.errors[1], RecordError::MissingType);
        assert!(!report.errors[1].is_soft());
    }

    #[test]
    fn oversized_record_rejected_individually() {
        let big = format!("{{\"type\":\"log\",\"data\":\"{}\"}}", "x".repeat(200));
        let frame = format!("{big}\n{{\"type\":\"host\",\"data\":\"srv\"}}");
        let report = FrameDecoder::new(64).decode(&frame);

        assert_eq!(
            report.records,
            vec![Inbound::Host {
                data: "srv".to_string()
            }]
        );
        assert!(matches!(report.errors[0], RecordError::OversizedRecord { .. }));
    }

    #[test]
    fn index_record_decodes_both_timestamp_forms() {
        let iso = decode_record(
            r#"{"type":"index","data":{"name":"app.log","size":12,"mtime":"2020-01-02T03:04:05.000Z"}}"#,
            DEFAULT_MAX_RECORD_BYTES,
        )
        .expect("iso");
        let legacy = decode_record(
            r#"{"type":"index","data":{"name":"old.log","size":0,"mtime":"/Date(1000)/","deleted":true}}"#,
            DEFAULT_MAX_RECORD_BYTES,
        )
        .expect("legacy");

        match iso {
            Inbound::Index { data } => {
                assert_eq!(data.name, "app.log");
                assert_eq!(data.size, 12);
                assert!(!data.deleted);
                assert_eq!(
                    data.modified.instant(),
                    Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).single()
                );
            }
            other => panic!("unexpected record: {other:?}"),
        }
        match legacy {
            Inbound::Index { data } => {
                assert!(data.deleted);
                assert_eq!(data.modified.instant(), Utc.timestamp_millis_opt(1000).single());
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn unparseable_mtime_passes_through() {
        let record = decode_record(
            r#"{"type":"index","data":{"name":"a","size":1,"mtime":"unknown"}}"#,
            DEFAULT_MAX_RECORD_BYTES,
        )
        .expect("decode");
        let Inbound::Index { data } = record else {
            panic!("expected index record");
        };
        assert_eq!(data.modified, Timestamp::Raw("unknown".to_string()));
    }

    #[test]
    fn acknowledgments_and_diagnostics_decode() {
        let decoder = FrameDecoder::default();
        let report = decoder.decode(concat!(
            "{\"type\":\"attach\",\"channel\":\"app.log\"}\n",
            "{\"type\":\"detach\",\"channel\":\"\"}\n",
            "{\"type\":\"error\",\"data\":\"unknown channel\",\"channel\":\"nope.log\"}\n",
            "{\"type\":\"stats\",\"data\":{\"app.log\":2}}\n",
            "{\"type\":\"log\"}\n",
        ));
        assert!(report.errors.is_empty());
        assert_eq!(
            report.records[0],
            Inbound::Attach {
                channel: Channel::file("app.log")
            }
        );
        assert_eq!(report.records[1], Inbound::Detach { channel: Channel::Index });
        assert_eq!(
            report.records[2],
            Inbound::Error {
                data: "unknown channel".to_string(),
                channel: Some("nope.log".to_string()),
            }
        );
        assert_eq!(
            report.records[3],
            Inbound::Stats {
                data: serde_json::json!({"app.log": 2})
            }
        );
        assert_eq!(report.records[4], Inbound::Log { data: String::new() });
    }

    #[test]
    fn outbound_omits_index_channel() {
        assert_eq!(
            encode_record(&Outbound::Attach {
                channel: Channel::Index
            })
            .expect("encode"),
            r#"{"type":"attach"}"#
        );
        assert_eq!(
            encode_record(&Outbound::Detach {
                channel: Channel::file("logs/app.log")
            })
            .expect("encode"),
            r#"{"type":"detach","channel":"logs/app.log"}"#
        );
        assert_eq!(encode_record(&Outbound::Ping).expect("encode"), r#"{"type":"ping"}"#);
        assert_eq!(
            encode_record(&Outbound::trace(true)).expect("encode"),
            r#"{"type":"trace","channel":"on"}"#
        );
    }
}
