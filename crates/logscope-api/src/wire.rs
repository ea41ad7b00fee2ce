//! Wire types and record codecs for the log service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logscope_types::{Direction, LogRecord, Segment, Selector};

/// Body of a point-in-time range query.
#[derive(Clone, Debug, Serialize)]
pub struct RangeQueryRequest {
    pub selector: String,
    pub deployment_target_id: String,
    pub search_term: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub limit: usize,
    pub direction: Direction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_filter: Option<String>,
}

impl RangeQueryRequest {
    pub fn for_selector(
        selector: &Selector,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        direction: Direction,
        limit: usize,
    ) -> Self {
        Self {
            selector: selector.service.clone(),
            deployment_target_id: selector.deployment_target_id.clone(),
            search_term: selector.search_term.clone(),
            start_time,
            end_time,
            limit,
            direction,
            revision_filter: selector.revision.clone(),
        }
    }
}

/// Range query response: encoded records plus continue-tokens for both
/// directions. Token representation is protocol-defined; the client treats
/// them as opaque.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RangeQueryResponse {
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,

    #[serde(default)]
    pub backward_continue_time: Option<String>,

    #[serde(default)]
    pub forward_continue_time: Option<String>,
}

/// One record as encoded by a structured (v2) collector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub service: String,

    #[serde(default = "default_stream")]
    pub stream: String,

    #[serde(default)]
    pub revision_id: String,

    #[serde(default)]
    pub revision_number: u64,

    #[serde(default)]
    pub job_run_id: Option<String>,

    #[serde(default)]
    pub segments: Vec<Segment>,
}

fn default_stream() -> String {
    "stdout".to_string()
}

impl WireRecord {
    fn into_record(self, raw: String) -> LogRecord {
        LogRecord {
            sequence: 0,
            timestamp: self.timestamp,
            service: self.service,
            stream: self.stream,
            revision_id: self.revision_id,
            revision_number: self.revision_number,
            job_run_id: self.job_run_id,
            content: self.segments,
            raw,
        }
    }
}

/// Decode one structured line. Malformed input yields a single fallback
/// record, never an error.
pub fn decode_structured_line(line: &str) -> LogRecord {
    match serde_json::from_str::<WireRecord>(line) {
        Ok(wire) => wire.into_record(line.to_string()),
        Err(err) => {
            tracing::debug!(%err, "failed to decode structured record");
            LogRecord::fallback(line)
        }
    }
}

/// Decode one structured record value from a query response.
pub fn decode_structured_value(value: &serde_json::Value) -> LogRecord {
    match serde_json::from_value::<WireRecord>(value.clone()) {
        Ok(wire) => wire.into_record(value.to_string()),
        Err(err) => {
            tracing::debug!(%err, "failed to decode structured record");
            match value {
                serde_json::Value::String(s) => LogRecord::fallback(s),
                other => LogRecord::fallback(&other.to_string()),
            }
        }
    }
}

/// Decode one plain (v1) line of the form `<rfc3339> <stream> <text>`.
///
/// Older collectors carry no service or revision metadata on the wire; the
/// service comes from the selector the feed was opened with.
pub fn decode_plain_line(selector: &Selector, line: &str) -> LogRecord {
    let mut parts = line.splitn(3, ' ');
    let timestamp = parts
        .next()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    let stream = parts.next().filter(|s| !s.is_empty());
    let text = parts.next().unwrap_or("");

    match (timestamp, stream) {
        (Some(timestamp), Some(stream)) => LogRecord {
            sequence: 0,
            timestamp: Some(timestamp),
            service: selector.service.clone(),
            stream: stream.to_string(),
            revision_id: String::new(),
            revision_number: 0,
            job_run_id: None,
            content: vec![Segment::plain(text)],
            raw: line.to_string(),
        },
        _ => {
            tracing::debug!("failed to decode plain record");
            let mut record = LogRecord::fallback(line);
            record.timestamp = timestamp;
            record.service = selector.service.clone();
            record
        }
    }
}

/// Decode one plain record value from a query response.
pub fn decode_plain_value(selector: &Selector, value: &serde_json::Value) -> LogRecord {
    match value {
        serde_json::Value::String(line) => decode_plain_line(selector, line),
        other => {
            tracing::debug!("plain query response carried a non-string record");
            LogRecord::fallback(&other.to_string())
        }
    }
}
