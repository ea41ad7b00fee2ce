//! Shared types for logscope
//!
//! This crate contains data structures used across multiple logscope crates.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Engine Constants
// ============================================================================

/// Hard cap on the number of records a buffer may hold.
pub const MAX_LOGS: usize = 5000;

/// Batch granularity: trim size on overflow and the pending-queue flush bound.
pub const MAX_BUFFER_LOGS: usize = 1000;

/// Records requested per range query.
pub const QUERY_LIMIT: usize = 1000;

/// Width of a single query window, in seconds.
pub const QUERY_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Output stream name carried by records produced before a deploy goes live.
pub const PREDEPLOY_STREAM: &str = "predeploy";

// ============================================================================
// Records
// ============================================================================

/// Display style for a single text span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStyle {
    #[serde(default)]
    pub bold: bool,

    /// Named color as sent by the service ("red", "cyan", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A styled span of log text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,

    #[serde(default)]
    pub style: SegmentStyle,
}

impl Segment {
    /// An unstyled span.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: SegmentStyle::default(),
        }
    }
}

/// A single log record
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    /// Buffer-assigned sequence number, ascending in display order
    pub sequence: u64,

    /// Parsed timestamp (if available)
    pub timestamp: Option<DateTime<Utc>>,

    /// Source service name
    pub service: String,

    /// Output stream ("stdout", "stderr", "predeploy")
    pub stream: String,

    /// Revision that produced this record
    pub revision_id: String,

    /// Ordinal of that revision
    pub revision_number: u64,

    /// Job run this record belongs to, if any
    pub job_run_id: Option<String>,

    /// Decoded styled spans
    pub content: Vec<Segment>,

    /// Original encoded line as received
    pub raw: String,
}

impl LogRecord {
    /// Create a record with empty metadata around the given content.
    pub fn new(content: Vec<Segment>, raw: String) -> Self {
        Self {
            sequence: 0,
            timestamp: None,
            service: String::new(),
            stream: String::new(),
            revision_id: String::new(),
            revision_number: 0,
            job_run_id: None,
            content,
            raw,
        }
    }

    /// Fallback for a line that failed to decode: empty content, raw line
    /// preserved, metadata defaulted.
    pub fn fallback(raw: &str) -> Self {
        Self::new(Vec::new(), raw.to_string())
    }

    /// Concatenated plain text of the record, falling back to the raw line
    /// when nothing decoded.
    pub fn text(&self) -> String {
        if self.content.is_empty() {
            return self.raw.clone();
        }
        self.content.iter().map(|s| s.text.as_str()).collect()
    }

    /// Whether this record was produced by a pre-deploy command.
    pub fn is_predeploy(&self) -> bool {
        self.stream == PREDEPLOY_STREAM
    }
}

/// Query/merge direction relative to the buffer's display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Opaque continue-token issued by the query service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorToken(String);

impl CursorToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Pagination state across adjacent windows.
///
/// `previous == None` is the authoritative "no earlier history" signal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub previous: Option<CursorToken>,
    pub next: Option<CursorToken>,
}

impl PageCursor {
    pub fn history_exhausted(&self) -> bool {
        self.previous.is_none()
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Sentinel value meaning "unconstrained" for every filter.
pub const FILTER_ALL: &str = "all";

/// Well-known client-side filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterId {
    ServiceName,
    OutputStream,
    Revision,
}

impl FilterId {
    pub const ALL: [FilterId; 3] = [Self::ServiceName, Self::OutputStream, Self::Revision];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceName => "service_name",
            Self::OutputStream => "output_stream",
            Self::Revision => "revision",
        }
    }

    /// The record field this filter compares against.
    pub fn field<'a>(&self, record: &'a LogRecord) -> &'a str {
        match self {
            Self::ServiceName => &record.service,
            Self::OutputStream => &record.stream,
            Self::Revision => &record.revision_id,
        }
    }
}

/// Immutable snapshot of selected filter values.
///
/// Replaced wholesale on any change; never mutated in place after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterState {
    values: BTreeMap<FilterId, String>,
}

impl FilterState {
    /// All filters at their default sentinel.
    pub fn defaults() -> Self {
        let values = FilterId::ALL
            .iter()
            .map(|id| (*id, FILTER_ALL.to_string()))
            .collect();
        Self { values }
    }

    /// Defaults with the given overrides applied.
    pub fn with_overrides(overrides: impl IntoIterator<Item = (FilterId, String)>) -> Self {
        let mut state = Self::defaults();
        for (id, value) in overrides {
            state.values.insert(id, value);
        }
        state
    }

    pub fn get(&self, id: FilterId) -> &str {
        self.values
            .get(&id)
            .map(String::as_str)
            .unwrap_or(FILTER_ALL)
    }

    pub fn is_default(&self, id: FilterId) -> bool {
        self.get(id) == FILTER_ALL
    }

    /// Filters that actually constrain records.
    pub fn non_default(&self) -> impl Iterator<Item = (FilterId, &str)> {
        self.values
            .iter()
            .filter(|(_, v)| v.as_str() != FILTER_ALL)
            .map(|(id, v)| (*id, v.as_str()))
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::defaults()
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Parameters that determine which records a query or subscription matches
/// server-side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    /// Service selector string
    pub service: String,

    /// Deployment target (namespace) the service runs in
    pub deployment_target_id: String,

    /// Server-side full-text search term (empty = none)
    pub search_term: String,

    /// Restrict to a single revision, if supported by the collector
    pub revision: Option<String>,
}

impl Selector {
    pub fn new(service: impl Into<String>, deployment_target_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            deployment_target_id: deployment_target_id.into(),
            search_term: String::new(),
            revision: None,
        }
    }

    /// Key identifying the push subscription these parameters address.
    pub fn subscription_key(&self) -> SubscriptionKey {
        SubscriptionKey(format!(
            "{}/{}?search={}&revision={}",
            self.deployment_target_id,
            self.service,
            self.search_term,
            self.revision.as_deref().unwrap_or("")
        ))
    }
}

/// Identity of a push subscription; two equal keys address the same stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Anchor/range inputs that pin a session to a historical window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub anchor: Option<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// An explicit anchor or range pins the session to the past.
    pub fn is_historical(&self) -> bool {
        self.anchor.is_some() || self.start.is_some() || self.end.is_some()
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Result of the collector discovery call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectorStatus {
    Present(Version),
    NotFound,
}

/// Oldest collector that speaks the structured record protocol.
pub fn min_structured_version() -> Version {
    Version::new(1, 2, 0)
}

/// What the detected collector supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Records carry styled segments; otherwise plain text lines
    pub structured_protocol: bool,

    /// Server honors a revision filter
    pub revision_filter: bool,
}

impl Capabilities {
    pub fn for_collector(status: &CollectorStatus) -> Self {
        match status {
            CollectorStatus::Present(version) if *version >= min_structured_version() => Self {
                structured_protocol: true,
                revision_filter: true,
            },
            _ => Self {
                structured_protocol: false,
                revision_filter: false,
            },
        }
    }

    /// Filters exposed to the caller under these capabilities.
    pub fn available_filters(&self) -> Vec<FilterId> {
        if self.revision_filter {
            FilterId::ALL.to_vec()
        } else {
            vec![FilterId::ServiceName, FilterId::OutputStream]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_state_defaults() {
        let state = FilterState::defaults();
        for id in FilterId::ALL {
            assert!(state.is_default(id));
        }
        assert_eq!(state.non_default().count(), 0);
    }

    #[test]
    fn test_filter_state_overrides() {
        let state =
            FilterState::with_overrides([(FilterId::ServiceName, "web".to_string())]);
        assert_eq!(state.get(FilterId::ServiceName), "web");
        assert!(state.is_default(FilterId::OutputStream));
        assert_eq!(state.non_default().count(), 1);
    }

    #[test]
    fn test_fallback_record_preserves_raw() {
        let record = LogRecord::fallback("not valid json {");
        assert!(record.content.is_empty());
        assert_eq!(record.raw, "not valid json {");
        assert_eq!(record.text(), "not valid json {");
    }

    #[test]
    fn test_capabilities_version_gate() {
        let old = CollectorStatus::Present(Version::new(1, 1, 9));
        let new = CollectorStatus::Present(Version::new(1, 2, 0));

        let caps = Capabilities::for_collector(&old);
        assert!(!caps.structured_protocol);
        assert_eq!(caps.available_filters().len(), 2);

        let caps = Capabilities::for_collector(&new);
        assert!(caps.structured_protocol);
        assert!(caps.revision_filter);
    }

    #[test]
    fn test_subscription_key_changes_with_inputs() {
        let a = Selector::new("web", "prod").subscription_key();
        let mut selector = Selector::new("web", "prod");
        selector.search_term = "timeout".to_string();
        let b = selector.subscription_key();
        assert_ne!(a, b);
    }
}
