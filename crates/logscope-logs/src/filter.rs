use logscope_types::{FilterId, FilterState, LogRecord, PREDEPLOY_STREAM};

/// Client-side predicate evaluation over structured records.
///
/// Pure and deterministic; safe to call from both producers.
pub struct FilterEngine;

impl FilterEngine {
    /// Records that pass every non-default filter in `state`, in order.
    pub fn filter(records: Vec<LogRecord>, state: &FilterState) -> Vec<LogRecord> {
        records
            .into_iter()
            .filter(|record| Self::matches(record, state))
            .collect()
    }

    /// A record is retained iff every non-default filter equals its field
    /// exactly (case-sensitive). Pre-deploy records are excluded unless the
    /// stream filter explicitly selects them.
    pub fn matches(record: &LogRecord, state: &FilterState) -> bool {
        if record.is_predeploy() && state.get(FilterId::OutputStream) != PREDEPLOY_STREAM {
            return false;
        }
        state
            .non_default()
            .all(|(id, value)| id.field(record) == value)
    }
}
