//! Log retrieval and streaming engine for logscope
//!
//! This crate unifies live tailing and historical windowed queries into a
//! single bounded, filterable, ordered buffer behind a mode controller.

mod buffer;
mod controller;
mod filter;
mod live;
mod query;

#[cfg(test)]
pub(crate) mod testutil;

pub use buffer::{BufferSink, LogBuffer, SharedBuffer};
pub use controller::{EngineEvent, ModeController, SessionParams, ViewMode};
pub use filter::FilterEngine;
pub use live::{ActivityProbe, LiveSubscription};
pub use query::LogQueryClient;

// Re-export types used in our public API
pub use logscope_types::{
    Direction, FilterId, FilterState, LogRecord, PageCursor, Selector, TimeWindow,
};
