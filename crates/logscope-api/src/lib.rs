//! Log service transports for logscope
//!
//! This crate provides the range-query client, the push-subscription feed,
//! collector discovery, and version-gated protocol selection.

mod client;
mod feed;
mod protocol;
pub mod wire;

pub use client::{ApiClient, ApiError};
pub use feed::{FeedConnection, FeedHandle};
pub use protocol::{LogProtocol, PlainProtocol, StructuredProtocol, select_protocol};
pub use wire::{RangeQueryRequest, RangeQueryResponse};
