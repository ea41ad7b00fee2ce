//! Test doubles shared by the engine tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use logscope_api::wire;
use logscope_api::{
    ApiError, FeedConnection, FeedHandle, LogProtocol, RangeQueryRequest, RangeQueryResponse,
};
use logscope_types::{Capabilities, LogRecord, Segment, Selector};

/// Scripted protocol: queries pop canned responses in order, feeds are
/// in-process channels the test writes lines into.
pub(crate) struct TestProtocol {
    pub responses: Mutex<VecDeque<Result<RangeQueryResponse, ApiError>>>,
    pub requests: Mutex<Vec<RangeQueryRequest>>,
    pub feeds: Mutex<Vec<FeedHandle>>,
    pub on_query: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl TestProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            feeds: Mutex::new(Vec::new()),
            on_query: Mutex::new(None),
        })
    }

    pub fn push_response(&self, response: RangeQueryResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    pub fn push_error(&self) {
        self.responses
            .lock()
            .push_back(Err(ApiError::Transport("scripted failure".to_string())));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.lock().len()
    }

    /// Sender + cancellation token of the i-th feed this protocol opened.
    pub fn feed(&self, index: usize) -> (tokio::sync::mpsc::UnboundedSender<String>, tokio_util::sync::CancellationToken) {
        let feeds = self.feeds.lock();
        let handle = &feeds[index];
        (handle.lines.clone(), handle.cancel.clone())
    }
}

#[async_trait]
impl LogProtocol for TestProtocol {
    async fn query_range(
        &self,
        request: &RangeQueryRequest,
    ) -> Result<RangeQueryResponse, ApiError> {
        self.requests.lock().push(request.clone());
        if let Some(probe) = self.on_query.lock().as_ref() {
            probe();
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(RangeQueryResponse::default()))
    }

    async fn open_feed(&self, _selector: &Selector) -> Result<FeedConnection, ApiError> {
        let (handle, connection) = FeedConnection::channel();
        self.feeds.lock().push(handle);
        Ok(connection)
    }

    fn decode_line(&self, _selector: &Selector, line: &str) -> LogRecord {
        wire::decode_structured_line(line)
    }

    fn decode_value(&self, _selector: &Selector, value: &serde_json::Value) -> LogRecord {
        wire::decode_structured_value(value)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            structured_protocol: true,
            revision_filter: true,
        }
    }
}

/// A bare record with the given filterable fields and one text segment.
pub(crate) fn record(service: &str, stream: &str, text: &str) -> LogRecord {
    let mut record = LogRecord::new(vec![Segment::plain(text)], text.to_string());
    record.service = service.to_string();
    record.stream = stream.to_string();
    record
}

/// Structured wire line for a record of the given service/stream/text.
pub(crate) fn structured_line(service: &str, stream: &str, text: &str) -> String {
    serde_json::json!({
        "service": service,
        "stream": stream,
        "revision_id": "rev-1",
        "revision_number": 1,
        "segments": [{"text": text}],
    })
    .to_string()
}

/// Structured record values for a query response, service "web" on stdout.
pub(crate) fn structured_values(texts: &[&str]) -> Vec<serde_json::Value> {
    texts
        .iter()
        .map(|text| {
            serde_json::from_str(&structured_line("web", "stdout", text))
                .expect("test record is valid json")
        })
        .collect()
}

/// A query response page with the given records and continue tokens.
pub(crate) fn page(
    logs: Vec<serde_json::Value>,
    backward: Option<&str>,
    forward: Option<&str>,
) -> RangeQueryResponse {
    RangeQueryResponse {
        logs,
        backward_continue_time: backward.map(str::to_string),
        forward_continue_time: forward.map(str::to_string),
    }
}
