use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use logscope_api::{LogProtocol, RangeQueryRequest};
use logscope_types::{
    CursorToken, Direction, LogRecord, PageCursor, QUERY_LIMIT, QUERY_WINDOW_SECS, Selector,
    TimeWindow,
};

/// Issues point-in-time range queries and tracks pagination cursors.
///
/// Failures never escape: a failed query yields an empty page with null
/// cursors.
pub struct LogQueryClient {
    protocol: Arc<dyn LogProtocol>,
    selector: Selector,
    window: TimeWindow,
    cursor: PageCursor,
    limit: usize,
}

/// One decoded response page, still in service order (backward queries
/// return newest first).
struct Page {
    records: Vec<LogRecord>,
    raw_count: usize,
    previous: Option<CursorToken>,
    next: Option<CursorToken>,
}

impl LogQueryClient {
    pub fn new(protocol: Arc<dyn LogProtocol>, selector: Selector, window: TimeWindow) -> Self {
        Self {
            protocol,
            selector,
            window,
            cursor: PageCursor::default(),
            limit: QUERY_LIMIT,
        }
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    fn window_width() -> Duration {
        Duration::seconds(QUERY_WINDOW_SECS)
    }

    /// Seed the newest `limit` records ending at the anchor (or now) via a
    /// backward query, returned in ascending order.
    pub async fn refresh(&mut self) -> Vec<LogRecord> {
        let end = self
            .window
            .anchor
            .or(self.window.end)
            .unwrap_or_else(Utc::now);
        let start = self.window.start.unwrap_or(end - Self::window_width());

        let page = self.run(start, end, Direction::Backward).await;

        // A short page means history is exhausted, whatever token the
        // service returned
        let previous = if page.raw_count < self.limit {
            None
        } else {
            page.previous
        };
        self.cursor = PageCursor {
            previous,
            next: page.next,
        };

        let mut records = page.records;
        records.reverse();
        records
    }

    /// Fetch the next older window ending at the previous cursor, dropping
    /// the boundary duplicate. Returns records in ascending order, ready to
    /// prepend.
    pub async fn move_backward(&mut self) -> Vec<LogRecord> {
        let had_cursor = self.cursor.previous.is_some();
        let end = self
            .cursor
            .previous
            .as_ref()
            .map(parse_token)
            .unwrap_or_else(Utc::now);
        let start = end - Self::window_width();

        let page = self.run(start, end, Direction::Backward).await;

        let mut records = page.records;
        if had_cursor && !records.is_empty() {
            // Boundary record: the newest of this batch is the oldest of the
            // previous one
            records.remove(0);
        }

        self.cursor.previous = if page.raw_count < self.limit {
            None
        } else {
            page.previous
        };

        records.reverse();
        records
    }

    /// Fetch newer records from the next cursor (or the anchor) up to now.
    /// A no-op while live tailing: the subscription already delivers the
    /// head of the stream.
    pub async fn move_forward(&mut self, live: bool) -> Vec<LogRecord> {
        if live {
            return Vec::new();
        }

        let had_cursor = self.cursor.next.is_some();
        let start = self
            .cursor
            .next
            .as_ref()
            .map(parse_token)
            .or(self.window.anchor)
            .or(self.window.end)
            .unwrap_or_else(Utc::now);

        let page = self.run(start, Utc::now(), Direction::Forward).await;

        let mut records = page.records;
        if had_cursor && !records.is_empty() {
            records.remove(0);
        }
        self.cursor.next = page.next;
        records
    }

    async fn run(&self, start: DateTime<Utc>, end: DateTime<Utc>, direction: Direction) -> Page {
        let request =
            RangeQueryRequest::for_selector(&self.selector, start, end, direction, self.limit);

        match self.protocol.query_range(&request).await {
            Ok(response) => {
                let raw_count = response.logs.len();
                let records = response
                    .logs
                    .iter()
                    .map(|value| self.protocol.decode_value(&self.selector, value))
                    .collect();
                Page {
                    records,
                    raw_count,
                    previous: response.backward_continue_time.map(CursorToken::new),
                    next: response.forward_continue_time.map(CursorToken::new),
                }
            }
            Err(err) => {
                tracing::warn!(%err, "range query failed");
                Page {
                    records: Vec::new(),
                    raw_count: 0,
                    previous: None,
                    next: None,
                }
            }
        }
    }
}

fn parse_token(token: &CursorToken) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(token.as_str())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!("unparseable continue token, falling back to now");
            Utc::now()
        })
}
