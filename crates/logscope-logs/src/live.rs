use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use logscope_api::LogProtocol;
use logscope_types::{FilterState, LogRecord, MAX_BUFFER_LOGS, Selector, SubscriptionKey};

use crate::buffer::BufferSink;
use crate::controller::EngineEvent;
use crate::filter::FilterEngine;

/// How often buffered pushes drain into the buffer.
const FLUSH_INTERVAL: Duration = Duration::from_secs(3);

/// One-shot flush shortly after open; bounds first-paint latency on
/// low-volume streams.
const FIRST_FLUSH_DELAY: Duration = Duration::from_millis(500);

/// Shared last-activity clock read by the inactivity watchdog.
#[derive(Clone)]
pub struct ActivityProbe(Arc<Mutex<Instant>>);

impl ActivityProbe {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn touch(&self) {
        *self.0.lock() = Instant::now();
    }

    pub fn last(&self) -> Instant {
        *self.0.lock()
    }
}

impl Default for ActivityProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds at most one push subscription at a time.
///
/// Incoming lines are decoded independently, filtered, and staged in a
/// pending queue that drains into the sink when it reaches
/// `MAX_BUFFER_LOGS`, on a periodic timer, or once shortly after open.
pub struct LiveSubscription {
    protocol: Arc<dyn LogProtocol>,
    active: Option<ActiveFeed>,
}

struct ActiveFeed {
    key: SubscriptionKey,
    cancel: CancellationToken,
}

impl LiveSubscription {
    pub fn new(protocol: Arc<dyn LogProtocol>) -> Self {
        Self {
            protocol,
            active: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|feed| !feed.cancel.is_cancelled())
    }

    pub fn key(&self) -> Option<&SubscriptionKey> {
        self.active.as_ref().map(|feed| &feed.key)
    }

    /// Cancellation handle for the open feed, if any. The inactivity
    /// watchdog uses this to force closure without reaching in here.
    pub fn cancel_handle(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(|feed| feed.cancel.clone())
    }

    /// Open a subscription for the selector, implicitly closing any
    /// previous one first.
    pub fn open(
        &mut self,
        selector: Selector,
        filters: FilterState,
        sink: BufferSink,
        activity: ActivityProbe,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) {
        self.close();

        let key = selector.subscription_key();
        let cancel = CancellationToken::new();
        let protocol = Arc::clone(&self.protocol);
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut connection = match protocol.open_feed(&selector).await {
                Ok(connection) => connection,
                Err(err) => {
                    // Silent failure: the inactivity watchdog surfaces it
                    tracing::debug!(%err, "failed to open push feed");
                    return;
                }
            };
            let feed_cancel = connection.cancel_token();

            let mut pending: Vec<LogRecord> = Vec::new();
            let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);
            flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let first_flush = tokio::time::sleep(FIRST_FLUSH_DELAY);
            tokio::pin!(first_flush);
            let mut first_flush_done = false;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,

                    _ = &mut first_flush, if !first_flush_done => {
                        first_flush_done = true;
                        if !flush(&mut pending, &sink, &events) {
                            break;
                        }
                    }

                    _ = flush_tick.tick() => {
                        if !flush(&mut pending, &sink, &events) {
                            break;
                        }
                    }

                    line = connection.next_line() => {
                        match line {
                            Some(line) => {
                                activity.touch();
                                let record = protocol.decode_line(&selector, &line);
                                if FilterEngine::matches(&record, &filters) {
                                    pending.push(record);
                                    if pending.len() >= MAX_BUFFER_LOGS
                                        && !flush(&mut pending, &sink, &events)
                                    {
                                        break;
                                    }
                                }
                            }
                            // Server closed without a reason code; the
                            // inactivity timeout surfaces it
                            None => break,
                        }
                    }
                }
            }

            // Teardown: timers die with the task, pending is dropped
            task_cancel.cancel();
            feed_cancel.cancel();
        });

        self.active = Some(ActiveFeed { key, cancel });
    }

    /// Close the open subscription, cancelling its timers and discarding
    /// any unflushed pending records. Idempotent.
    pub fn close(&mut self) {
        if let Some(feed) = self.active.take() {
            feed.cancel.cancel();
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drain pending into the sink; false when the sink went stale.
fn flush(
    pending: &mut Vec<LogRecord>,
    sink: &BufferSink,
    events: &mpsc::UnboundedSender<EngineEvent>,
) -> bool {
    if pending.is_empty() {
        return true;
    }
    match sink.push(std::mem::take(pending)) {
        Some(count) => {
            if count > 0 {
                let _ = events.send(EngineEvent::Appended { count });
            }
            true
        }
        None => {
            tracing::debug!("dropping pushed records for a torn-down buffer");
            false
        }
    }
}
