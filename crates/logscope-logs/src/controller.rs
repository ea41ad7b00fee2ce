use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logscope_api::LogProtocol;
use logscope_types::{Capabilities, Direction, FilterState, LogRecord, PageCursor, Selector, TimeWindow};

use crate::buffer::SharedBuffer;
use crate::live::{ActivityProbe, LiveSubscription};
use crate::query::LogQueryClient;

/// Inactivity window after which a silent feed is forced closed.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Viewing mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewMode {
    /// Tail new records via the push subscription
    Live,
    /// Fixed historical window; no subscription is open
    PointInTime,
}

/// Inputs that define a session; any change triggers full reconciliation.
#[derive(Clone, Debug)]
pub struct SessionParams {
    pub selector: Selector,
    pub filters: FilterState,
    pub window: TimeWindow,
}

impl SessionParams {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            filters: FilterState::defaults(),
            window: TimeWindow::default(),
        }
    }
}

/// Notifications surfaced to the embedding caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Buffer re-seeded after (re)configuration
    Seeded { count: usize },
    /// New records landed in the buffer
    Appended { count: usize },
    /// No records arrived within the inactivity window; the subscription
    /// was forced closed
    NoLogsReceived,
}

/// Top-level state machine owning the buffer and coordinating teardown and
/// rebuild of the query client and subscription whenever inputs change.
pub struct ModeController {
    protocol: Arc<dyn LogProtocol>,
    params: SessionParams,
    mode: ViewMode,
    buffer: SharedBuffer,
    query: LogQueryClient,
    live: LiveSubscription,
    activity: ActivityProbe,
    watchdog: Option<CancellationToken>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl ModeController {
    /// Start a session: seed the buffer and, in live mode, open the
    /// subscription.
    pub async fn start(
        protocol: Arc<dyn LogProtocol>,
        params: SessionParams,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let buffer = SharedBuffer::new(params.filters.clone());
        let query = LogQueryClient::new(
            Arc::clone(&protocol),
            params.selector.clone(),
            params.window,
        );
        let live = LiveSubscription::new(Arc::clone(&protocol));

        let mut controller = Self {
            protocol,
            params: params.clone(),
            mode: ViewMode::Live,
            buffer,
            query,
            live,
            activity: ActivityProbe::new(),
            watchdog: None,
            events,
        };
        controller.reconcile(params).await;
        controller
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        self.protocol.capabilities()
    }

    pub fn cursor(&self) -> &PageCursor {
        self.query.cursor()
    }

    /// Shared handle to the buffer for concurrent readers.
    pub fn buffer(&self) -> SharedBuffer {
        self.buffer.clone()
    }

    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.buffer.lock().snapshot()
    }

    pub fn subscription_open(&self) -> bool {
        self.live.is_open()
    }

    /// Tear down and rebuild all resources for the new inputs.
    ///
    /// Order matters: the subscription closes and the buffer empties before
    /// the first historical query of the new session is issued.
    pub async fn reconcile(&mut self, params: SessionParams) {
        self.live.close();
        self.stop_watchdog();

        {
            let mut buffer = self.buffer.lock();
            buffer.discard();
            buffer.set_filters(params.filters.clone());
        }

        self.mode = if params.window.is_historical() {
            ViewMode::PointInTime
        } else {
            ViewMode::Live
        };
        self.query = LogQueryClient::new(
            Arc::clone(&self.protocol),
            params.selector.clone(),
            params.window,
        );

        let seeded = self.query.refresh().await;
        let count = self.buffer.lock().append(Direction::Forward, seeded);
        let _ = self.events.send(EngineEvent::Seeded { count });

        if self.mode == ViewMode::Live {
            self.activity.touch();
            self.live.open(
                params.selector.clone(),
                params.filters.clone(),
                self.buffer.sink(),
                self.activity.clone(),
                self.events.clone(),
            );
            self.start_watchdog();
        }

        self.params = params;
    }

    /// Replace the filter snapshot wholesale; forces discard + re-seed.
    pub async fn set_filters(&mut self, filters: FilterState) {
        let params = SessionParams {
            filters,
            ..self.params.clone()
        };
        self.reconcile(params).await;
    }

    /// Pin to (or clear) a historical anchor/range.
    pub async fn set_window(&mut self, window: TimeWindow) {
        let params = SessionParams {
            window,
            ..self.params.clone()
        };
        self.reconcile(params).await;
    }

    /// Change what the server selects; rebuilds query and subscription.
    pub async fn set_selector(&mut self, selector: Selector) {
        let params = SessionParams {
            selector,
            ..self.params.clone()
        };
        self.reconcile(params).await;
    }

    /// Paginate the buffer. Forward movement is a no-op while live tailing.
    pub async fn move_cursor(&mut self, direction: Direction) {
        let records = match direction {
            Direction::Backward => self.query.move_backward().await,
            Direction::Forward => {
                self.query.move_forward(self.mode == ViewMode::Live).await
            }
        };
        if records.is_empty() {
            return;
        }

        let count = self.buffer.lock().append(direction, records);
        if count > 0 {
            let _ = self.events.send(EngineEvent::Appended { count });
        }
    }

    #[cfg(test)]
    pub(crate) fn live_cancel_handle(&self) -> Option<CancellationToken> {
        self.live.cancel_handle()
    }

    /// Close everything. The controller can be restarted with `reconcile`.
    pub fn shutdown(&mut self) {
        self.live.close();
        self.stop_watchdog();
    }

    fn start_watchdog(&mut self) {
        let Some(feed_cancel) = self.live.cancel_handle() else {
            return;
        };
        let stop = CancellationToken::new();
        let activity = self.activity.clone();
        let events = self.events.clone();
        let watchdog_stop = stop.clone();

        tokio::spawn(async move {
            loop {
                let deadline = activity.last() + INACTIVITY_TIMEOUT;
                if tokio::time::Instant::now() >= deadline {
                    // Degenerate transition: force the subscription closed
                    // without leaving Live mode
                    feed_cancel.cancel();
                    let _ = events.send(EngineEvent::NoLogsReceived);
                    break;
                }
                tokio::select! {
                    _ = watchdog_stop.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
        });

        self.watchdog = Some(stop);
    }

    fn stop_watchdog(&mut self) {
        if let Some(stop) = self.watchdog.take() {
            stop.cancel();
        }
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
