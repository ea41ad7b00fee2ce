use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use logscope_types::{Direction, FilterState, LogRecord, MAX_BUFFER_LOGS, MAX_LOGS};

use crate::filter::FilterEngine;

/// Bounded, ordered collection of records passing the active filters.
///
/// Records are unique by sequence number and monotonically increasing in
/// display order. Every mutation funnels through `append`.
pub struct LogBuffer {
    records: VecDeque<LogRecord>,
    filters: FilterState,
    generation: u64,
}

impl LogBuffer {
    pub fn new(filters: FilterState) -> Self {
        Self {
            records: VecDeque::new(),
            filters,
            generation: 0,
        }
    }

    /// Insert a batch at the end (forward) or front (backward), assigning
    /// sequence numbers and trimming from the opposite end on overflow.
    ///
    /// The batch passes through the filter engine first; an empty surviving
    /// batch is a no-op. Returns the number of records admitted.
    pub fn append(&mut self, direction: Direction, batch: Vec<LogRecord>) -> usize {
        let mut batch = FilterEngine::filter(batch, &self.filters);
        if batch.is_empty() {
            return 0;
        }
        let admitted = batch.len();

        match direction {
            Direction::Forward => {
                let mut next = self.records.back().map(|r| r.sequence + 1).unwrap_or(0);
                for record in &mut batch {
                    record.sequence = next;
                    next += 1;
                }
                self.records.extend(batch);

                if self.records.len() > MAX_LOGS {
                    let remove = admitted.min(MAX_BUFFER_LOGS).min(self.records.len());
                    self.records.drain(..remove);
                }
            }
            Direction::Backward => {
                // Existing records shift up to make sequence room below
                for record in self.records.iter_mut() {
                    record.sequence += admitted as u64;
                }
                for (i, record) in batch.iter_mut().enumerate() {
                    record.sequence = i as u64;
                }
                for record in batch.into_iter().rev() {
                    self.records.push_front(record);
                }

                if self.records.len() > MAX_LOGS {
                    let remove = admitted.min(MAX_BUFFER_LOGS).min(self.records.len());
                    self.records.truncate(self.records.len() - remove);
                }
            }
        }

        admitted
    }

    /// Drop all records and invalidate outstanding sinks.
    pub fn discard(&mut self) {
        self.records.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Swap in a new filter snapshot. Callers discard first; the buffer
    /// never re-filters its contents in place.
    pub fn set_filters(&mut self, filters: FilterState) {
        self.filters = filters;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cloned view of the buffer contents in display order.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }
}

/// Cloneable handle to the controller-owned buffer.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<LogBuffer>>,
}

impl SharedBuffer {
    pub fn new(filters: FilterState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogBuffer::new(filters))),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        self.inner.lock()
    }

    /// Write handle pinned to the buffer's current generation.
    pub fn sink(&self) -> BufferSink {
        let generation = self.lock().generation();
        BufferSink {
            buffer: self.clone(),
            generation,
        }
    }
}

/// Generation-pinned write handle handed to a producer.
///
/// A push from a torn-down session sees a newer generation and is dropped,
/// so late-arriving writes never land in a fresh buffer.
#[derive(Clone)]
pub struct BufferSink {
    buffer: SharedBuffer,
    generation: u64,
}

impl BufferSink {
    /// Forward-append the batch. `None` means the sink is stale and the
    /// records were dropped.
    pub fn push(&self, batch: Vec<LogRecord>) -> Option<usize> {
        let mut buffer = self.buffer.lock();
        if buffer.generation() != self.generation {
            return None;
        }
        Some(buffer.append(Direction::Forward, batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::record;
    use logscope_types::{FilterId, PREDEPLOY_STREAM};

    fn batch(n: usize) -> Vec<LogRecord> {
        (0..n).map(|i| record("web", "stdout", &format!("r{i}"))).collect()
    }

    fn full_buffer() -> LogBuffer {
        let mut buffer = LogBuffer::new(FilterState::defaults());
        buffer.append(Direction::Forward, batch(MAX_LOGS));
        assert_eq!(buffer.len(), MAX_LOGS);
        buffer
    }

    #[test]
    fn test_forward_append_assigns_continuing_sequences() {
        let mut buffer = LogBuffer::new(FilterState::defaults());
        buffer.append(Direction::Forward, batch(3));
        buffer.append(Direction::Forward, batch(2));

        let sequences: Vec<u64> = buffer.records().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_forward_overflow_trims_front_by_batch_size() {
        let mut buffer = full_buffer();
        buffer.append(Direction::Forward, batch(300));

        assert_eq!(buffer.len(), MAX_LOGS);
        // The 300 oldest records were dropped
        assert_eq!(buffer.records().next().unwrap().sequence, 300);
    }

    #[test]
    fn test_forward_overflow_trim_is_capped() {
        let mut buffer = full_buffer();
        buffer.append(Direction::Forward, batch(1500));

        // Removal never exceeds MAX_BUFFER_LOGS per append
        assert_eq!(buffer.len(), MAX_LOGS + 1500 - MAX_BUFFER_LOGS);
    }

    #[test]
    fn test_backward_append_renumbers_existing() {
        let mut buffer = LogBuffer::new(FilterState::defaults());
        buffer.append(Direction::Forward, batch(3));
        buffer.append(Direction::Backward, batch(2));

        let sequences: Vec<u64> = buffer.records().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        // The prepended records sit first in display order
        assert_eq!(buffer.records().next().unwrap().text(), "r0");
    }

    #[test]
    fn test_backward_overflow_trims_back() {
        let mut buffer = full_buffer();
        let newest_before = buffer.records().last().unwrap().text();
        buffer.append(Direction::Backward, batch(200));

        assert_eq!(buffer.len(), MAX_LOGS);
        let newest_after = buffer.records().last().unwrap().text();
        assert_ne!(newest_before, newest_after);
    }

    #[test]
    fn test_empty_batch_is_a_noop() {
        let mut buffer = LogBuffer::new(FilterState::defaults());
        buffer.append(Direction::Forward, batch(2));
        let before = buffer.snapshot();

        assert_eq!(buffer.append(Direction::Forward, Vec::new()), 0);
        assert_eq!(buffer.append(Direction::Backward, Vec::new()), 0);
        assert_eq!(buffer.snapshot(), before);
    }

    #[test]
    fn test_append_applies_filters_before_admission() {
        let filters =
            FilterState::with_overrides([(FilterId::ServiceName, "web".to_string())]);
        let mut buffer = LogBuffer::new(filters);

        let admitted = buffer.append(
            Direction::Forward,
            vec![
                record("web", "stdout", "keep"),
                record("worker", "stdout", "drop"),
                record("web", PREDEPLOY_STREAM, "drop too"),
            ],
        );

        assert_eq!(admitted, 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.records().next().unwrap().text(), "keep");
    }

    #[test]
    fn test_discard_invalidates_sinks() {
        let shared = SharedBuffer::new(FilterState::defaults());
        let sink = shared.sink();

        assert_eq!(sink.push(batch(2)), Some(2));

        shared.lock().discard();
        assert_eq!(sink.push(batch(2)), None);
        assert!(shared.lock().is_empty());

        // A sink minted after the discard works again
        assert_eq!(shared.sink().push(batch(1)), Some(1));
    }
}
