use super::{FlushOutcome, LineSink};
use crate::{
    guard::{Gates, Operation},
    line::{BatchMessage, LogLine},
};
use async_channel::{Receiver, Sender};
use std::sync::Arc;

/// Multi-producer queue drained by a fixed-size snapshot on every flush.
///
/// The number of lines to drain is read before draining starts, so lines
/// enqueued while a flush is running wait for the next one. A batch that
/// fails to send is not retained.
#[derive(Debug)]
pub struct LineQueue {
    producer: Sender<LogLine>,
    consumer: Receiver<LogLine>,
    flush_threshold: usize,
    gates: Arc<Gates>,
}

impl LineQueue {
    pub(crate) fn new(capacity: usize, flush_threshold: usize, gates: Arc<Gates>) -> Self {
        let capacity = capacity.max(1);
        let (producer, consumer) = async_channel::bounded(capacity);
        Self {
            producer,
            consumer,
            flush_threshold: flush_threshold.clamp(1, capacity),
            gates,
        }
    }

    /// Enqueue a line; returns `true` when the flush threshold is reached.
    pub fn add_line(&self, line: LogLine) -> bool {
        match self.producer.force_send(line) {
            Ok(Some(_evicted)) => tracing::trace!("queue full, evicted oldest line"),
            Ok(None) => {}
            Err(e) => tracing::error!("line queue closed: {e}"),
        }
        self.producer.len() >= self.flush_threshold
    }

    /// Number of queued lines.
    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Drain a snapshot of the queue into one batch and send it.
    pub async fn flush<S: LineSink>(&self, sink: &S) -> FlushOutcome {
        let Some(_guard) = self.gates.enter(Operation::Flush) else {
            return FlushOutcome::Busy;
        };

        let snapshot = self.consumer.len();
        let mut lines = Vec::with_capacity(snapshot);
        for _ in 0..snapshot {
            match self.consumer.try_recv() {
                Ok(line) => lines.push(line),
                Err(_) => break,
            }
        }
        if lines.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = lines.len();
        let payload = match BatchMessage::new(&lines).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(err = %e, "failed to encode batch");
                return FlushOutcome::Failed(count);
            }
        };

        if sink.send(&payload).await {
            FlushOutcome::Sent(count)
        } else {
            tracing::debug!(count, "send failed, batch dropped");
            FlushOutcome::Failed(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::testing::{RecordingSink, contents};
    use std::time::Duration;

    fn queue(capacity: usize, threshold: usize) -> Arc<LineQueue> {
        Arc::new(LineQueue::new(capacity, threshold, Arc::new(Gates::new())))
    }

    #[tokio::test]
    async fn full_queue_drops_oldest() {
        let queue = queue(3, 100);
        let sink = RecordingSink::default();
        for content in ["A", "B", "C", "D"] {
            queue.add_line(LogLine::new("app", content));
            assert!(queue.len() <= 3);
        }
        assert_eq!(queue.flush(&sink).await, FlushOutcome::Sent(3));
        assert_eq!(contents(&sink.batch(0)), ["B", "C", "D"]);
    }

    #[tokio::test]
    async fn lines_added_during_flush_wait_for_next_one() {
        struct Reentrant {
            queue: Arc<LineQueue>,
            inner: RecordingSink,
        }

        impl LineSink for Reentrant {
            async fn send(&self, payload: &str) -> bool {
                self.queue.add_line(LogLine::new("app", "late"));
                self.inner.send(payload).await
            }
        }

        let queue = queue(10, 100);
        queue.add_line(LogLine::new("app", "early-1"));
        queue.add_line(LogLine::new("app", "early-2"));
        let sink = Reentrant {
            queue: queue.clone(),
            inner: RecordingSink::default(),
        };

        assert_eq!(queue.flush(&sink).await, FlushOutcome::Sent(2));
        assert_eq!(contents(&sink.inner.batch(0)), ["early-1", "early-2"]);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.flush(&sink).await, FlushOutcome::Sent(1));
        assert_eq!(contents(&sink.inner.batch(1)), ["late"]);
    }

    #[tokio::test]
    async fn failed_batch_is_not_retained() {
        let queue = queue(10, 100);
        let sink = RecordingSink::default();
        sink.fail(true);
        queue.add_line(LogLine::new("app", "lost"));
        assert_eq!(queue.flush(&sink).await, FlushOutcome::Failed(1));
        assert_eq!(queue.flush(&sink).await, FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn concurrent_flushes_run_once() {
        let queue = queue(10, 100);
        let sink = RecordingSink::slow(Duration::from_millis(50));
        queue.add_line(LogLine::new("app", "x"));
        let (a, b) = tokio::join!(queue.flush(&sink), queue.flush(&sink));
        assert!(matches!(
            (a, b),
            (FlushOutcome::Sent(1), FlushOutcome::Busy) | (FlushOutcome::Busy, FlushOutcome::Sent(1))
        ));
        assert_eq!(sink.calls(), 1);
    }

    #[test]
    fn threshold_signals_flush() {
        let queue = queue(10, 2);
        assert!(!queue.add_line(LogLine::new("app", "1")));
        assert!(queue.add_line(LogLine::new("app", "2")));
    }
}
