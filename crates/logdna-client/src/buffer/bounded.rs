use super::{FlushOutcome, LineSink};
use crate::{
    guard::{Gates, Operation},
    line::{BatchMessage, LogLine},
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

/// Lock-protected, capacity-bounded list of pending lines.
///
/// A flush moves the pending lines into an in-flight batch. The batch is
/// discarded only after a confirmed send; otherwise it stays staged and goes
/// out again, ahead of newer lines, on the next flush.
#[derive(Debug)]
pub struct BoundedBuffer {
    pending: Mutex<VecDeque<LogLine>>,
    in_flight: Mutex<Vec<LogLine>>,
    capacity: usize,
    flush_threshold: usize,
    gates: Arc<Gates>,
}

impl BoundedBuffer {
    pub(crate) fn new(capacity: usize, flush_threshold: usize, gates: Arc<Gates>) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            in_flight: Mutex::new(Vec::new()),
            capacity,
            flush_threshold: flush_threshold.clamp(1, capacity),
            gates,
        }
    }

    /// Append a line; returns `true` when the flush threshold is reached.
    pub fn add_line(&self, line: LogLine) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.len() + 1 > self.capacity {
            tracing::trace!("buffer full, evicting oldest line");
            pending.pop_front();
        }
        pending.push_back(line);
        pending.len() >= self.flush_threshold
    }

    /// Lines waiting for the next flush, oldest first.
    pub fn pending(&self) -> Vec<LogLine> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Lines kept from a failed send.
    pub fn in_flight(&self) -> Vec<LogLine> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of pending lines.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stage pending lines and send them together with any retained batch.
    pub async fn flush<S: LineSink>(&self, sink: &S) -> FlushOutcome {
        let Some(_guard) = self.gates.enter(Operation::Flush) else {
            return FlushOutcome::Busy;
        };

        let (payload, count) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.is_empty() && in_flight.is_empty() {
                return FlushOutcome::Empty;
            }
            in_flight.extend(pending.drain(..));
            if in_flight.len() > self.capacity {
                let excess = in_flight.len() - self.capacity;
                tracing::trace!(excess, "staged batch over capacity, dropping oldest lines");
                in_flight.drain(..excess);
            }
            (BatchMessage::new(&in_flight).to_json(), in_flight.len())
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(err = %e, "failed to encode batch");
                return FlushOutcome::Failed(count);
            }
        };

        if sink.send(&payload).await {
            self.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            FlushOutcome::Sent(count)
        } else {
            tracing::debug!(count, "send failed, keeping batch for the next flush");
            FlushOutcome::Failed(count)
        }
    }
}
