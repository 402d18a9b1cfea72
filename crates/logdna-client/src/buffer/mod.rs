//! Bounded holding area for log lines between flushes.
use crate::{config::BufferMode, guard::Gates, line::LogLine};
use std::sync::Arc;

mod bounded;
mod queue;

pub use bounded::BoundedBuffer;
pub use queue::LineQueue;

/// Destination of a flushed batch.
pub trait LineSink: Send + Sync {
    /// Send one serialized batch envelope. Returns whether it was transmitted.
    fn send(&self, payload: &str) -> impl Future<Output = bool> + Send;
}

/// What a flush call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The client is not connected or not running.
    Inactive,
    /// Another flush was already running.
    Busy,
    /// Nothing to send.
    Empty,
    /// A batch of this many lines was transmitted.
    Sent(usize),
    /// A batch of this many lines could not be transmitted.
    Failed(usize),
}

/// Either buffer flavor, selected by [`BufferMode`].
#[derive(Debug)]
pub enum IngestionBuffer {
    /// See [`BoundedBuffer`].
    Bounded(BoundedBuffer),
    /// See [`LineQueue`].
    Queue(LineQueue),
}

impl IngestionBuffer {
    pub(crate) fn new(
        mode: BufferMode,
        capacity: usize,
        flush_threshold: usize,
        gates: Arc<Gates>,
    ) -> Self {
        match mode {
            BufferMode::Bounded => {
                IngestionBuffer::Bounded(BoundedBuffer::new(capacity, flush_threshold, gates))
            }
            BufferMode::Queue => {
                IngestionBuffer::Queue(LineQueue::new(capacity, flush_threshold, gates))
            }
        }
    }

    /// Append a line, evicting the oldest pending one when full.
    ///
    /// Returns `true` once the flush threshold is reached.
    pub fn add_line(&self, line: LogLine) -> bool {
        match self {
            IngestionBuffer::Bounded(buffer) => buffer.add_line(line),
            IngestionBuffer::Queue(queue) => queue.add_line(line),
        }
    }

    /// Package pending lines into one envelope and hand it to `sink`.
    pub async fn flush<S: LineSink>(&self, sink: &S) -> FlushOutcome {
        match self {
            IngestionBuffer::Bounded(buffer) => buffer.flush(sink).await,
            IngestionBuffer::Queue(queue) => queue.flush(sink).await,
        }
    }

    /// Number of lines waiting for a flush.
    pub fn len(&self) -> usize {
        match self {
            IngestionBuffer::Bounded(buffer) => buffer.len(),
            IngestionBuffer::Queue(queue) => queue.len(),
        }
    }

    /// Whether no lines are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The flavor of this buffer.
    pub fn mode(&self) -> BufferMode {
        match self {
            IngestionBuffer::Bounded(_) => BufferMode::Bounded,
            IngestionBuffer::Queue(_) => BufferMode::Queue,
        }
    }
}
