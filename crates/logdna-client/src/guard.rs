//! Non-blocking per-operation gates.
//!
//! A gate admits at most one holder per [`Operation`]. Callers that fail to
//! enter skip the operation entirely; nothing queues behind a held gate.
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Operations that may only have one execution in flight per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Packaging and sending buffered lines.
    Flush,
    /// Opening the streaming connection.
    Connect,
    /// Backoff-and-connect loop of the streaming transport.
    Reconnect,
    /// Running the handshake and mutating the resolved session.
    Authenticate,
}

impl Operation {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Operation::Flush => 0,
            Operation::Connect => 1,
            Operation::Reconnect => 2,
            Operation::Authenticate => 3,
        }
    }

    /// Stable name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Flush => "flush",
            Operation::Connect => "connect",
            Operation::Reconnect => "reconnect",
            Operation::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of try-locks, one per [`Operation`].
#[derive(Debug, Default)]
pub struct Gates {
    held: [AtomicBool; Operation::COUNT],
}

/// Holds a gate open until dropped.
#[must_use = "the gate is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard {
    gates: Arc<Gates>,
    op: Operation,
}

impl Gates {
    /// Create a set with every gate open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to become the sole holder of `op`.
    ///
    /// Returns `false` when another caller already holds it. A successful
    /// call must be paired with [`Gates::leave`].
    pub fn try_enter(&self, op: Operation) -> bool {
        self.held[op.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release `op`, re-arming the gate.
    pub fn leave(&self, op: Operation) {
        self.held[op.index()].store(false, Ordering::Release);
    }

    /// Whether someone currently holds `op`.
    pub fn is_held(&self, op: Operation) -> bool {
        self.held[op.index()].load(Ordering::Acquire)
    }

    /// Scoped variant of [`Gates::try_enter`]; the gate is left when the
    /// returned guard drops, on every exit path.
    pub fn enter(self: &Arc<Self>, op: Operation) -> Option<GateGuard> {
        if self.try_enter(op) {
            Some(GateGuard {
                gates: self.clone(),
                op,
            })
        } else {
            tracing::trace!(operation = %op, "gate busy, skipping");
            None
        }
    }
}

impl GateGuard {
    /// The operation this guard holds.
    pub fn operation(&self) -> Operation {
        self.op
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gates.leave(self.op);
    }
}
