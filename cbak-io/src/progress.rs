//! Progress channel between a running task and its observer
//!
//! Tasks post [`ProgressEvent`]s through a [`ProgressSender`]; the observer
//! drains the matching receiver on its own thread. Posting never blocks and
//! never fails: once the observer hangs up, events are dropped silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Status notification emitted by the streaming engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Bytes consumed from the backup source so far.
    BytesProgress {
        /// Bytes consumed.
        position: u64,
        /// Known source length.
        total: u64,
    },
    /// Records processed so far during export.
    RecordProgress {
        /// Records processed (written or skipped).
        position: u64,
        /// Records in the store when the export started.
        total: u64,
    },
    /// A record was restored into the destination store.
    RecordNamed {
        /// Display label of the record.
        name: String,
    },
    /// A failure the observer should surface.
    Error {
        /// Human-readable description.
        message: String,
    },
}

impl ProgressEvent {
    /// Whether this is a positional event that reached its total.
    pub fn is_complete(&self) -> bool {
        match self {
            ProgressEvent::BytesProgress { position, total }
            | ProgressEvent::RecordProgress { position, total } => position >= total,
            _ => false,
        }
    }

    /// Position carried by positional events.
    pub fn position(&self) -> Option<u64> {
        match self {
            ProgressEvent::BytesProgress { position, .. }
            | ProgressEvent::RecordProgress { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// Receiving half of a progress channel.
pub type ProgressReceiver = Receiver<ProgressEvent>;

/// Sending half of a progress channel.
///
/// Cloning is cheap; all clones feed the same FIFO channel.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    inner: Option<Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender that discards every event.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Post an event without blocking.
    pub fn post(&self, event: ProgressEvent) {
        if let Some(tx) = &self.inner {
            // A closed channel means nobody is watching any more.
            let _ = tx.send(event);
        }
    }

    /// Post an [`ProgressEvent::Error`].
    pub fn error(&self, message: impl Into<String>) {
        self.post(ProgressEvent::Error {
            message: message.into(),
        });
    }
}

/// Create a connected unbounded progress channel.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel();
    (ProgressSender { inner: Some(tx) }, rx)
}

/// Cooperative stop request shared between a task and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the "keep running" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
