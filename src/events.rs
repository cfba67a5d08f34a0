//! Progress events of a watermark removal run, and where they go.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One step of a removal run.
///
/// A run emits `Start` once, then one `Success` or `Error` per dispositioned
/// file in completion order, then `End` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RemoveWatermarkEvent {
    /// Processing is about to begin.
    #[serde(rename_all = "camelCase")]
    Start {
        /// The manga directory being processed.
        dir_path: PathBuf,
        /// Number of files the run will try to process.
        total: u32,
    },

    /// A file was recovered and written.
    #[serde(rename_all = "camelCase")]
    Success {
        /// The manga directory being processed.
        dir_path: PathBuf,
        /// The source file.
        img_path: PathBuf,
        /// Files dispositioned so far, this one included.
        current: u32,
    },

    /// A file could not be processed.
    #[serde(rename_all = "camelCase")]
    Error {
        /// The manga directory being processed.
        dir_path: PathBuf,
        /// The source file.
        img_path: PathBuf,
        /// Why it failed.
        err_msg: String,
    },

    /// Every file has been dispositioned, or the run was cancelled.
    #[serde(rename_all = "camelCase")]
    End {
        /// The manga directory that was processed.
        dir_path: PathBuf,
    },
}

impl RemoveWatermarkEvent {
    /// Event name on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RemoveWatermarkEvent::Start { .. } => "remove-watermark-start-event",
            RemoveWatermarkEvent::Success { .. } => "remove-watermark-success-event",
            RemoveWatermarkEvent::Error { .. } => "remove-watermark-error-event",
            RemoveWatermarkEvent::End { .. } => "remove-watermark-end-event",
        }
    }
}

/// Receiver of [`RemoveWatermarkEvent`]s.
///
/// Events are delivered from a single thread, in emission order.
pub trait EventSink {
    /// Deliver one event. Delivery is fire-and-forget.
    fn emit(&self, event: RemoveWatermarkEvent);
}

impl<F> EventSink for F
where
    F: Fn(RemoveWatermarkEvent),
{
    fn emit(&self, event: RemoveWatermarkEvent) {
        self(event);
    }
}

/// Shared flag asking a removal run to stop starting new files.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Files already in progress still finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
