//! Status, progress and error notifications.
//!
//! The protocol session and the transfer manager report what they are doing
//! through an [`EventSink`]. A terminal front end draws a progress bar from
//! it, a GUI binds it to widgets, tests record it into a `Vec<Event>`.

use log::{debug, error, info};

/// Transfer progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Percentage, 0-100, truncated.
    pub percent: u8,
    /// Bytes transferred so far.
    pub bytes: u64,
    /// Total bytes expected.
    pub total: u64,
}

impl Progress {
    /// Compute a progress snapshot; an empty transfer counts as complete.
    #[allow(clippy::cast_possible_truncation)] // clamped to 100
    pub fn new(bytes: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (bytes.saturating_mul(100) / total).min(100) as u8
        };
        Self {
            percent,
            bytes,
            total,
        }
    }
}

/// How an operation ended successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// All announced files were received.
    Download {
        /// Number of files saved.
        files: usize,
    },
    /// A plan configuration was uploaded.
    Upload {
        /// Plan slot written.
        plan: u8,
    },
}

/// Receiver of transfer notifications.
///
/// Every method has an empty default so sinks only implement what they use.
pub trait EventSink {
    /// A human readable status line.
    fn on_status(&mut self, _message: &str) {}

    /// Progress of the current file.
    fn on_progress(&mut self, _progress: Progress) {}

    /// An operation finished successfully.
    fn on_complete(&mut self, _completion: &Completion) {}

    /// An operation failed.
    fn on_error(&mut self, _message: &str) {}
}

/// Recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// See [`EventSink::on_status`].
    Status(String),
    /// See [`EventSink::on_progress`].
    Progress(Progress),
    /// See [`EventSink::on_complete`].
    Complete(Completion),
    /// See [`EventSink::on_error`].
    Error(String),
}

impl EventSink for Vec<Event> {
    fn on_status(&mut self, message: &str) {
        self.push(Event::Status(message.to_string()));
    }

    fn on_progress(&mut self, progress: Progress) {
        self.push(Event::Progress(progress));
    }

    fn on_complete(&mut self, completion: &Completion) {
        self.push(Event::Complete(completion.clone()));
    }

    fn on_error(&mut self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }
}

/// Forwards notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_status(&mut self, message: &str) {
        info!("{message}");
    }

    fn on_progress(&mut self, progress: Progress) {
        debug!(
            "Progress: {}% ({}/{} bytes)",
            progress.percent, progress.bytes, progress.total
        );
    }

    fn on_complete(&mut self, completion: &Completion) {
        match completion {
            Completion::Download { files } => info!("Complete: {files} files received"),
            Completion::Upload { plan } => info!("Plan {plan} updated"),
        }
    }

    fn on_error(&mut self, message: &str) {
        error!("{message}");
    }
}
