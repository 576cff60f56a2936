//! Terminal rendering of transfer events.

use {
    battlink::{Completion, EventSink, Progress},
    console::style,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
};

/// Event sink drawing a progress bar and status lines on stderr.
pub(crate) struct TerminalSink {
    pb: ProgressBar,
    quiet: bool,
}

impl TerminalSink {
    /// `quiet` suppresses all output; `fancy` enables the animated bar.
    pub(crate) fn new(quiet: bool, fancy: bool) -> Self {
        let pb = if quiet || !fancy {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(100);
            #[allow(clippy::unwrap_used)] // Static template string
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            pb.set_draw_target(ProgressDrawTarget::stderr());
            pb
        };
        Self { pb, quiet }
    }
}

impl EventSink for TerminalSink {
    fn on_status(&mut self, message: &str) {
        if self.quiet {
            return;
        }
        self.pb
            .suspend(|| eprintln!("{} {message}", style("•").dim()));
        self.pb
            .set_message(message.to_string());
    }

    fn on_progress(&mut self, progress: Progress) {
        self.pb
            .set_position(u64::from(progress.percent));
    }

    fn on_complete(&mut self, _completion: &Completion) {
        self.pb
            .finish_and_clear();
    }

    fn on_error(&mut self, _message: &str) {
        // The error itself is printed once by main.
        self.pb
            .abandon();
    }
}
