//! Progress reporting using indicatif.
//!
//! [`Progress`] is an event [`Subscriber`]: registered on the run's
//! [`EventBus`](crate::events::EventBus), it shows the current pipeline
//! step next to a spinner and counts skipped entries. It never prints
//! results; those go to stdout through [`crate::output`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::events::{Event, EventLevel, Subscriber};

/// Spinner driven by pipeline events.
pub struct Progress {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("step", &self.bar.position())
            .field("skipped", &self.skipped())
            .finish()
    }
}

impl Progress {
    /// Create a spinner on stderr.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message("Preparing");
        Self::with_bar(bar)
    }

    /// Create a reporter that draws nothing.
    #[must_use]
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            skipped: AtomicUsize::new(0),
        }
    }

    /// Entries reported as skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Steps completed so far.
    #[must_use]
    pub fn completed_steps(&self) -> u64 {
        self.bar.position()
    }

    /// Current spinner message.
    #[must_use]
    pub fn message(&self) -> String {
        self.bar.message()
    }

    /// Remove the spinner from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for Progress {
    fn handle_event(&self, event: &Event) {
        match event.level {
            EventLevel::Info => {
                if let Some(step) = event.message.strip_prefix("Starting ") {
                    self.bar.set_message(format!("{}...", step));
                } else if event.message.starts_with("Completed ") {
                    self.bar.inc(1);
                }
            }
            EventLevel::Error => {
                let skipped = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                self.bar.set_prefix(format!("{} skipped", skipped));
            }
            EventLevel::Debug => {}
        }
    }

    fn is_interested_in(&self, level: EventLevel) -> bool {
        level != EventLevel::Debug
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos}/4 {msg} {prefix}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
}
