//! Install progress reporting
//!
//! Progress flows one way, from the installer to whoever holds the receiver,
//! over a `tokio::sync::watch` channel. Sending never blocks and intermediate
//! values may be coalesced; receivers only ever see the latest state.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub status: String,
    /// 0..=100, never decreasing within one operation
    pub percent_complete: u8,
}

impl InstallProgress {
    pub fn new(status: impl Into<String>, percent_complete: u8) -> Self {
        Self {
            status: status.into(),
            percent_complete: percent_complete.min(100),
        }
    }
}

impl Default for InstallProgress {
    fn default() -> Self {
        Self::new("Waiting", 0)
    }
}

/// Create a progress channel to pass to install and update calls
pub fn progress_channel() -> (watch::Sender<InstallProgress>, watch::Receiver<InstallProgress>) {
    watch::channel(InstallProgress::default())
}

/// Installer-side handle enforcing monotonic percentages
pub(crate) struct ProgressReporter {
    sender: Option<watch::Sender<InstallProgress>>,
    last: u8,
}

impl ProgressReporter {
    pub(crate) fn new(sender: Option<watch::Sender<InstallProgress>>) -> Self {
        Self { sender, last: 0 }
    }

    pub(crate) fn report(&mut self, percent: u8, status: impl Into<String>) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        if let Some(sender) = &self.sender {
            sender.send_replace(InstallProgress::new(status, percent));
        }
    }

    /// Percentage for step `index` of `count`, spread over `from..to`
    pub(crate) fn span(from: u8, to: u8, index: usize, count: usize) -> u8 {
        if count == 0 {
            return to;
        }
        let width = usize::from(to.saturating_sub(from));
        from + ((width * index) / count) as u8
    }
}
