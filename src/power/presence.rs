//! Ongoing-work announcement.

use tracing::info;

/// Tells the host that background recording is in progress
pub trait Presence: Send {
    /// Called once when the recorder starts and again on every tick
    fn announce(&mut self, text: &str);
}

/// Presence that reports through the process log
///
/// Repeated identical announcements are logged once.
#[derive(Debug, Default)]
pub struct TracingPresence {
    last: Option<String>,
}

impl TracingPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presence for TracingPresence {
    fn announce(&mut self, text: &str) {
        if self.last.as_deref() == Some(text) {
            return;
        }
        info!("{}", text);
        self.last = Some(text.to_string());
    }
}
