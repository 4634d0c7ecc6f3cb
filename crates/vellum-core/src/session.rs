//! Author-facing session log.
//!
//! A [`Session`] collects the diagnostics a document author should see
//! (bad version strings, malformed import records, ordering failures) so the
//! embedder can surface them in its own console. Engineering telemetry goes
//! through `tracing` as usual; every console message is mirrored there as a
//! warning under the `vellum::session` target.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Shared per-document session state.
///
/// Sessions are cheap and are shared as `Arc<Session>` between the content
/// layer, the resolver, and the embedder. The session also owns the counter
/// that hands out import request ids, so ids are unique per session rather
/// than per process.
#[derive(Debug, Default)]
pub struct Session {
    messages: Mutex<Vec<String>>,
    next_request_id: AtomicU64,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a message to the author-facing console.
    pub fn console(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "vellum::session", "{message}");
        self.messages.lock().push(message);
    }

    /// Snapshot of the console buffer.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Whether any console message contains the given fragment.
    #[must_use]
    pub fn has_message(&self, fragment: &str) -> bool {
        self.messages.lock().iter().any(|m| m.contains(fragment))
    }

    /// Drain and return the console buffer.
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Hand out the next import request id for this session.
    ///
    /// Ids start at 1 and never repeat within a session.
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}
