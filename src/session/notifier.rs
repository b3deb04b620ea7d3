//! Session-expiry notification channel.
//!
//! The request layer holds a [`SessionNotifier`] and calls
//! [`SessionNotifier::notify_expired`] on a 401 from an authenticated
//! endpoint. The UI subscribes once and shows the overlay; neither side
//! knows about the other.

use tokio::sync::broadcast;
use tracing::info;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Expired { endpoint: String },
}

#[derive(Clone)]
pub struct SessionNotifier {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn notify_expired(&self, endpoint: &str) {
        info!(endpoint, "Session rejected by server");
        // No subscribers is fine (e.g. one-shot CLI commands)
        let _ = self.tx.send(SessionEvent::Expired {
            endpoint: endpoint.to_string(),
        });
    }
}

/// Collapses any number of expiry events into a single overlay display.
///
/// `poll` returns `true` at most once until the overlay is dismissed with
/// [`ExpiryWatcher::acknowledge`].
pub struct ExpiryWatcher {
    rx: broadcast::Receiver<SessionEvent>,
    showing: bool,
}

impl ExpiryWatcher {
    pub fn new(notifier: &SessionNotifier) -> Self {
        Self {
            rx: notifier.subscribe(),
            showing: false,
        }
    }

    /// Drain pending events; `true` when the overlay should be shown now.
    pub fn poll(&mut self) -> bool {
        let mut expired = false;
        loop {
            match self.rx.try_recv() {
                Ok(SessionEvent::Expired { .. }) => expired = true,
                Err(broadcast::error::TryRecvError::Lagged(_)) => expired = true,
                Err(_) => break,
            }
        }
        if expired && !self.showing {
            self.showing = true;
            return true;
        }
        false
    }

    pub fn is_showing(&self) -> bool {
        self.showing
    }

    pub fn acknowledge(&mut self) {
        self.showing = false;
        // Events raised by requests still in flight when the user confirmed
        // belong to the session that was just closed.
        while self.rx.try_recv().is_ok() {}
    }
}
