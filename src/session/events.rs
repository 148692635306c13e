use tokio::sync::mpsc;

/// Out-of-band signal from the transport to the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionEvent {
    /// An authenticated request came back 401.
    Unauthorized,
    /// An authenticated request came back 403; the session stays valid.
    Forbidden,
}

/// Sending half handed to transports; cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEvents {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: SessionEvent) {
        // Receiver is gone only when the manager was dropped; nothing left to reset.
        let _ = self.tx.send(event);
    }

    pub fn unauthorized(&self) {
        self.send(SessionEvent::Unauthorized);
    }

    pub fn forbidden(&self) {
        self.send(SessionEvent::Forbidden);
    }
}
