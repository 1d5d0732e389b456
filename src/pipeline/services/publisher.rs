use crate::pipeline::types::SessionUpdate;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fans session updates out to every subscribed observer.
#[derive(Clone)]
pub struct ResultPublisher {
    update_tx: broadcast::Sender<SessionUpdate>,
}

impl ResultPublisher {
    pub fn new(capacity: usize) -> Self {
        let (update_tx, _) = broadcast::channel(capacity.max(1));
        Self { update_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.update_tx.subscribe()
    }

    pub fn publish(&self, update: SessionUpdate) {
        debug!(
            session_id = %update.session_id,
            status = update.status,
            cause = ?update.cause,
            "Publishing session update"
        );
        // no subscribers is fine
        let _ = self.update_tx.send(update);
    }
}

/// Drains `rx` until the terminal update of `session_id` arrives.
/// Returns `None` if the channel closes first.
pub async fn wait_for_terminal(
    rx: &mut broadcast::Receiver<SessionUpdate>,
    session_id: Uuid,
) -> Option<SessionUpdate> {
    loop {
        match rx.recv().await {
            Ok(update) if update.session_id == session_id && update.is_terminal() => {
                return Some(update)
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Update receiver lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
