use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// One-shot failsafe timer. Runs `on_fire` once after `ceiling` unless
/// disarmed first. Dropping the watchdog disarms it.
pub struct Watchdog {
    session_id: Uuid,
    cancel_token: CancellationToken,
}

impl Watchdog {
    pub fn arm<F>(session_id: Uuid, ceiling: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(session_id = %session_id, "Watchdog disarmed");
                }
                _ = tokio::time::sleep(ceiling) => {
                    if !token.is_cancelled() {
                        warn!(
                            session_id = %session_id,
                            ceiling_ms = ceiling.as_millis() as u64,
                            "Watchdog fired, forcing completion"
                        );
                        on_fire();
                    }
                }
            }
        });
        debug!(session_id = %session_id, ceiling_ms = ceiling.as_millis() as u64, "Watchdog armed");
        Self {
            session_id,
            cancel_token,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn disarm(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_armed(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}
