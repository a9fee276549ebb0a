//! Owner of the current detection.

use crate::api::ApiClient;
use crate::poller::Poller;
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use vigil_core::{DetectionPayload, DetectionState};

/// Reconciles detection polls into a [`DetectionState`].
///
/// Any poll error resets the state to `Idle`: a stale face on the overlay
/// is worse than none.
pub struct DetectionReconciler {
    state: watch::Sender<DetectionState>,
}

impl Default for DetectionReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionReconciler {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DetectionState::Idle);
        Self { state }
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> DetectionState {
        self.state.borrow().clone()
    }

    pub fn apply(&self, payload: DetectionPayload) {
        self.transition(DetectionState::from_payload(payload));
    }

    pub fn apply_error(&self, error: &TransportError) {
        tracing::debug!(error = %error, "detection poll failed; clearing detection");
        self.transition(DetectionState::Idle);
    }

    fn transition(&self, next: DetectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            log_transition(current, &next);
            *current = next;
            true
        });
    }

    /// Poll `GET /current-detection` every `period`.
    pub fn start_polling(self: &Arc<Self>, api: ApiClient, period: Duration) -> Poller {
        let on_result = Arc::clone(self);
        let on_error = Arc::clone(self);
        Poller::start(
            "detection",
            period,
            move || {
                let api = api.clone();
                async move { api.current_detection().await }
            },
            move |payload| on_result.apply(payload),
            move |error| on_error.apply_error(&error),
        )
    }
}

fn log_transition(from: &DetectionState, to: &DetectionState) {
    match (from.snapshot(), to.snapshot()) {
        (_, None) => tracing::info!("detection cleared"),
        (Some(prev), Some(next)) if prev.name == next.name => {
            tracing::debug!(name = %next.name, reminders = next.reminders.len(), "detection updated")
        }
        (_, Some(next)) => tracing::info!(
            name = %next.name,
            class = next.classify().as_str(),
            reminders = next.reminders.len(),
            "person detected"
        ),
    }
}
