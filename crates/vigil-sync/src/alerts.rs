//! Owner of the alert list.

use crate::api::ApiClient;
use crate::poller::Poller;
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use vigil_core::alert::{self, AlertCounts};
use vigil_core::{Alert, AlertFilter};

/// Holds the backend's most recent alert list.
///
/// Each successful poll replaces the whole list; nothing is merged or
/// deduplicated client-side. A failed poll leaves the previous list in
/// place. There is no client-side "mark as read".
pub struct AlertStore {
    alerts: watch::Sender<Vec<Alert>>,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertStore {
    pub fn new() -> Self {
        let (alerts, _) = watch::channel(Vec::new());
        Self { alerts }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Alert>> {
        self.alerts.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.alerts.borrow().clone()
    }

    pub fn replace(&self, next: Vec<Alert>) {
        self.alerts.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!(before = current.len(), after = next.len(), "alert list replaced");
            *current = next;
            true
        });
    }

    pub fn apply_error(&self, error: &TransportError) {
        tracing::debug!(error = %error, "alert poll failed; keeping previous list");
    }

    /// Filtered copy; the stored list is untouched.
    pub fn filtered(&self, filter: AlertFilter) -> Vec<Alert> {
        filter
            .apply(&self.alerts.borrow())
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> AlertCounts {
        AlertCounts::tally(&self.alerts.borrow())
    }

    pub fn recent(&self, n: usize) -> Vec<Alert> {
        alert::recent(&self.alerts.borrow(), n).to_vec()
    }

    pub fn unread_count(&self) -> usize {
        alert::unread(&self.alerts.borrow()).len()
    }

    /// Poll `GET /alerts` every `period`.
    pub fn start_polling(self: &Arc<Self>, api: ApiClient, period: Duration) -> Poller {
        let on_result = Arc::clone(self);
        let on_error = Arc::clone(self);
        Poller::start(
            "alerts",
            period,
            move || {
                let api = api.clone();
                async move { api.alerts().await }
            },
            move |alerts| on_result.replace(alerts),
            move |error| on_error.apply_error(&error),
        )
    }
}
