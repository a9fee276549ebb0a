//! One client session: the stores, their pollers and the directory task.

use crate::alerts::AlertStore;
use crate::api::ApiClient;
use crate::detection::DetectionReconciler;
use crate::enrollment::EnrollmentWorkflow;
use crate::poller::{DeliveryGate, Poller};
use crate::reminders::{spawn_reminder_sync, ReminderSyncHandle};
use crate::transport::{TransportError, LOOPBACK_BASE_URL};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::EnrollMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Already resolved; see [`crate::resolve_base_url`].
    pub base_url: String,
    pub request_timeout: Duration,
    pub detection_interval: Duration,
    pub alert_interval: Duration,
    /// `None` fetches the directory only on entry and after mutations.
    pub directory_interval: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            base_url: LOOPBACK_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            detection_interval: Duration::from_millis(2_000),
            alert_interval: Duration::from_millis(5_000),
            directory_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// Each store owns its state; the pollers only feed them.
pub struct Session {
    api: ApiClient,
    detection: Arc<DetectionReconciler>,
    alerts: Arc<AlertStore>,
    directory: ReminderSyncHandle,
    pollers: Vec<Poller>,
    /// Guards the one-off directory load when the directory is not polled.
    initial_load: DeliveryGate,
}

impl Session {
    /// Build the HTTP client and start every poller.
    pub fn start(options: &SessionOptions) -> Result<Self, TransportError> {
        let api = ApiClient::http(&options.base_url, options.request_timeout)?;
        Ok(Self::with_api(api, options))
    }

    pub fn with_api(api: ApiClient, options: &SessionOptions) -> Self {
        let detection = Arc::new(DetectionReconciler::new());
        let alerts = Arc::new(AlertStore::new());
        let directory = spawn_reminder_sync(api.clone());

        let initial_load = DeliveryGate::new();
        let mut pollers = vec![
            detection.start_polling(api.clone(), options.detection_interval),
            alerts.start_polling(api.clone(), options.alert_interval),
        ];
        match options.directory_interval {
            Some(period) => pollers.push(directory.start_polling(period)),
            None => {
                directory.queue_refresh(Some(initial_load.clone()));
            }
        }

        tracing::info!(base_url = %api.base_url(), pollers = pollers.len(), "session started");
        Self {
            api,
            detection,
            alerts,
            directory,
            pollers,
            initial_load,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn detection(&self) -> &Arc<DetectionReconciler> {
        &self.detection
    }

    pub fn alerts(&self) -> &Arc<AlertStore> {
        &self.alerts
    }

    pub fn directory(&self) -> &ReminderSyncHandle {
        &self.directory
    }

    /// Open an enrollment workflow sharing this session's directory.
    pub async fn enrollment(&self, mode: EnrollMode) -> EnrollmentWorkflow {
        EnrollmentWorkflow::enter(self.api.clone(), self.directory.clone(), mode).await
    }

    /// Stop every poller. No result lands in a store after this returns.
    pub fn shutdown(&self) {
        for poller in &self.pollers {
            poller.stop();
        }
        self.initial_load.close();
        tracing::info!("session stopped");
    }
}
