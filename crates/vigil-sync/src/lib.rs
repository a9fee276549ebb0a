//! vigil-sync — Reconciliation core for the surveillance appliance.
//!
//! Independent pollers pull detection, alert and directory state from the
//! backend; each result is merged into a store that owns that state and
//! publishes it through a `tokio::sync::watch` channel. Mutations
//! (enroll, re-enroll, delete, reminder edits) go through the backend
//! first and only touch local state once the write is confirmed.

pub mod alerts;
pub mod api;
pub mod detection;
pub mod enrollment;
pub mod error;
pub mod poller;
pub mod reminders;
pub mod session;
pub mod transport;

#[cfg(test)]
mod fake;

pub use alerts::AlertStore;
pub use api::ApiClient;
pub use detection::DetectionReconciler;
pub use enrollment::{EnrollmentPhase, EnrollmentWorkflow, PendingDeletion};
pub use error::SyncError;
pub use poller::Poller;
pub use reminders::{spawn_reminder_sync, ReminderSyncHandle};
pub use session::{Session, SessionOptions};
pub use transport::{resolve_base_url, HttpTransport, Transport, TransportError};
