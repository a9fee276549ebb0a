//! Enrollment Workflow: enroll, re-enroll and delete.
//!
//! The workflow owns the form and publishes its phase. Local checks run
//! synchronously at the start of a submit, so a form that fails them never
//! leaves `Idle`. It never edits the directory
//! itself; after every successful mutation it asks Reminder Sync to
//! re-fetch so the directory is never stale relative to the backend.

use crate::api::ApiClient;
use crate::error::SyncError;
use crate::reminders::ReminderSyncHandle;
use tokio::sync::watch;
use vigil_core::{EnrollMode, EnrollmentForm};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnrollmentPhase {
    #[default]
    Idle,
    /// The request is in flight.
    Submitting,
    Succeeded,
    /// Holds the message shown to the operator. Form input is kept.
    Failed(String),
}

impl EnrollmentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentPhase::Succeeded | EnrollmentPhase::Failed(_))
    }
}

/// A deletion the operator has asked for but not yet confirmed.
#[must_use = "a deletion does nothing until passed to confirm_delete"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    name: String,
}

impl PendingDeletion {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct EnrollmentWorkflow {
    api: ApiClient,
    directory: ReminderSyncHandle,
    mode: EnrollMode,
    form: EnrollmentForm,
    phase: watch::Sender<EnrollmentPhase>,
}

impl EnrollmentWorkflow {
    /// Open the workflow and fetch the directory.
    ///
    /// A failed fetch is logged, not fatal: enrolling works without it and
    /// re-enrolling stays gated until a later refresh succeeds.
    pub async fn enter(api: ApiClient, directory: ReminderSyncHandle, mode: EnrollMode) -> Self {
        if let Err(error) = directory.refresh().await {
            tracing::warn!(error = %error, "directory fetch on entry failed");
        }
        Self {
            api,
            directory,
            mode,
            form: EnrollmentForm::default(),
            phase: watch::channel(EnrollmentPhase::Idle).0,
        }
    }

    pub fn mode(&self) -> EnrollMode {
        self.mode
    }

    pub fn phase(&self) -> EnrollmentPhase {
        self.phase.borrow().clone()
    }

    /// Watch phase changes, including `Submitting` while a request is in flight.
    pub fn subscribe_phase(&self) -> watch::Receiver<EnrollmentPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, next: EnrollmentPhase) {
        self.phase.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    pub fn form(&self) -> &EnrollmentForm {
        &self.form
    }

    /// Edit the form. Leaving a finished submission returns the phase to `Idle`.
    pub fn form_mut(&mut self) -> &mut EnrollmentForm {
        if self.phase.borrow().is_terminal() {
            self.set_phase(EnrollmentPhase::Idle);
        }
        &mut self.form
    }

    /// Names a re-enrollment may choose from.
    pub fn directory_names(&self) -> Vec<String> {
        self.directory.names()
    }

    pub fn can_submit(&self) -> bool {
        self.form.can_submit(self.mode, &self.directory.users())
    }

    /// Validate and send the form as one multipart request.
    ///
    /// Returns the submitted name. On success the form is cleared; on any
    /// failure it is left as it was.
    pub async fn submit(&mut self) -> Result<String, SyncError> {
        let submission = match self.form.submission(self.mode, &self.directory.users()) {
            Ok(submission) => submission,
            Err(error) => {
                self.set_phase(EnrollmentPhase::Idle);
                return Err(error.into());
            }
        };

        self.set_phase(EnrollmentPhase::Submitting);
        match self.api.enroll(self.mode, &submission).await {
            Ok(()) => {
                tracing::info!(name = %submission.name, mode = ?self.mode, "enrollment accepted");
                self.form.reset();
                self.set_phase(EnrollmentPhase::Succeeded);
                self.refresh_directory().await;
                Ok(submission.name)
            }
            Err(error) => {
                tracing::warn!(name = %submission.name, error = %error, "enrollment failed");
                self.set_phase(EnrollmentPhase::Failed(error.to_string()));
                Err(error.into())
            }
        }
    }

    /// First step of a delete. Nothing is sent until confirmed.
    pub fn request_delete(&self, name: &str) -> PendingDeletion {
        PendingDeletion {
            name: name.to_string(),
        }
    }

    /// Send `DELETE /users/{name}`. Whether the user existed is the
    /// backend's concern.
    pub async fn confirm_delete(&mut self, pending: PendingDeletion) -> Result<(), SyncError> {
        match self.api.delete_user(&pending.name).await {
            Ok(()) => {
                tracing::info!(name = %pending.name, "user deleted");
                self.refresh_directory().await;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(name = %pending.name, error = %error, "delete failed");
                Err(error.into())
            }
        }
    }

    async fn refresh_directory(&self) {
        if let Err(error) = self.directory.refresh().await {
            tracing::warn!(error = %error, "directory refresh after mutation failed");
        }
    }
}
