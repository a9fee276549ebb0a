//! Reminder Sync: owner of the user directory.
//!
//! A single task owns the directory and serves requests one at a time, so
//! an edit always computes its next list from the state left by the
//! previous edit. Writes replace the user's whole reminder list on the
//! backend; the local copy changes only after the backend confirms.

use crate::api::ApiClient;
use crate::error::SyncError;
use crate::poller::{DeliveryGate, Poller};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use vigil_core::{user, ReminderEdit, User, ValidationError};

/// Messages sent from handles to the directory task.
enum DirectoryRequest {
    Refresh {
        reply: Option<oneshot::Sender<Result<Vec<User>, SyncError>>>,
        /// When set, the result is applied only while the gate is open.
        gate: Option<DeliveryGate>,
    },
    Edit {
        name: String,
        edit: ReminderEdit,
        reply: oneshot::Sender<Result<Vec<String>, SyncError>>,
    },
}

/// Clone-safe handle to the directory task.
#[derive(Clone)]
pub struct ReminderSyncHandle {
    tx: mpsc::Sender<DirectoryRequest>,
    users: watch::Receiver<Vec<User>>,
}

impl ReminderSyncHandle {
    /// Re-fetch `GET /users`. On failure the previous directory stays.
    pub async fn refresh(&self) -> Result<Vec<User>, SyncError> {
        self.gated_refresh(None).await
    }

    async fn gated_refresh(&self, gate: Option<DeliveryGate>) -> Result<Vec<User>, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DirectoryRequest::Refresh {
                reply: Some(reply_tx),
                gate,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Queue a refresh without waiting for it. Returns false when the
    /// request queue is full or the task is gone.
    pub fn request_refresh(&self) -> bool {
        self.queue_refresh(None)
    }

    /// Queue a refresh whose result is dropped once `gate` closes.
    pub(crate) fn queue_refresh(&self, gate: Option<DeliveryGate>) -> bool {
        self.tx
            .try_send(DirectoryRequest::Refresh { reply: None, gate })
            .is_ok()
    }

    /// Apply `edit` to `name`'s list and write the result back.
    ///
    /// Returns the confirmed list.
    pub async fn edit(&self, name: &str, edit: ReminderEdit) -> Result<Vec<String>, SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DirectoryRequest::Edit {
                name: name.to_string(),
                edit,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    pub async fn add_reminder(&self, name: &str, item: &str) -> Result<Vec<String>, SyncError> {
        self.edit(name, ReminderEdit::Add(item.to_string())).await
    }

    /// Remove the item at zero-based `index`.
    pub async fn remove_reminder(&self, name: &str, index: usize) -> Result<Vec<String>, SyncError> {
        self.edit(name, ReminderEdit::Remove(index)).await
    }

    pub fn users(&self) -> Vec<User> {
        self.users.borrow().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.users.borrow().iter().map(|u| u.name.clone()).collect()
    }

    pub fn reminders_for(&self, name: &str) -> Option<Vec<String>> {
        user::find(&self.users.borrow(), name).map(|u| u.reminders.clone())
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<User>> {
        self.users.clone()
    }

    /// Queue a directory refresh every `period`.
    ///
    /// Refreshes go through the same request queue as edits, so a poll
    /// never races a write. The directory task applies a polled result
    /// under the poller's gate: nothing lands after [`Poller::stop`].
    pub fn start_polling(&self, period: Duration) -> Poller {
        let handle = self.clone();
        let gate = DeliveryGate::new();
        let fetch_gate = gate.clone();
        Poller::start_gated(
            "directory",
            period,
            gate,
            move || {
                let handle = handle.clone();
                let gate = fetch_gate.clone();
                async move { handle.gated_refresh(Some(gate)).await }
            },
            |users: Vec<User>| tracing::debug!(users = users.len(), "directory polled"),
            |_error: SyncError| {},
        )
    }
}

/// Spawn the directory task on the current runtime.
///
/// The directory starts empty; call [`ReminderSyncHandle::refresh`] to
/// load it.
pub fn spawn_reminder_sync(api: ApiClient) -> ReminderSyncHandle {
    let (tx, mut rx) = mpsc::channel::<DirectoryRequest>(8);
    let (users_tx, users) = watch::channel(Vec::new());

    tokio::spawn(async move {
        tracing::debug!("directory task started");
        while let Some(req) = rx.recv().await {
            match req {
                DirectoryRequest::Refresh { reply, gate } => {
                    let result = run_refresh(&api, &users_tx, gate.as_ref()).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                DirectoryRequest::Edit { name, edit, reply } => {
                    let result = run_edit(&api, &users_tx, &name, &edit).await;
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("directory task exiting");
    });

    ReminderSyncHandle { tx, users }
}

async fn run_refresh(
    api: &ApiClient,
    users_tx: &watch::Sender<Vec<User>>,
    gate: Option<&DeliveryGate>,
) -> Result<Vec<User>, SyncError> {
    match api.users().await {
        Ok(users) => {
            let publish = || {
                users_tx.send_if_modified(|current| {
                    if *current == users {
                        return false;
                    }
                    tracing::debug!(users = users.len(), "directory updated");
                    *current = users.clone();
                    true
                })
            };
            match gate {
                None => {
                    publish();
                }
                Some(gate) => {
                    if gate.deliver_with(publish).is_none() {
                        tracing::debug!("dropping directory refresh that landed after stop");
                    }
                }
            }
            Ok(users)
        }
        Err(error) => {
            tracing::debug!(error = %error, "directory refresh failed; keeping previous directory");
            Err(error.into())
        }
    }
}

async fn run_edit(
    api: &ApiClient,
    users_tx: &watch::Sender<Vec<User>>,
    name: &str,
    edit: &ReminderEdit,
) -> Result<Vec<String>, SyncError> {
    let current = user::find(&users_tx.borrow(), name)
        .map(|u| u.reminders.clone())
        .ok_or_else(|| ValidationError::UnknownUser(name.to_string()))?;
    let next = edit.apply(&current)?;

    if let Err(error) = api.update_reminders(name, &next).await {
        tracing::warn!(user = name, error = %error, "reminder update failed; list unchanged");
        return Err(error.into());
    }

    users_tx.send_modify(|users| {
        if let Some(entry) = users.iter_mut().find(|u| u.name == name) {
            entry.reminders = next.clone();
        }
    });
    tracing::info!(user = name, reminders = next.len(), "reminders updated");
    Ok(next)
}
