use crate::transport::TransportError;
use thiserror::Error;
use vigil_core::ValidationError;

/// Failure of a mutation or an on-demand refresh.
///
/// Poll failures never surface here; pollers report them and keep going.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("reminder sync task exited")]
    ChannelClosed,
}

impl SyncError {
    /// True when nothing reached the backend because input was rejected locally.
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}
