use thiserror::Error;

/// Client-side input rejected before any request is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("no image file selected")]
    NoFile,
    #[error("selected file is not an image (content type {0})")]
    NotAnImage(String),
    #[error("{0} is not an enrolled user")]
    UnknownUser(String),
    #[error("reminder item must not be empty")]
    EmptyReminder,
    #[error("reminder position {index} out of range (list has {len} items)")]
    ReminderOutOfRange { index: usize, len: usize },
    #[error("reminder {0:?} not in list")]
    ReminderNotFound(String),
    #[error("unknown alert filter {0:?}")]
    UnknownFilter(String),
}
