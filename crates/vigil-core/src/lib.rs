//! vigil-core — Data model for the surveillance appliance control surface.
//!
//! Decodes what the backend reports (alerts, the current detection, the
//! enrolled-user directory) into typed values and holds the pure logic
//! applied to them: classification, filtering, reminder edits and
//! enrollment form validation. Nothing here performs I/O.

pub mod alert;
pub mod detection;
pub mod enrollment;
pub mod error;
pub mod user;

pub use alert::{Alert, AlertCounts, AlertFilter, AlertKey, AlertKind};
pub use detection::{Classification, DetectionPayload, DetectionSnapshot, DetectionState};
pub use enrollment::{EnrollMode, EnrollmentForm, EnrollmentSubmission, ImageFile, Preview};
pub use error::ValidationError;
pub use user::{ReminderEdit, User};
