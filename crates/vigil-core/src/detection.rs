//! Current detection as reported by `GET /current-detection`.

use serde::{Deserialize, Serialize};

/// Name the backend reports when it sensed movement but saw no face.
pub const MOTION_SENTINEL: &str = "Motion Detected";

/// Wire shape: `{ name?, isKnown?, reminders?, confidence? }`.
///
/// Every field is optional; `{}` is a valid "nobody here" payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_known: Option<bool>,
    #[serde(default)]
    pub reminders: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Who is in front of the camera right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSnapshot {
    pub name: String,
    pub is_known: bool,
    pub reminders: Vec<String>,
    pub confidence: Option<f32>,
}

/// Display classification, derived from a snapshot and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Known,
    Motion,
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Known => "known",
            Classification::Motion => "motion",
            Classification::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Known => "Known User",
            Classification::Motion => "Motion Detected",
            Classification::Unknown => "Unknown Person",
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Classification::Known => "VERIFIED",
            Classification::Motion => "MOTION",
            Classification::Unknown => "ALERT",
        }
    }
}

impl DetectionSnapshot {
    pub fn classify(&self) -> Classification {
        if self.is_known {
            Classification::Known
        } else if self.name == MOTION_SENTINEL {
            Classification::Motion
        } else {
            Classification::Unknown
        }
    }

    /// Uppercased first character of the name, for avatar badges.
    pub fn initial(&self) -> Option<char> {
        self.name.chars().next().map(|c| c.to_ascii_uppercase())
    }
}

/// Reconciled detection state: either nobody, or one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", content = "detection", rename_all = "snake_case")]
pub enum DetectionState {
    #[default]
    Idle,
    HasDetection(DetectionSnapshot),
}

impl DetectionState {
    /// Reconcile one successful poll result.
    ///
    /// A missing or empty name means nobody is detected.
    pub fn from_payload(payload: DetectionPayload) -> Self {
        match payload.name {
            Some(name) if !name.is_empty() => DetectionState::HasDetection(DetectionSnapshot {
                name,
                is_known: payload.is_known.unwrap_or(false),
                reminders: payload.reminders.unwrap_or_default(),
                confidence: payload.confidence,
            }),
            _ => DetectionState::Idle,
        }
    }

    pub fn snapshot(&self) -> Option<&DetectionSnapshot> {
        match self {
            DetectionState::Idle => None,
            DetectionState::HasDetection(snapshot) => Some(snapshot),
        }
    }

    pub fn classify(&self) -> Option<Classification> {
        self.snapshot().map(DetectionSnapshot::classify)
    }

    /// Reminders to show alongside the overlay; empty when idle.
    pub fn reminders(&self) -> &[String] {
        self.snapshot().map(|s| s.reminders.as_slice()).unwrap_or(&[])
    }

    /// One-line summary for status surfaces.
    pub fn summary(&self) -> String {
        match self {
            DetectionState::Idle => "No person detected".to_string(),
            DetectionState::HasDetection(s) => match s.classify() {
                Classification::Motion => MOTION_SENTINEL.to_string(),
                class => format!("{} ({})", s.name, class.label()),
            },
        }
    }
}
