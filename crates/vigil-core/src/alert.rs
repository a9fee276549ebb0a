//! Alerts as reported by `GET /alerts`.
//!
//! The backend is the source of truth for membership and order (newest
//! first). Decoding is lenient per record: a field of the wrong shape
//! falls back to its default, and an entry that is not an object at all is
//! dropped with a warning without taking the rest of the list down with it.

use crate::error::ValidationError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Normalized alert category.
///
/// Wire tags are matched case-insensitively. Anything unrecognized lands in
/// [`AlertKind::Unknown`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Motion,
    Emergency,
    Security,
    Reminder,
    Unknown,
}

impl AlertKind {
    /// The four categories the backend is known to emit.
    pub const KNOWN: [AlertKind; 4] = [
        AlertKind::Motion,
        AlertKind::Emergency,
        AlertKind::Security,
        AlertKind::Reminder,
    ];

    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "motion" => AlertKind::Motion,
            "emergency" => AlertKind::Emergency,
            "security" => AlertKind::Security,
            "reminder" => AlertKind::Reminder,
            _ => AlertKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Motion => "motion",
            AlertKind::Emergency => "emergency",
            AlertKind::Security => "security",
            AlertKind::Reminder => "reminder",
            AlertKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Backend-assigned identity. `None` when the backend omitted it.
    pub id: Option<String>,
    pub kind: AlertKind,
    pub message: String,
    /// ISO-8601 timestamp, kept as sent.
    pub timestamp: String,
    pub read: bool,
}

/// Stable identity used to key an alert in a rendered list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKey {
    Id(String),
    /// Degraded mode: the backend sent no id, so the list position stands in.
    Position(usize),
}

#[derive(Deserialize)]
struct WireAlert {
    #[serde(default, alias = "_id", deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    read: Option<bool>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl From<WireAlert> for Alert {
    fn from(wire: WireAlert) -> Self {
        Self {
            id: wire.id,
            kind: wire
                .kind
                .as_deref()
                .map(AlertKind::from_wire)
                .unwrap_or(AlertKind::Unknown),
            message: wire.message.unwrap_or_default(),
            timestamp: wire.timestamp.unwrap_or_default(),
            read: wire.read.unwrap_or(false),
        }
    }
}

impl Alert {
    /// Decode the body of `GET /alerts`.
    ///
    /// Fails only if the body is not a JSON array. Records that are not
    /// objects are skipped.
    pub fn list_from_json(body: Value) -> Result<Vec<Alert>, serde_json::Error> {
        let records: Vec<Value> = serde_json::from_value(body)?;
        let mut alerts = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<WireAlert>(record) {
                Ok(wire) => alerts.push(Alert::from(wire)),
                Err(e) => tracing::warn!(position, error = %e, "skipping malformed alert"),
            }
        }
        Ok(alerts)
    }

    pub fn key(&self, position: usize) -> AlertKey {
        match &self.id {
            Some(id) => AlertKey::Id(id.clone()),
            None => AlertKey::Position(position),
        }
    }

    pub fn is_unread(&self) -> bool {
        !self.read
    }

    /// Human label for how long ago the alert fired, relative to `now`.
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        relative_time(&self.timestamp, now)
    }
}

/// Category projection over an alert list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertFilter {
    #[default]
    All,
    Kind(AlertKind),
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        match self {
            AlertFilter::All => true,
            AlertFilter::Kind(kind) => alert.kind == *kind,
        }
    }

    /// Apply the filter. Never mutates the input; order is preserved.
    pub fn apply<'a>(&self, alerts: &'a [Alert]) -> Vec<&'a Alert> {
        alerts.iter().filter(|a| self.matches(a)).collect()
    }
}

impl FromStr for AlertFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered == "all" {
            return Ok(AlertFilter::All);
        }
        match AlertKind::from_wire(&lowered) {
            AlertKind::Unknown if lowered != "unknown" => {
                Err(ValidationError::UnknownFilter(s.to_string()))
            }
            kind => Ok(AlertFilter::Kind(kind)),
        }
    }
}

impl fmt::Display for AlertFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertFilter::All => f.write_str("all"),
            AlertFilter::Kind(kind) => kind.fmt(f),
        }
    }
}

/// Per-category tallies shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AlertCounts {
    pub motion: usize,
    pub emergency: usize,
    pub security: usize,
    pub reminder: usize,
    pub unknown: usize,
}

impl AlertCounts {
    pub fn tally(alerts: &[Alert]) -> Self {
        let mut counts = Self::default();
        for alert in alerts {
            match alert.kind {
                AlertKind::Motion => counts.motion += 1,
                AlertKind::Emergency => counts.emergency += 1,
                AlertKind::Security => counts.security += 1,
                AlertKind::Reminder => counts.reminder += 1,
                AlertKind::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn get(&self, kind: AlertKind) -> usize {
        match kind {
            AlertKind::Motion => self.motion,
            AlertKind::Emergency => self.emergency,
            AlertKind::Security => self.security,
            AlertKind::Reminder => self.reminder,
            AlertKind::Unknown => self.unknown,
        }
    }
}

/// The first `n` alerts (the newest, given backend ordering).
pub fn recent(alerts: &[Alert], n: usize) -> &[Alert] {
    &alerts[..alerts.len().min(n)]
}

pub fn unread(alerts: &[Alert]) -> Vec<&Alert> {
    alerts.iter().filter(|a| a.is_unread()).collect()
}

/// Format `timestamp` as "Just now", "5m ago", "3h ago", or a calendar date.
///
/// Offsetless timestamps are read as local time. Anything unparseable is
/// returned verbatim.
pub fn relative_time(timestamp: &str, now: DateTime<Utc>) -> String {
    let Some(at) = parse_timestamp(timestamp) else {
        return timestamp.to_string();
    };
    let elapsed = now.signed_duration_since(at);
    if elapsed < chrono::Duration::minutes(1) {
        "Just now".to_string()
    } else if elapsed < chrono::Duration::hours(1) {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed < chrono::Duration::days(1) {
        format!("{}h ago", elapsed.num_hours())
    } else {
        at.with_timezone(&Local).format("%Y-%m-%d").to_string()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
