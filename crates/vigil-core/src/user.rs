//! Enrolled users and their reminder lists.
//!
//! A user's name is the only identifier. The reminder list is ordered by
//! the operator, case-sensitive, and may hold duplicates.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub name: String,
    pub reminders: Vec<String>,
}

/// `GET /users` entries are either bare names or `{name, reminders}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireUser {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        reminders: Option<Vec<String>>,
    },
}

impl From<WireUser> for User {
    fn from(wire: WireUser) -> Self {
        match wire {
            WireUser::Name(name) => User {
                name,
                reminders: Vec::new(),
            },
            WireUser::Full { name, reminders } => User {
                name,
                reminders: reminders.unwrap_or_default(),
            },
        }
    }
}

impl User {
    /// Decode the body of `GET /users`, preserving backend order.
    pub fn list_from_json(body: Value) -> Result<Vec<User>, serde_json::Error> {
        let wire: Vec<WireUser> = serde_json::from_value(body)?;
        Ok(wire.into_iter().map(User::from).collect())
    }
}

/// Find a user by exact name.
pub fn find<'a>(users: &'a [User], name: &str) -> Option<&'a User> {
    users.iter().find(|u| u.name == name)
}

/// A change to one user's reminder list.
///
/// Every edit is applied locally to produce the complete next list, which
/// is then written back as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderEdit {
    /// Append an item. Whitespace-only items are rejected; the item is
    /// otherwise stored exactly as typed.
    Add(String),
    /// Remove the item at a zero-based position.
    Remove(usize),
    /// Remove the last occurrence of an item.
    RemoveItem(String),
    /// Replace the whole list.
    Replace(Vec<String>),
}

impl ReminderEdit {
    /// Compute the next list without touching `current`.
    pub fn apply(&self, current: &[String]) -> Result<Vec<String>, ValidationError> {
        match self {
            ReminderEdit::Add(item) => {
                if item.trim().is_empty() {
                    return Err(ValidationError::EmptyReminder);
                }
                let mut next = current.to_vec();
                next.push(item.clone());
                Ok(next)
            }
            ReminderEdit::Remove(index) => {
                if *index >= current.len() {
                    return Err(ValidationError::ReminderOutOfRange {
                        index: *index,
                        len: current.len(),
                    });
                }
                let mut next = current.to_vec();
                next.remove(*index);
                Ok(next)
            }
            ReminderEdit::RemoveItem(item) => {
                let index = current
                    .iter()
                    .rposition(|r| r == item)
                    .ok_or_else(|| ValidationError::ReminderNotFound(item.clone()))?;
                let mut next = current.to_vec();
                next.remove(index);
                Ok(next)
            }
            ReminderEdit::Replace(items) => Ok(items.clone()),
        }
    }
}
