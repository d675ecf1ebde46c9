//! Intent labels understood by the interpreter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the user wants done with their calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateEvent,
    CreateReminder,
    CreateTask,
    ListEvents,
    UpdateEvent,
    DeleteEvent,
    Unknown,
}

impl Intent {
    /// Every label, in the order they are offered to classifiers.
    pub const ALL: [Intent; 7] = [
        Intent::CreateEvent,
        Intent::CreateReminder,
        Intent::CreateTask,
        Intent::ListEvents,
        Intent::UpdateEvent,
        Intent::DeleteEvent,
        Intent::Unknown,
    ];

    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateEvent => "create_event",
            Self::CreateReminder => "create_reminder",
            Self::CreateTask => "create_task",
            Self::ListEvents => "list_events",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::Unknown => "unknown",
        }
    }

    /// Short phrase used in clarification choices and replies.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CreateEvent => "create an event",
            Self::CreateReminder => "set a reminder",
            Self::CreateTask => "add a task",
            Self::ListEvents => "see your upcoming events",
            Self::UpdateEvent => "change an existing event",
            Self::DeleteEvent => "delete an event",
            Self::Unknown => "something else",
        }
    }

    /// Whether this intent creates a new calendar item.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Self::CreateEvent | Self::CreateReminder | Self::CreateTask
        )
    }

    /// Whether entity extraction is meaningful for this intent.
    pub fn wants_entities(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == label)
            .ok_or_else(|| format!("unknown intent label '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_str() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
    }

    #[test]
    fn from_str_is_lenient_about_case_and_separators() {
        assert_eq!("Create-Event".parse::<Intent>().unwrap(), Intent::CreateEvent);
        assert_eq!("create reminder".parse::<Intent>().unwrap(), Intent::CreateReminder);
        assert!("book_flight".parse::<Intent>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_value(Intent::ListEvents).unwrap();
        assert_eq!(json, "list_events");
    }
}
