use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::utc_stamp_serde;
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Purple,
    Red,
    Orange,
}

impl TaskColor {
    pub const ALL: [TaskColor; 6] = [
        TaskColor::Yellow,
        TaskColor::Green,
        TaskColor::Blue,
        TaskColor::Purple,
        TaskColor::Red,
        TaskColor::Orange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskColor::Yellow => "Yellow",
            TaskColor::Green => "Green",
            TaskColor::Blue => "Blue",
            TaskColor::Purple => "Purple",
            TaskColor::Red => "Red",
            TaskColor::Orange => "Orange",
        }
    }

    /// ANSI foreground code used by the table renderer.
    pub fn ansi_code(self) -> &'static str {
        match self {
            TaskColor::Yellow => "33",
            TaskColor::Green => "32",
            TaskColor::Blue => "34",
            TaskColor::Purple => "35",
            TaskColor::Red => "31",
            TaskColor::Orange => "38;5;208",
        }
    }
}

impl fmt::Display for TaskColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskColor {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TaskColor::ALL
            .into_iter()
            .find(|color| color.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| TaskError::validation(format!("unknown task color: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[default]
    Basic,
    Urgent,
    Important,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Basic, TaskType::Urgent, TaskType::Important];

    pub fn name(self) -> &'static str {
        match self {
            TaskType::Basic => "Basic",
            TaskType::Urgent => "Urgent",
            TaskType::Important => "Important",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TaskType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| TaskError::validation(format!("unknown task type: {s}")))
    }
}

/// The editable part of a task, without identity or bookkeeping.
///
/// This is the shape of the edit-form draft and the payload of
/// [`DataStore::create`](crate::datastore::DataStore::create) and
/// [`DataStore::update`](crate::datastore::DataStore::update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFields {
    pub title: String,
    pub color: TaskColor,
    pub kind: TaskType,
    pub deadline: DateTime<Utc>,
    pub is_reminder_on: bool,
    pub reminder_date: DateTime<Utc>,
    pub reminder_text: String,
}

impl TaskFields {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            title: String::new(),
            color: TaskColor::default(),
            kind: TaskType::default(),
            deadline: now,
            is_reminder_on: false,
            reminder_date: now,
            reminder_text: String::new(),
        }
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if !self.has_title() {
            return Err(TaskError::validation("task title must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub color: TaskColor,

    #[serde(rename = "type", default)]
    pub kind: TaskType,

    #[serde(with = "utc_stamp_serde")]
    pub deadline: DateTime<Utc>,

    #[serde(default)]
    pub is_completed: bool,

    #[serde(default)]
    pub is_reminder_on: bool,

    #[serde(with = "utc_stamp_serde")]
    pub reminder_date: DateTime<Utc>,

    #[serde(default)]
    pub reminder_text: String,

    #[serde(with = "utc_stamp_serde")]
    pub created: DateTime<Utc>,

    #[serde(with = "utc_stamp_serde")]
    pub modified: DateTime<Utc>,
}

impl Task {
    pub fn from_fields(fields: TaskFields, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: fields.title,
            color: fields.color,
            kind: fields.kind,
            deadline: fields.deadline,
            is_completed: false,
            is_reminder_on: fields.is_reminder_on,
            reminder_date: fields.reminder_date,
            reminder_text: fields.reminder_text,
            created: now,
            modified: now,
        }
    }

    /// Overwrites the editable fields. Saving from the edit form re-opens a
    /// completed task.
    pub fn apply_fields(&mut self, fields: TaskFields, now: DateTime<Utc>) {
        self.title = fields.title;
        self.color = fields.color;
        self.kind = fields.kind;
        self.deadline = fields.deadline;
        self.is_completed = false;
        self.is_reminder_on = fields.is_reminder_on;
        self.reminder_date = fields.reminder_date;
        self.reminder_text = fields.reminder_text;
        self.modified = now;
    }

    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            color: self.color,
            kind: self.kind,
            deadline: self.deadline,
            is_reminder_on: self.is_reminder_on,
            reminder_date: self.reminder_date,
            reminder_text: self.reminder_text.clone(),
        }
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}
