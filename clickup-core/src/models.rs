//! ClickUp record types and their row layout.
//!
//! Each resource is a typed struct holding the fields the export relies on, plus an
//! `extra` map with every other key the API sent. [`Record`] tags the variants so the
//! pipeline can treat them uniformly. Turning a record into a [`Row`] is deterministic:
//! known columns first, then parent ids, then extra keys in the order they arrived.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::constants::*;

/// One database row, column name to value. Insertion ordered.
pub type Row = Map<String, Value>;

/// Resource types in the order they have to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Teams,
    Members,
    Spaces,
    Folders,
    Lists,
    Tasks,
    TimeEntries,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::Teams,
        Resource::Members,
        Resource::Spaces,
        Resource::Folders,
        Resource::Lists,
        Resource::Tasks,
        Resource::TimeEntries,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Resource::Teams => TEAMS,
            Resource::Members => MEMBERS,
            Resource::Spaces => SPACES,
            Resource::Folders => FOLDERS,
            Resource::Lists => LISTS,
            Resource::Tasks => TASKS,
            Resource::TimeEntries => TIME_ENTRIES,
        }
    }

    pub fn primary_key(self) -> &'static str {
        ID
    }

    /// Resources whose ids are needed to request this one, in the order the
    /// pipeline walks them.
    pub fn parents(self) -> &'static [Resource] {
        match self {
            Resource::Teams => &[],
            Resource::Members => &[Resource::Teams],
            Resource::Spaces => &[Resource::Teams],
            Resource::Folders => &[Resource::Spaces],
            Resource::Lists => &[Resource::Folders, Resource::Spaces],
            Resource::Tasks => &[Resource::Lists],
            Resource::TimeEntries => &[Resource::Teams],
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A record of any resource type.
#[derive(Debug, Clone)]
pub enum Record {
    Team(Team),
    Member(Member),
    Space(Space),
    Folder(Folder),
    List(List),
    Task(Task),
    TimeEntry(TimeEntry),
}

impl Record {
    pub fn into_row(self) -> Row {
        match self {
            Record::Team(team) => team.into_row(),
            Record::Member(member) => member.into_row(),
            Record::Space(space) => space.into_row(),
            Record::Folder(folder) => folder.into_row(),
            Record::List(list) => list.into_row(),
            Record::Task(task) => task.into_row(),
            Record::TimeEntry(entry) => entry.into_row(),
        }
    }
}

macro_rules! impl_into_record {
    ($($ty:ident),*) => {
        $(impl From<$ty> for Record {
            fn from(value: $ty) -> Self {
                Record::$ty(value)
            }
        })*
    };
}

impl_into_record!(Team, Member, Space, Folder, List, Task, TimeEntry);

/// Reference to another object, `{"id": ...}` with anything else ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdRef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub initials: Option<String>,
    #[serde(default, rename = "profilePicture")]
    pub profile_picture: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Team {
    /// Splits the embedded member list off into member records.
    pub fn take_members(&mut self) -> Vec<Member> {
        std::mem::take(&mut self.members)
            .into_iter()
            .map(|member| Member {
                user: member.user,
                team_id: self.id.clone(),
            })
            .collect()
    }

    pub fn into_row(self) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), self.id.into());
        row.insert("name".into(), self.name.into());
        row.insert("color".into(), self.color.into());
        row.insert("avatar".into(), self.avatar.into());
        append_extra(&mut row, self.extra);
        row
    }
}

/// A team member, stored in `members` keyed by user id.
#[derive(Debug, Clone)]
pub struct Member {
    pub user: User,
    pub team_id: String,
}

impl Member {
    pub fn into_row(self) -> Row {
        let user = self.user;
        let mut row = Row::new();
        row.insert("id".into(), user.id.into());
        row.insert("username".into(), user.username.into());
        row.insert("email".into(), user.email.into());
        row.insert("color".into(), user.color.into());
        row.insert("initials".into(), user.initials.into());
        row.insert("profilePicture".into(), user.profile_picture.into());
        row.insert("team_id".into(), self.team_id.into());
        append_extra(&mut row, user.extra);
        row
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(skip)]
    pub team_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Space {
    pub fn into_row(self) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), self.id.into());
        row.insert("name".into(), self.name.into());
        row.insert("private".into(), self.private.into());
        row.insert("archived".into(), self.archived.into());
        row.insert("team_id".into(), self.team_id.into());
        append_extra(&mut row, self.extra);
        row
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub space: Option<IdRef>,
    // Lists are fetched through their own endpoint.
    #[serde(default, skip_serializing)]
    pub lists: Vec<Value>,
    #[serde(skip)]
    pub space_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Folder {
    pub fn into_row(self) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), self.id.into());
        row.insert("name".into(), self.name.into());
        row.insert("hidden".into(), self.hidden.into());
        row.insert("archived".into(), self.archived.into());
        row.insert("space_id".into(), self.space_id.into());
        append_extra(&mut row, self.extra);
        row
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub folder: Option<IdRef>,
    #[serde(default)]
    pub space: Option<IdRef>,
    /// Owning folder, `None` for lists placed directly in a space
    #[serde(skip)]
    pub folder_id: Option<String>,
    #[serde(skip)]
    pub space_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl List {
    pub fn into_row(self) -> Row {
        let space_id = self.space_id.or(self.space.map(|space| space.id));
        let mut row = Row::new();
        row.insert("id".into(), self.id.into());
        row.insert("name".into(), self.name.into());
        row.insert("archived".into(), self.archived.into());
        row.insert("folder_id".into(), self.folder_id.into());
        row.insert("space_id".into(), space_id.into());
        append_extra(&mut row, self.extra);
        row
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub status: String,
    #[serde(default, rename = "type")]
    pub status_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priority {
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub custom_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub creator: Option<User>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub date_created: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub date_updated: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub date_closed: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub date_done: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub list: Option<IdRef>,
    #[serde(default)]
    pub folder: Option<IdRef>,
    #[serde(default)]
    pub space: Option<IdRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn into_row(self) -> Row {
        let (status, status_type) = match self.status {
            Some(status) => (Some(status.status), status.status_type),
            None => (None, None),
        };
        let mut row = Row::new();
        row.insert("id".into(), self.id.into());
        row.insert("custom_id".into(), self.custom_id.into());
        row.insert("name".into(), self.name.into());
        row.insert("status".into(), status.into());
        row.insert("status_type".into(), status_type.into());
        row.insert("archived".into(), self.archived.into());
        row.insert("parent".into(), self.parent.into());
        row.insert("creator_id".into(), self.creator.map(|user| user.id).into());
        row.insert(
            "priority".into(),
            self.priority.map(|priority| priority.priority).into(),
        );
        row.insert("date_created".into(), timestamp(self.date_created).into());
        row.insert("date_updated".into(), timestamp(self.date_updated).into());
        row.insert("date_closed".into(), timestamp(self.date_closed).into());
        row.insert("date_done".into(), timestamp(self.date_done).into());
        row.insert("due_date".into(), timestamp(self.due_date).into());
        row.insert("start_date".into(), timestamp(self.start_date).into());
        row.insert("url".into(), self.url.into());
        row.insert("team_id".into(), self.team_id.into());
        row.insert("list_id".into(), self.list.map(|list| list.id).into());
        row.insert("folder_id".into(), self.folder.map(|folder| folder.id).into());
        row.insert("space_id".into(), self.space.map(|space| space.id).into());
        append_extra(&mut row, self.extra);
        row
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    // An object, "0" or null depending on whether the entry is tied to a task
    #[serde(default)]
    pub task: Option<Value>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub billable: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub end: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub at: Option<String>,
    #[serde(skip)]
    pub team_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TimeEntry {
    pub fn task_id(&self) -> Option<String> {
        match self.task.as_ref()? {
            Value::Object(task) => match task.get("id")? {
                Value::String(id) => Some(id.clone()),
                Value::Number(id) => Some(id.to_string()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn into_row(self) -> Row {
        let task_id = self.task_id();
        let duration = self
            .duration
            .as_deref()
            .and_then(|ms| ms.trim().parse::<f64>().ok())
            .map(|ms| ms / 1000.0);
        let mut row = Row::new();
        row.insert("id".into(), self.id.into());
        row.insert("task_id".into(), task_id.into());
        row.insert("user_id".into(), self.user.map(|user| user.id).into());
        row.insert("team_id".into(), self.team_id.into());
        row.insert("billable".into(), self.billable.into());
        row.insert("description".into(), self.description.into());
        row.insert("start".into(), timestamp(self.start).into());
        row.insert("end".into(), timestamp(self.end).into());
        row.insert("duration".into(), duration.into());
        row.insert("at".into(), timestamp(self.at).into());
        append_extra(&mut row, self.extra);
        row
    }
}

fn append_extra(row: &mut Row, extra: Map<String, Value>) {
    for (key, value) in extra {
        row.entry(key).or_insert(value);
    }
}

/// Converts a ClickUp epoch-milliseconds string to RFC 3339 UTC.
pub fn timestamp(millis: Option<String>) -> Option<String> {
    let millis: i64 = millis?.trim().parse().ok()?;
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Number(value)) => Ok(Some(value.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
