//! Domain types for the tracker backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
  ($name:ident) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(pub u64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl FromStr for $name {
      type Err = std::num::ParseIntError;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
      }
    }
  };
}

id_type!(ProjectId);
id_type!(IssueId);
id_type!(UserId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: UserId,
  pub username: String,
  #[serde(default)]
  pub email: String,
}

/// Collaborator role. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
  Admin,
  Member,
  Guest,
}

impl Role {
  pub const ALL: [Role; 3] = [Role::Admin, Role::Member, Role::Guest];

  pub fn as_str(self) -> &'static str {
    match self {
      Role::Admin => "ADMIN",
      Role::Member => "MEMBER",
      Role::Guest => "GUEST",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Role::ALL
      .into_iter()
      .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| format!("unknown role '{}' (expected ADMIN, MEMBER or GUEST)", s))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
  pub role: Role,
  pub user: User,
}

impl Collaborator {
  /// Whether this collaborator may remove or re-role `other`.
  ///
  /// Only admins manage collaborators, and never themselves.
  pub fn can_manage(&self, other: &Collaborator) -> bool {
    self.role == Role::Admin && self.user.id != other.user.id
  }
}

/// Issue status. Declaration order is board column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Status {
  Backlog,
  Todo,
  #[serde(rename = "In Progress")]
  InProgress,
  Done,
  Canceled,
}

impl Status {
  pub const ALL: [Status; 5] = [
    Status::Backlog,
    Status::Todo,
    Status::InProgress,
    Status::Done,
    Status::Canceled,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Status::Backlog => "Backlog",
      Status::Todo => "Todo",
      Status::InProgress => "In Progress",
      Status::Done => "Done",
      Status::Canceled => "Canceled",
    }
  }

  /// Position in the fixed status order.
  pub fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Status {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = normalize_name(s);
    Status::ALL
      .into_iter()
      .find(|st| normalize_name(st.name()) == wanted)
      .ok_or_else(|| format!("unknown status '{}'", s))
  }
}

/// Issue priority, ordered Low < Medium < High < Urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Priority {
  Low,
  Medium,
  High,
  Urgent,
}

impl Priority {
  pub const ALL: [Priority; 4] = [
    Priority::Low,
    Priority::Medium,
    Priority::High,
    Priority::Urgent,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Priority::Low => "Low",
      Priority::Medium => "Medium",
      Priority::High => "High",
      Priority::Urgent => "Urgent",
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Priority {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = normalize_name(s);
    if wanted == "normal" {
      return Ok(Priority::Medium);
    }
    Priority::ALL
      .into_iter()
      .find(|p| normalize_name(p.name()) == wanted)
      .ok_or_else(|| format!("unknown priority '{}'", s))
  }
}

/// Lowercase and drop separators so "In Progress", "in_progress" and
/// "IN-PROGRESS" compare equal.
fn normalize_name(s: &str) -> String {
  s.chars()
    .filter(|c| c.is_alphanumeric())
    .flat_map(char::to_lowercase)
    .collect()
}

/// Status and priority arrive either as a bare name or as `{ id, name }`.
/// Only the name is trusted; numeric ids differ between backend versions.
#[derive(Deserialize)]
#[serde(untagged)]
enum NamedRef {
  Name(String),
  Object { name: String },
}

impl NamedRef {
  fn into_name(self) -> String {
    match self {
      NamedRef::Name(n) | NamedRef::Object { name: n } => n,
    }
  }
}

impl<'de> Deserialize<'de> for Status {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let name = NamedRef::deserialize(deserializer)?.into_name();
    name.parse().map_err(serde::de::Error::custom)
  }
}

impl<'de> Deserialize<'de> for Priority {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let name = NamedRef::deserialize(deserializer)?.into_name();
    name.parse().map_err(serde::de::Error::custom)
  }
}

/// Issue as embedded in a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
  pub id: IssueId,
  pub title: String,
  pub status: Status,
  pub priority: Priority,
  #[serde(default)]
  pub assigned_to_user_id: Option<UserId>,
}

/// Full issue details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
  pub id: IssueId,
  pub created_by: User,
  #[serde(default)]
  pub assigned_to: Option<User>,
  pub project: ProjectId,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  pub status: Status,
  pub priority: Priority,
  pub date_created: DateTime<Utc>,
  #[serde(default)]
  pub date_modified: Option<DateTime<Utc>>,
}

/// Full project details, including collaborators and issue summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: ProjectId,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  pub created_by: User,
  #[serde(default)]
  pub collaborators: Vec<Collaborator>,
  #[serde(default)]
  pub issues: Vec<IssueSummary>,
  pub date_created: DateTime<Utc>,
  pub date_modified: DateTime<Utc>,
}

impl Project {
  pub fn collaborator(&self, user_id: UserId) -> Option<&Collaborator> {
    self.collaborators.iter().find(|c| c.user.id == user_id)
  }

  pub fn collaborator_by_username(&self, username: &str) -> Option<&Collaborator> {
    self
      .collaborators
      .iter()
      .find(|c| c.user.username == username)
  }
}

/// Project row for list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
  pub id: ProjectId,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  pub date_modified: DateTime<Utc>,
  #[serde(default)]
  pub total_issues: u32,
  #[serde(default)]
  pub done_issues: u32,
}
