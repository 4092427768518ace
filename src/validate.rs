//! Field validation for mutation forms.
//!
//! Everything here runs before a request is built; a failing field never
//! reaches the backend.

use thiserror::Error;

use crate::tracker::types::Project;

pub const PROJECT_NAME_MIN: usize = 3;
pub const PROJECT_NAME_MAX: usize = 100;
pub const ISSUE_TITLE_MIN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("A project name is required")]
  ProjectNameMissing,

  #[error("Project name must be at least 3 characters")]
  ProjectNameTooShort,

  #[error("Project name must be at most 100 characters")]
  ProjectNameTooLong,

  #[error("An issue title is required")]
  IssueTitleMissing,

  #[error("Issue title must be at least 3 characters")]
  IssueTitleTooShort,

  #[error("'{0}' is not a collaborator of this project")]
  AssigneeNotCollaborator(String),

  #[error("'{0}' is already a collaborator of this project")]
  AlreadyCollaborator(String),

  #[error("A username is required")]
  UsernameMissing,
}

pub fn project_name(name: &str) -> Result<(), ValidationError> {
  let len = name.trim().chars().count();
  if len == 0 {
    Err(ValidationError::ProjectNameMissing)
  } else if len < PROJECT_NAME_MIN {
    Err(ValidationError::ProjectNameTooShort)
  } else if len > PROJECT_NAME_MAX {
    Err(ValidationError::ProjectNameTooLong)
  } else {
    Ok(())
  }
}

pub fn issue_title(title: &str) -> Result<(), ValidationError> {
  let len = title.trim().chars().count();
  if len == 0 {
    Err(ValidationError::IssueTitleMissing)
  } else if len < ISSUE_TITLE_MIN {
    Err(ValidationError::IssueTitleTooShort)
  } else {
    Ok(())
  }
}

/// An assignee, when given, must currently collaborate on the project.
pub fn assignee(project: &Project, username: Option<&str>) -> Result<(), ValidationError> {
  match username {
    Some(name) if project.collaborator_by_username(name).is_none() => {
      Err(ValidationError::AssigneeNotCollaborator(name.to_string()))
    }
    _ => Ok(()),
  }
}

/// A user appears at most once in a project's collaborator list.
pub fn new_collaborator(project: &Project, username: &str) -> Result<(), ValidationError> {
  let username = username.trim();
  if username.is_empty() {
    return Err(ValidationError::UsernameMissing);
  }
  if project.collaborator_by_username(username).is_some() {
    return Err(ValidationError::AlreadyCollaborator(username.to_string()));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tracker::types::{Collaborator, ProjectId, Role, User, UserId};
  use chrono::Utc;

  fn project_with(usernames: &[&str]) -> Project {
    let users: Vec<User> = usernames
      .iter()
      .enumerate()
      .map(|(i, name)| User {
        id: UserId(i as u64 + 1),
        username: name.to_string(),
        email: format!("{}@example.com", name),
      })
      .collect();
    Project {
      id: ProjectId(1),
      name: "Board".into(),
      description: None,
      created_by: users[0].clone(),
      collaborators: users
        .into_iter()
        .map(|user| Collaborator {
          role: Role::Member,
          user,
        })
        .collect(),
      issues: Vec::new(),
      date_created: Utc::now(),
      date_modified: Utc::now(),
    }
  }

  #[test]
  fn test_project_name_bounds() {
    assert_eq!(project_name(""), Err(ValidationError::ProjectNameMissing));
    assert_eq!(project_name("  "), Err(ValidationError::ProjectNameMissing));
    assert_eq!(project_name("ab"), Err(ValidationError::ProjectNameTooShort));
    assert_eq!(project_name("abc"), Ok(()));
    assert_eq!(project_name(&"x".repeat(100)), Ok(()));
    assert_eq!(
      project_name(&"x".repeat(101)),
      Err(ValidationError::ProjectNameTooLong)
    );
  }

  #[test]
  fn test_issue_title() {
    assert_eq!(issue_title(""), Err(ValidationError::IssueTitleMissing));
    assert_eq!(issue_title("no"), Err(ValidationError::IssueTitleTooShort));
    assert_eq!(issue_title("Fix login"), Ok(()));
  }

  #[test]
  fn test_assignee_must_collaborate() {
    let project = project_with(&["ana", "bo"]);
    assert_eq!(assignee(&project, None), Ok(()));
    assert_eq!(assignee(&project, Some("bo")), Ok(()));
    assert_eq!(
      assignee(&project, Some("cy")),
      Err(ValidationError::AssigneeNotCollaborator("cy".into()))
    );
  }

  #[test]
  fn test_duplicate_collaborator_rejected() {
    let project = project_with(&["ana"]);
    assert_eq!(
      new_collaborator(&project, "ana"),
      Err(ValidationError::AlreadyCollaborator("ana".into()))
    );
    assert_eq!(
      new_collaborator(&project, " ana "),
      Err(ValidationError::AlreadyCollaborator("ana".into()))
    );
    assert_eq!(new_collaborator(&project, "bo"), Ok(()));
    assert_eq!(new_collaborator(&project, ""), Err(ValidationError::UsernameMissing));
  }

  #[test]
  fn test_messages() {
    assert_eq!(
      ValidationError::ProjectNameTooShort.to_string(),
      "Project name must be at least 3 characters"
    );
  }
}
