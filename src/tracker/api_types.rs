//! Request payloads for tracker writes.
//!
//! Each resource has one request enum covering all of its writes. The enum
//! variant decides method, path and body, and names the [`Mutation`] whose
//! invalidations run once the backend accepts it.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::validate::{self, ValidationError};

use super::cache::Mutation;
use super::types::{IssueId, Priority, ProjectId, Role, Status, UserId};

/// A write against the tracker backend.
pub trait MutationRequest {
  fn method(&self) -> Method;

  /// Path relative to the API base URL
  fn path(&self) -> String;

  /// JSON body, if the request has one
  fn body(&self) -> serde_json::Result<Option<Value>>;

  /// The mutation this request performs once it succeeds
  fn mutation(&self) -> Mutation;

  /// Field checks that can be done without the backend
  fn validate(&self) -> Result<(), ValidationError> {
    Ok(())
  }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFields {
  pub name: String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectMutationRequest {
  Create(ProjectFields),
  Update {
    project_id: ProjectId,
    fields: ProjectFields,
  },
  Delete {
    project_id: ProjectId,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectBody<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  project_id: Option<ProjectId>,
  name: &'a str,
  description: &'a str,
}

impl ProjectFields {
  fn body(&self, project_id: Option<ProjectId>) -> serde_json::Result<Value> {
    serde_json::to_value(ProjectBody {
      project_id,
      name: self.name.trim(),
      description: self.description.as_deref().unwrap_or(""),
    })
  }
}

impl MutationRequest for ProjectMutationRequest {
  fn method(&self) -> Method {
    match self {
      Self::Create(_) => Method::POST,
      Self::Update { .. } => Method::PUT,
      Self::Delete { .. } => Method::DELETE,
    }
  }

  fn path(&self) -> String {
    match self {
      Self::Create(_) => "/projects".to_string(),
      Self::Update { project_id, .. } | Self::Delete { project_id } => {
        format!("/projects/{}", project_id)
      }
    }
  }

  fn body(&self) -> serde_json::Result<Option<Value>> {
    match self {
      Self::Create(fields) => fields.body(None).map(Some),
      Self::Update { project_id, fields } => fields.body(Some(*project_id)).map(Some),
      Self::Delete { .. } => Ok(None),
    }
  }

  fn mutation(&self) -> Mutation {
    match *self {
      Self::Create(_) => Mutation::CreateProject,
      Self::Update { project_id, .. } => Mutation::UpdateProject { project_id },
      Self::Delete { project_id } => Mutation::DeleteProject { project_id },
    }
  }

  fn validate(&self) -> Result<(), ValidationError> {
    match self {
      Self::Create(fields) | Self::Update { fields, .. } => validate::project_name(&fields.name),
      Self::Delete { .. } => Ok(()),
    }
  }
}

// ============================================================================
// Issues
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFields {
  pub title: String,
  pub description: Option<String>,
  pub status: Status,
  pub priority: Priority,
  /// Username of the assignee
  pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueMutationRequest {
  Create {
    project_id: ProjectId,
    fields: IssueFields,
  },
  Update {
    project_id: ProjectId,
    issue_id: IssueId,
    fields: IssueFields,
  },
  Delete {
    project_id: ProjectId,
    issue_id: IssueId,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueBody<'a> {
  project_id: ProjectId,
  title: &'a str,
  description: Option<&'a str>,
  status_name: Status,
  priority_name: Priority,
  assigned_to_username: Option<&'a str>,
}

impl IssueMutationRequest {
  pub fn project_id(&self) -> ProjectId {
    match *self {
      Self::Create { project_id, .. }
      | Self::Update { project_id, .. }
      | Self::Delete { project_id, .. } => project_id,
    }
  }

  pub fn fields(&self) -> Option<&IssueFields> {
    match self {
      Self::Create { fields, .. } | Self::Update { fields, .. } => Some(fields),
      Self::Delete { .. } => None,
    }
  }
}

impl MutationRequest for IssueMutationRequest {
  fn method(&self) -> Method {
    match self {
      Self::Create { .. } => Method::POST,
      Self::Update { .. } => Method::PUT,
      Self::Delete { .. } => Method::DELETE,
    }
  }

  fn path(&self) -> String {
    match self {
      Self::Create { project_id, .. } => format!("/projects/{}/issues/create", project_id),
      Self::Update {
        project_id,
        issue_id,
        ..
      }
      | Self::Delete {
        project_id,
        issue_id,
      } => format!("/projects/{}/issues/{}", project_id, issue_id),
    }
  }

  fn body(&self) -> serde_json::Result<Option<Value>> {
    let Some(fields) = self.fields() else {
      return Ok(None);
    };
    let body = IssueBody {
      project_id: self.project_id(),
      title: fields.title.trim(),
      description: fields.description.as_deref(),
      status_name: fields.status,
      priority_name: fields.priority,
      assigned_to_username: fields.assignee.as_deref(),
    };
    serde_json::to_value(body).map(Some)
  }

  fn mutation(&self) -> Mutation {
    match *self {
      Self::Create { project_id, .. } => Mutation::CreateIssue { project_id },
      Self::Update {
        project_id,
        issue_id,
        ..
      } => Mutation::UpdateIssue {
        project_id,
        issue_id,
      },
      Self::Delete {
        project_id,
        issue_id,
      } => Mutation::DeleteIssue {
        project_id,
        issue_id,
      },
    }
  }

  fn validate(&self) -> Result<(), ValidationError> {
    match self.fields() {
      Some(fields) => validate::issue_title(&fields.title),
      None => Ok(()),
    }
  }
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorMutationRequest {
  Add {
    project_id: ProjectId,
    username: String,
    role: Role,
  },
  ChangeRole {
    project_id: ProjectId,
    user_id: UserId,
    role: Role,
  },
  Remove {
    project_id: ProjectId,
    user_id: UserId,
  },
}

#[derive(Serialize)]
struct AddCollaboratorBody<'a> {
  username: &'a str,
  role: Role,
}

#[derive(Serialize)]
struct RoleBody {
  role: Role,
}

impl CollaboratorMutationRequest {
  pub fn project_id(&self) -> ProjectId {
    match *self {
      Self::Add { project_id, .. }
      | Self::ChangeRole { project_id, .. }
      | Self::Remove { project_id, .. } => project_id,
    }
  }

  /// The existing collaborator this request acts on, if any.
  pub fn target(&self) -> Option<UserId> {
    match *self {
      Self::Add { .. } => None,
      Self::ChangeRole { user_id, .. } | Self::Remove { user_id, .. } => Some(user_id),
    }
  }
}

impl MutationRequest for CollaboratorMutationRequest {
  fn method(&self) -> Method {
    match self {
      Self::Add { .. } => Method::POST,
      Self::ChangeRole { .. } => Method::PUT,
      Self::Remove { .. } => Method::DELETE,
    }
  }

  fn path(&self) -> String {
    match self {
      Self::Add { project_id, .. } => format!("/projects/{}/collaborators", project_id),
      Self::ChangeRole {
        project_id,
        user_id,
        ..
      }
      | Self::Remove {
        project_id,
        user_id,
      } => format!("/projects/{}/collaborators/{}", project_id, user_id),
    }
  }

  fn body(&self) -> serde_json::Result<Option<Value>> {
    match self {
      Self::Add { username, role, .. } => serde_json::to_value(AddCollaboratorBody {
        username: username.trim(),
        role: *role,
      })
      .map(Some),
      Self::ChangeRole { role, .. } => serde_json::to_value(RoleBody { role: *role }).map(Some),
      Self::Remove { .. } => Ok(None),
    }
  }

  fn mutation(&self) -> Mutation {
    match *self {
      Self::Add { project_id, .. } => Mutation::AddCollaborator { project_id },
      Self::ChangeRole {
        project_id,
        user_id,
        ..
      } => Mutation::ChangeCollaboratorRole {
        project_id,
        user_id,
      },
      Self::Remove {
        project_id,
        user_id,
      } => Mutation::RemoveCollaborator {
        project_id,
        user_id,
      },
    }
  }

  fn validate(&self) -> Result<(), ValidationError> {
    match self {
      Self::Add { username, .. } if username.trim().is_empty() => {
        Err(ValidationError::UsernameMissing)
      }
      _ => Ok(()),
    }
  }
}
