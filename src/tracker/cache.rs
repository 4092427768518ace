//! Query keys and the invalidation policy for tracker data.
//!
//! Every cached read is stored under a [`QueryKey`]. Every write is described
//! by a [`Mutation`], and [`Mutation::invalidations`] lists the keys that must
//! be marked stale once the write succeeds so that no view keeps showing data
//! from before it.

use std::fmt;

use super::types::{IssueId, ProjectId, UserId};

// ============================================================================
// Query keys
// ============================================================================

/// Identifier of a cached query result.
///
/// Keys are plain values: two keys built independently from the same
/// parameters compare and hash equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
  /// `GET /projects`
  AllProjects,
  /// `GET /projects/{id}`
  Project { project_id: ProjectId },
  /// `GET /projects/{id}/issues`
  ProjectIssues { project_id: ProjectId },
  /// `GET /projects/{id}/issues/{issueId}`
  Issue {
    project_id: ProjectId,
    issue_id: IssueId,
  },
}

impl QueryKey {
  pub fn all_projects() -> Self {
    Self::AllProjects
  }

  pub fn project(project_id: ProjectId) -> Self {
    Self::Project { project_id }
  }

  pub fn project_issues(project_id: ProjectId) -> Self {
    Self::ProjectIssues { project_id }
  }

  pub fn issue(project_id: ProjectId, issue_id: IssueId) -> Self {
    Self::Issue {
      project_id,
      issue_id,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AllProjects => write!(f, "projects"),
      Self::Project { project_id } => write!(f, "projects/{}", project_id),
      Self::ProjectIssues { project_id } => write!(f, "projects/{}/issues", project_id),
      Self::Issue {
        project_id,
        issue_id,
      } => write!(f, "projects/{}/issues/{}", project_id, issue_id),
    }
  }
}

// ============================================================================
// Invalidation
// ============================================================================

/// A set of cached queries to mark stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invalidation {
  /// Exactly this key
  Key(QueryKey),
  /// Every cached issue detail of a project
  IssuesOf(ProjectId),
  /// Everything
  All,
}

impl Invalidation {
  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      Self::Key(k) => k == key,
      Self::IssuesOf(project_id) => {
        matches!(key, QueryKey::Issue { project_id: p, .. } if p == project_id)
      }
      Self::All => true,
    }
  }
}

impl From<QueryKey> for Invalidation {
  fn from(key: QueryKey) -> Self {
    Self::Key(key)
  }
}

// ============================================================================
// Mutations
// ============================================================================

/// A successful write against the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
  CreateProject,
  UpdateProject {
    project_id: ProjectId,
  },
  DeleteProject {
    project_id: ProjectId,
  },
  CreateIssue {
    project_id: ProjectId,
  },
  UpdateIssue {
    project_id: ProjectId,
    issue_id: IssueId,
  },
  DeleteIssue {
    project_id: ProjectId,
    issue_id: IssueId,
  },
  AddCollaborator {
    project_id: ProjectId,
  },
  ChangeCollaboratorRole {
    project_id: ProjectId,
    user_id: UserId,
  },
  RemoveCollaborator {
    project_id: ProjectId,
    user_id: UserId,
  },
}

impl Mutation {
  /// Queries that must be marked stale after this mutation succeeds.
  pub fn invalidations(&self) -> Vec<Invalidation> {
    match *self {
      Self::CreateProject => vec![QueryKey::all_projects().into()],
      Self::UpdateProject { project_id } => vec![
        QueryKey::all_projects().into(),
        QueryKey::project(project_id).into(),
      ],
      Self::DeleteProject { project_id } => vec![
        QueryKey::all_projects().into(),
        QueryKey::project(project_id).into(),
        QueryKey::project_issues(project_id).into(),
        Invalidation::IssuesOf(project_id),
      ],
      // Project views embed issue summaries, and the list view shows counts.
      Self::CreateIssue { project_id } => vec![
        QueryKey::all_projects().into(),
        QueryKey::project(project_id).into(),
        QueryKey::project_issues(project_id).into(),
      ],
      Self::UpdateIssue {
        project_id,
        issue_id,
      }
      | Self::DeleteIssue {
        project_id,
        issue_id,
      } => vec![
        QueryKey::issue(project_id, issue_id).into(),
        QueryKey::project(project_id).into(),
        QueryKey::project_issues(project_id).into(),
        QueryKey::all_projects().into(),
      ],
      // Issue details carry the assignee as a full user record, so they
      // go stale together with the collaborator list.
      Self::AddCollaborator { project_id }
      | Self::ChangeCollaboratorRole { project_id, .. }
      | Self::RemoveCollaborator { project_id, .. } => vec![
        QueryKey::project(project_id).into(),
        Invalidation::IssuesOf(project_id),
      ],
    }
  }

  /// Whether any of this mutation's invalidations covers `key`.
  pub fn invalidates(&self, key: &QueryKey) -> bool {
    self.invalidations().iter().any(|inv| inv.matches(key))
  }
}
