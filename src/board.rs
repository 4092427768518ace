//! Board derivation: group a project's issues into the fixed status columns.

use crate::tracker::types::{Collaborator, IssueSummary, Status};

/// One status column of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn {
  pub status: Status,
  pub issues: Vec<IssueSummary>,
}

/// The five board columns, always in [`Status::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
  pub columns: [BoardColumn; 5],
}

impl Board {
  pub fn column(&self, status: Status) -> &BoardColumn {
    &self.columns[status.index()]
  }

  /// Number of issues per status, in column order.
  pub fn counts(&self) -> [(Status, usize); 5] {
    Status::ALL.map(|status| (status, self.column(status).issues.len()))
  }

  pub fn total(&self) -> usize {
    self.columns.iter().map(|c| c.issues.len()).sum()
  }
}

/// Group issues by status and order each column by priority, highest first.
///
/// The sort is stable: issues of equal priority keep their input order.
/// Every status gets a column, empty or not.
pub fn derive_board(issues: &[IssueSummary]) -> Board {
  let mut columns = Status::ALL.map(|status| BoardColumn {
    status,
    issues: Vec::new(),
  });

  for issue in issues {
    columns[issue.status.index()].issues.push(issue.clone());
  }
  for column in &mut columns {
    column
      .issues
      .sort_by(|a, b| b.priority.cmp(&a.priority));
  }

  Board { columns }
}

/// Collaborators ordered ADMIN, MEMBER, GUEST; stable within a role.
pub fn sort_collaborators(collaborators: &[Collaborator]) -> Vec<Collaborator> {
  let mut sorted = collaborators.to_vec();
  sorted.sort_by_key(|c| c.role);
  sorted
}
