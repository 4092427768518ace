//! Plain-text rendering of tracker data for the terminal.

use chrono::{DateTime, Utc};
use crossterm::style::{Color, Stylize};
use std::fmt::Write;

use crate::board::{sort_collaborators, Board};
use crate::cache::{CacheResult, CacheSource};
use crate::tracker::types::{
  Collaborator, Issue, IssueSummary, Priority, Project, ProjectSummary, Role, Status, UserId,
};

/// Truncate a string to at most `max_len` characters, ending in "..." if cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn status_color(status: Status) -> Color {
  match status {
    Status::Done => Color::Green,
    Status::InProgress => Color::Yellow,
    Status::Todo => Color::Cyan,
    Status::Canceled => Color::DarkGrey,
    Status::Backlog => Color::White,
  }
}

pub fn priority_color(priority: Priority) -> Color {
  match priority {
    Priority::Urgent => Color::Red,
    Priority::High => Color::Magenta,
    Priority::Medium => Color::Blue,
    Priority::Low => Color::Grey,
  }
}

fn role_color(role: Role) -> Color {
  match role {
    Role::Admin => Color::Red,
    Role::Member => Color::Blue,
    Role::Guest => Color::Grey,
  }
}

/// Writes text with or without ANSI colours.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
  color: bool,
}

impl Painter {
  pub fn new(color: bool) -> Self {
    Self { color }
  }

  /// Colour when stdout is a terminal and `NO_COLOR` is unset.
  pub fn for_stdout() -> Self {
    use std::io::IsTerminal;
    Self::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none())
  }

  fn paint(&self, text: &str, color: Color) -> String {
    if self.color {
      text.with(color).to_string()
    } else {
      text.to_string()
    }
  }

  fn bold(&self, text: &str) -> String {
    if self.color {
      text.bold().to_string()
    } else {
      text.to_string()
    }
  }

  pub fn project_list(&self, projects: &[ProjectSummary]) -> String {
    if projects.is_empty() {
      return "No projects yet. Create one with `kanbo project create <NAME>`.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{}", self.bold(&format!("{:<6} {:<32} {:>9}  {}", "ID", "NAME", "DONE", "UPDATED")));
    for project in projects {
      let progress = format!("{}/{}", project.done_issues, project.total_issues);
      let _ = writeln!(
        out,
        "{:<6} {:<32} {:>9}  {}",
        project.id,
        truncate(&project.name, 32),
        progress,
        format_date(project.date_modified),
      );
    }
    out
  }

  pub fn project_detail(&self, project: &Project) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", self.bold(&project.name), self.paint(&format!("#{}", project.id), Color::DarkGrey));
    if let Some(description) = project.description.as_deref().filter(|d| !d.is_empty()) {
      let _ = writeln!(out, "{}", description);
    }
    let _ = writeln!(
      out,
      "Created by {} on {}, updated {}",
      project.created_by.username,
      format_date(project.date_created),
      format_date(project.date_modified),
    );
    let _ = writeln!(out);
    out.push_str(&self.collaborators(&project.collaborators));
    out
  }

  pub fn collaborators(&self, collaborators: &[Collaborator]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", self.bold(&format!("Collaborators ({})", collaborators.len())));
    for collaborator in sort_collaborators(collaborators) {
      let role = format!("{:<7}", collaborator.role.as_str());
      let _ = writeln!(
        out,
        "  {:<6} {} {} <{}>",
        collaborator.user.id,
        self.paint(&role, role_color(collaborator.role)),
        collaborator.user.username,
        collaborator.user.email,
      );
    }
    out
  }

  /// One section per status column, issues listed highest priority first.
  pub fn board(&self, board: &Board, project: Option<&Project>) -> String {
    let mut out = String::new();
    for column in &board.columns {
      let header = format!("{} ({})", column.status.name().to_uppercase(), column.issues.len());
      let _ = writeln!(out, "{}", self.bold(&self.paint(&header, status_color(column.status))));
      for issue in &column.issues {
        let _ = writeln!(out, "  {}", self.issue_line(issue, project));
      }
    }
    out
  }

  pub fn issue_list(&self, issues: &[IssueSummary], project: Option<&Project>) -> String {
    if issues.is_empty() {
      return "No issues.\n".to_string();
    }
    let mut out = String::new();
    for issue in issues {
      let status = format!("{:<12}", issue.status.name());
      let _ = writeln!(
        out,
        "{} {}",
        self.paint(&status, status_color(issue.status)),
        self.issue_line(issue, project)
      );
    }
    out
  }

  fn issue_line(&self, issue: &IssueSummary, project: Option<&Project>) -> String {
    let priority = format!("{:<6}", issue.priority.name());
    let mut line = format!(
      "#{:<5} {} {}",
      issue.id,
      self.paint(&priority, priority_color(issue.priority)),
      truncate(&issue.title, 60)
    );
    if let Some(name) = assignee_name(issue.assigned_to_user_id, project) {
      let _ = write!(line, " {}", self.paint(&format!("@{}", name), Color::DarkGrey));
    }
    line
  }

  pub fn issue_detail(&self, issue: &Issue) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", self.paint(&format!("#{}", issue.id), Color::DarkGrey), self.bold(&issue.title));
    let _ = writeln!(
      out,
      "Status:   {}",
      self.paint(issue.status.name(), status_color(issue.status))
    );
    let _ = writeln!(
      out,
      "Priority: {}",
      self.paint(issue.priority.name(), priority_color(issue.priority))
    );
    let assignee = issue
      .assigned_to
      .as_ref()
      .map(|u| u.username.as_str())
      .unwrap_or("unassigned");
    let _ = writeln!(out, "Assignee: {}", assignee);
    let _ = writeln!(
      out,
      "Created:  {} by {}",
      format_date(issue.date_created),
      issue.created_by.username
    );
    if let Some(modified) = issue.date_modified {
      let _ = writeln!(out, "Updated:  {}", format_date(modified));
    }
    if let Some(description) = issue.description.as_deref().filter(|d| !d.is_empty()) {
      let _ = writeln!(out);
      let _ = writeln!(out, "{}", description);
    }
    out
  }

  /// Footnote for data that did not come fresh from the backend.
  pub fn source_note<T>(&self, result: &CacheResult<T>) -> Option<String> {
    match (result.source, result.cached_at) {
      (CacheSource::Offline, Some(at)) => Some(self.paint(
        &format!("Offline: showing data cached at {}", format_time(at)),
        Color::Yellow,
      )),
      (CacheSource::Offline, None) => Some(self.paint("Offline: showing cached data", Color::Yellow)),
      _ => None,
    }
  }
}

fn assignee_name(user_id: Option<UserId>, project: Option<&Project>) -> Option<String> {
  let user_id = user_id?;
  match project.and_then(|p| p.collaborator(user_id)) {
    Some(collaborator) => Some(collaborator.user.username.clone()),
    None => Some(format!("user {}", user_id)),
  }
}

fn format_date(at: DateTime<Utc>) -> String {
  at.format("%Y-%m-%d").to_string()
}

fn format_time(at: DateTime<Utc>) -> String {
  at.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::board::derive_board;
  use crate::tracker::types::{IssueId, ProjectId, User};
  use chrono::TimeZone;

  fn issue(id: u64, title: &str, status: Status, priority: Priority) -> IssueSummary {
    IssueSummary {
      id: IssueId(id),
      title: title.to_string(),
      status,
      priority,
      assigned_to_user_id: None,
    }
  }

  fn project() -> Project {
    let ana = User {
      id: UserId(1),
      username: "ana".into(),
      email: "ana@example.com".into(),
    };
    let bo = User {
      id: UserId(2),
      username: "bo".into(),
      email: "bo@example.com".into(),
    };
    Project {
      id: ProjectId(1),
      name: "Apollo".into(),
      description: Some("Moon".into()),
      created_by: ana.clone(),
      collaborators: vec![
        Collaborator {
          role: Role::Guest,
          user: bo,
        },
        Collaborator {
          role: Role::Admin,
          user: ana,
        },
      ],
      issues: Vec::new(),
      date_created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      date_modified: Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap(),
    }
  }

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("héllo wörld", 8), "héllo...");
  }

  #[test]
  fn test_status_colors() {
    assert_eq!(status_color(Status::Done), Color::Green);
    assert_eq!(status_color(Status::InProgress), Color::Yellow);
    assert_eq!(status_color(Status::Backlog), Color::White);
  }

  #[test]
  fn test_board_lists_every_column_in_order() {
    let board = derive_board(&[
      issue(1, "Low one", Status::Todo, Priority::Low),
      issue(2, "Urgent one", Status::Todo, Priority::Urgent),
    ]);
    let text = Painter::new(false).board(&board, None);
    let headers: Vec<&str> = text.lines().filter(|l| !l.starts_with(' ')).collect();
    assert_eq!(
      headers,
      vec!["BACKLOG (0)", "TODO (2)", "IN PROGRESS (0)", "DONE (0)", "CANCELED (0)"]
    );

    let urgent = text.find("Urgent one").unwrap();
    let low = text.find("Low one").unwrap();
    assert!(urgent < low);
  }

  #[test]
  fn test_assignee_resolved_from_project() {
    let mut summary = issue(3, "Wire it", Status::Done, Priority::High);
    summary.assigned_to_user_id = Some(UserId(2));
    let project = project();
    let text = Painter::new(false).issue_list(&[summary.clone()], Some(&project));
    assert!(text.contains("@bo"));

    summary.assigned_to_user_id = Some(UserId(9));
    let text = Painter::new(false).issue_list(&[summary], Some(&project));
    assert!(text.contains("@user 9"));
  }

  #[test]
  fn test_collaborators_admin_first() {
    let text = Painter::new(false).project_detail(&project());
    let ana = text.find("ana <").unwrap();
    let bo = text.find("bo <").unwrap();
    assert!(ana < bo);
    assert!(text.contains("Created by ana on 2024-01-01, updated 2024-02-03"));
  }

  #[test]
  fn test_plain_painter_has_no_escapes() {
    let text = Painter::new(false).project_detail(&project());
    assert!(!text.contains('\u{1b}'));
  }

  #[test]
  fn test_offline_note() {
    let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 0).unwrap();
    let painter = Painter::new(false);
    assert_eq!(
      painter.source_note(&CacheResult::offline(1, at)).as_deref(),
      Some("Offline: showing data cached at 2024-05-06 07:08 UTC")
    );
    assert_eq!(painter.source_note(&CacheResult::from_network(1)), None);
  }
}
