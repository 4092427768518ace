//! Subcommands and their handlers.

use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::time::Duration;
use tracing::info;

use crate::board::derive_board;
use crate::config::Config;
use crate::error::{ApiError, ErrorKind};
use crate::query::Query;
use crate::render::Painter;
use crate::session::{sign_in_url, sign_out_url, Session, SessionStore};
use crate::tracker::api_types::{IssueFields, ProjectFields};
use crate::tracker::cache::QueryKey;
use crate::tracker::types::{Issue, IssueId, Priority, Project, ProjectId, Role, Status, UserId};
use crate::tracker::CachedTrackerClient;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Store an access token issued by the identity provider
  Login {
    /// Access token; read from stdin when omitted
    #[arg(long)]
    token: Option<String>,
    /// Your username, used to check collaborator permissions locally
    #[arg(long)]
    username: Option<String>,
    /// Token lifetime in seconds
    #[arg(long)]
    expires_in: Option<i64>,
  },
  /// Forget the stored access token
  Logout,
  /// List projects
  Projects,
  /// Show or change a project
  Project {
    #[command(subcommand)]
    action: ProjectAction,
  },
  /// Show the kanban board of a project
  Board {
    /// Redraw whenever the project changes
    #[arg(short, long)]
    watch: bool,
    /// Seconds between refreshes in watch mode
    #[arg(long, default_value_t = 10)]
    interval: u64,
  },
  /// Manage the collaborators of a project
  Collaborators {
    #[command(subcommand)]
    action: CollaboratorAction,
  },
  /// List the issues of a project
  Issues,
  /// Show or change an issue
  Issue {
    #[command(subcommand)]
    action: IssueAction,
  },
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
  Show {
    id: ProjectId,
  },
  Create {
    name: String,
    #[arg(short, long)]
    description: Option<String>,
  },
  Edit {
    id: ProjectId,
    #[arg(short, long)]
    name: Option<String>,
    #[arg(short, long)]
    description: Option<String>,
  },
  Delete {
    id: ProjectId,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum CollaboratorAction {
  List,
  Add {
    username: String,
    #[arg(short, long, default_value = "MEMBER")]
    role: Role,
  },
  /// Change the role of a collaborator (username or user id)
  Role { user: String, role: Role },
  /// Remove a collaborator (username or user id)
  Remove { user: String },
}

#[derive(Subcommand, Debug)]
pub enum IssueAction {
  Show {
    id: IssueId,
  },
  Create {
    title: String,
    #[command(flatten)]
    fields: IssueEdits,
  },
  Edit {
    id: IssueId,
    #[arg(short, long)]
    title: Option<String>,
    #[command(flatten)]
    fields: IssueEdits,
    /// Clear the assignee
    #[arg(long, conflicts_with = "assignee")]
    unassign: bool,
  },
  Delete {
    id: IssueId,
    #[arg(short, long)]
    yes: bool,
  },
}

/// Optional issue fields shared by create and edit.
#[derive(Args, Debug, Default)]
pub struct IssueEdits {
  #[arg(short, long)]
  pub description: Option<String>,
  /// Backlog, Todo, "In Progress", Done or Canceled
  #[arg(short, long)]
  pub status: Option<Status>,
  /// Low, Medium, High or Urgent
  #[arg(short = 'P', long)]
  pub priority: Option<Priority>,
  /// Username of a project collaborator
  #[arg(short, long)]
  pub assignee: Option<String>,
}

impl IssueEdits {
  /// Fields for a new issue. Unset status and priority default to the
  /// first of their kind.
  fn into_new(self, title: String) -> IssueFields {
    IssueFields {
      title,
      description: self.description,
      status: self.status.unwrap_or(Status::Backlog),
      priority: self.priority.unwrap_or(Priority::Low),
      assignee: self.assignee,
    }
  }

  /// Apply the edits on top of `issue`.
  fn apply(self, issue: &Issue, title: Option<String>, unassign: bool) -> IssueFields {
    let assignee = if unassign {
      None
    } else {
      self
        .assignee
        .or_else(|| issue.assigned_to.as_ref().map(|u| u.username.clone()))
    };
    IssueFields {
      title: title.unwrap_or_else(|| issue.title.clone()),
      description: self.description.or_else(|| issue.description.clone()),
      status: self.status.unwrap_or(issue.status),
      priority: self.priority.unwrap_or(issue.priority),
      assignee,
    }
  }
}

/// Everything a command handler needs.
pub struct Context {
  pub config: Config,
  pub client: CachedTrackerClient,
  pub painter: Painter,
}

impl Context {
  fn project_id(&self) -> Result<ProjectId> {
    self.config.default_project.ok_or_else(|| {
      eyre!("No project selected. Pass --project <ID> or set default_project in the config file")
    })
  }
}

pub async fn run(command: Command, ctx: &Context) -> Result<()> {
  match command {
    Command::Login {
      token,
      username,
      expires_in,
    } => login(ctx, token, username, expires_in),
    Command::Logout => logout(ctx),
    Command::Projects => {
      let projects = ctx.client.projects().await?;
      print!("{}", ctx.painter.project_list(&projects.data));
      print_source_note(ctx, &projects);
      Ok(())
    }
    Command::Project { action } => project(ctx, action).await,
    Command::Board { watch, interval } => {
      let project_id = ctx.project_id()?;
      if watch {
        watch_board(ctx, project_id, Duration::from_secs(interval.max(1))).await
      } else {
        let project = ctx.client.project(project_id).await?;
        print!("{}", board_text(ctx, &project.data));
        print_source_note(ctx, &project);
        Ok(())
      }
    }
    Command::Collaborators { action } => collaborators(ctx, action).await,
    Command::Issues => {
      let project_id = ctx.project_id()?;
      let (issues, project) = tokio::try_join!(
        ctx.client.project_issues(project_id),
        ctx.client.project(project_id)
      )?;
      print!("{}", ctx.painter.issue_list(&issues.data, Some(&project.data)));
      print_source_note(ctx, &issues);
      Ok(())
    }
    Command::Issue { action } => issue(ctx, action).await,
  }
}

fn login(
  ctx: &Context,
  token: Option<String>,
  username: Option<String>,
  expires_in: Option<i64>,
) -> Result<()> {
  let store = SessionStore::for_config(&ctx.config.auth)?;
  let token = match token {
    Some(token) => token,
    None => {
      let url = sign_in_url(&ctx.config.auth)?;
      eprintln!("Sign in at: {}", url);
      eprint!("Paste the access token: ");
      std::io::stderr().flush()?;
      let mut line = String::new();
      std::io::stdin().lock().read_line(&mut line)?;
      line.trim().to_string()
    }
  };
  if token.is_empty() {
    return Err(eyre!("No access token given"));
  }

  let mut session = Session::new(token);
  session.username = username;
  session.expires_at = expires_in.map(|secs| Utc::now() + ChronoDuration::seconds(secs));
  store.save(&session)?;
  info!(path = %store.path().display(), "Signed in");
  println!("Signed in.");
  Ok(())
}

fn logout(ctx: &Context) -> Result<()> {
  SessionStore::for_config(&ctx.config.auth)?.clear()?;
  println!("Signed out locally.");
  println!("To end the provider session too, visit: {}", sign_out_url(&ctx.config.auth)?);
  Ok(())
}

async fn project(ctx: &Context, action: ProjectAction) -> Result<()> {
  match action {
    ProjectAction::Show { id } => {
      let project = ctx.client.project(id).await?;
      print!("{}", ctx.painter.project_detail(&project.data));
      print_source_note(ctx, &project);
    }
    ProjectAction::Create { name, description } => {
      let response = ctx
        .client
        .create_project(ProjectFields { name, description })
        .await?;
      match created_id(&response) {
        Some(id) => println!("Created project {}.", id),
        None => println!("Created project."),
      }
    }
    ProjectAction::Edit {
      id,
      name,
      description,
    } => {
      let current = ctx.client.project(id).await?.data;
      let fields = ProjectFields {
        name: name.unwrap_or(current.name),
        description: description.or(current.description),
      };
      ctx.client.update_project(id, fields).await?;
      println!("Updated project {}.", id);
    }
    ProjectAction::Delete { id, yes } => {
      if !yes && !confirm(&format!("Delete project {} and all of its issues?", id))? {
        return Ok(());
      }
      ctx.client.delete_project(id).await?;
      println!("Deleted project {}.", id);
    }
  }
  Ok(())
}

async fn collaborators(ctx: &Context, action: CollaboratorAction) -> Result<()> {
  let project_id = ctx.project_id()?;
  match action {
    CollaboratorAction::List => {
      let project = ctx.client.project(project_id).await?;
      print!("{}", ctx.painter.collaborators(&project.data.collaborators));
      print_source_note(ctx, &project);
    }
    CollaboratorAction::Add { username, role } => {
      ctx
        .client
        .add_collaborator(project_id, &username, role)
        .await?;
      println!("Added {} as {}.", username.trim(), role);
    }
    CollaboratorAction::Role { user, role } => {
      let project = ctx.client.project(project_id).await?.data;
      let user_id = resolve_collaborator(&project, &user)?;
      ctx
        .client
        .change_collaborator_role(project_id, user_id, role)
        .await?;
      println!("{} is now {}.", user, role);
    }
    CollaboratorAction::Remove { user } => {
      let project = ctx.client.project(project_id).await?.data;
      let user_id = resolve_collaborator(&project, &user)?;
      ctx.client.remove_collaborator(project_id, user_id).await?;
      println!("Removed {}.", user);
    }
  }
  Ok(())
}

async fn issue(ctx: &Context, action: IssueAction) -> Result<()> {
  let project_id = ctx.project_id()?;
  match action {
    IssueAction::Show { id } => {
      let issue = ctx.client.issue(project_id, id).await?;
      print!("{}", ctx.painter.issue_detail(&issue.data));
      print_source_note(ctx, &issue);
    }
    IssueAction::Create { title, fields } => {
      let response = ctx
        .client
        .create_issue(project_id, fields.into_new(title))
        .await?;
      match created_id(&response) {
        Some(id) => println!("Created issue {}.", id),
        None => println!("Created issue."),
      }
    }
    IssueAction::Edit {
      id,
      title,
      fields,
      unassign,
    } => {
      let current = ctx.client.issue(project_id, id).await?.data;
      let fields = fields.apply(&current, title, unassign);
      ctx.client.update_issue(project_id, id, fields).await?;
      println!("Updated issue {}.", id);
    }
    IssueAction::Delete { id, yes } => {
      if !yes && !confirm(&format!("Delete issue {}?", id))? {
        return Ok(());
      }
      ctx.client.delete_issue(project_id, id).await?;
      println!("Deleted issue {}.", id);
    }
  }
  Ok(())
}

fn board_text(ctx: &Context, project: &Project) -> String {
  let board = derive_board(&project.issues);
  let stats: Vec<String> = board
    .counts()
    .iter()
    .map(|(status, count)| format!("{} {}", status, count))
    .collect();
  format!(
    "{}: {} issues ({})\n\n{}",
    project.name,
    board.total(),
    stats.join(", "),
    ctx.painter.board(&board, Some(project))
  )
}

/// Redraw the board whenever the project query changes. The key is
/// invalidated every `interval` so other users' edits show up too.
async fn watch_board(ctx: &Context, project_id: ProjectId, interval: Duration) -> Result<()> {
  let key = QueryKey::project(project_id);
  let client = ctx.client.clone();
  let mut query = Query::new(move || {
    let client = client.clone();
    async move { client.project(project_id).await.map_err(|e| e.to_string()) }
  })
  .watching(ctx.client.cache(), &key)
  .with_stale_time(interval);
  query.fetch();

  let mut poll = tokio::time::interval(Duration::from_millis(100));
  let mut refresh = tokio::time::interval(interval);
  refresh.tick().await;
  let mut stdout = std::io::stdout();

  loop {
    tokio::select! {
      _ = poll.tick() => {
        if !query.poll() {
          continue;
        }
        if let Some(error) = query.error() {
          return Err(eyre!("{}", error));
        }
        if let Some(project) = query.data() {
          execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
          print!("{}", board_text(ctx, &project.data));
          print_source_note(ctx, project);
          println!("\nRefreshing every {}s. Press Ctrl-C to exit.", interval.as_secs());
          stdout.flush()?;
        }
      }
      _ = refresh.tick() => {
        if query.is_stale() {
          ctx.client.cache().invalidate(&[key.clone().into()]);
        }
      }
      _ = tokio::signal::ctrl_c() => return Ok(()),
    }
  }
}

/// Extra advice printed under a failed command.
pub fn hint(error: &ApiError) -> Option<&'static str> {
  match error.kind() {
    ErrorKind::Authentication => None,
    ErrorKind::Authorization => Some("Ask an admin of the project for access."),
    ErrorKind::NotFound => Some("Check the id with `kanbo projects` or `kanbo issues`."),
    ErrorKind::Validation => None,
    ErrorKind::Transport => Some("Is the backend at api.url reachable?"),
    ErrorKind::Server => Some("The backend failed; try again later."),
  }
}

fn print_source_note<T>(ctx: &Context, result: &crate::cache::CacheResult<T>) {
  if let Some(note) = ctx.painter.source_note(result) {
    eprintln!("{}", note);
  }
}

/// Collaborator by username, or by user id.
fn resolve_collaborator(project: &Project, user: &str) -> Result<UserId> {
  if let Some(collaborator) = project.collaborator_by_username(user.trim()) {
    return Ok(collaborator.user.id);
  }
  user
    .parse::<UserId>()
    .ok()
    .and_then(|id| project.collaborator(id))
    .map(|c| c.user.id)
    .ok_or_else(|| eyre!("{} is not a collaborator of {}", user, project.name))
}

fn created_id(response: &Value) -> Option<u64> {
  response.get("id").and_then(Value::as_u64)
}

fn confirm(prompt: &str) -> Result<bool> {
  eprint!("{} [y/N] ", prompt);
  std::io::stderr().flush()?;
  let mut answer = String::new();
  std::io::stdin().lock().read_line(&mut answer)?;
  Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tracker::types::{Collaborator, User};
  use chrono::TimeZone;
  use clap::Parser;
  use serde_json::json;

  #[derive(Parser)]
  struct TestCli {
    #[command(subcommand)]
    command: Command,
  }

  fn user(id: u64, name: &str) -> User {
    User {
      id: UserId(id),
      username: name.to_string(),
      email: format!("{}@example.com", name),
    }
  }

  fn project() -> Project {
    Project {
      id: ProjectId(1),
      name: "Apollo".into(),
      description: None,
      created_by: user(1, "ana"),
      collaborators: vec![
        Collaborator {
          role: Role::Admin,
          user: user(1, "ana"),
        },
        Collaborator {
          role: Role::Member,
          user: user(22, "bo"),
        },
      ],
      issues: Vec::new(),
      date_created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      date_modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  fn issue() -> Issue {
    Issue {
      id: IssueId(5),
      created_by: user(1, "ana"),
      assigned_to: Some(user(22, "bo")),
      project: ProjectId(1),
      title: "Launch".into(),
      description: Some("Countdown".into()),
      status: Status::Todo,
      priority: Priority::High,
      date_created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
      date_modified: None,
    }
  }

  #[test]
  fn test_new_issue_defaults() {
    let fields = IssueEdits::default().into_new("Launch".into());
    assert_eq!(fields.status, Status::Backlog);
    assert_eq!(fields.priority, Priority::Low);
    assert_eq!(fields.assignee, None);
  }

  #[test]
  fn test_edit_keeps_unset_fields() {
    let edits = IssueEdits {
      status: Some(Status::Done),
      ..Default::default()
    };
    let fields = edits.apply(&issue(), None, false);
    assert_eq!(fields.title, "Launch");
    assert_eq!(fields.description.as_deref(), Some("Countdown"));
    assert_eq!(fields.status, Status::Done);
    assert_eq!(fields.priority, Priority::High);
    assert_eq!(fields.assignee.as_deref(), Some("bo"));
  }

  #[test]
  fn test_edit_unassign() {
    let fields = IssueEdits::default().apply(&issue(), Some("Land".into()), true);
    assert_eq!(fields.title, "Land");
    assert_eq!(fields.assignee, None);
  }

  #[test]
  fn test_resolve_collaborator_by_name_or_id() {
    let project = project();
    assert_eq!(resolve_collaborator(&project, "bo").unwrap(), UserId(22));
    assert_eq!(resolve_collaborator(&project, "22").unwrap(), UserId(22));
    assert!(resolve_collaborator(&project, "99").is_err());
    assert!(resolve_collaborator(&project, "mallory").is_err());
  }

  #[test]
  fn test_hints_by_kind() {
    let not_found = ApiError::Status {
      method: "GET".into(),
      path: "/projects/9".into(),
      status: 404,
      body: None,
    };
    assert!(hint(&not_found).unwrap().contains("kanbo projects"));
    assert_eq!(hint(&ApiError::NoSession), None);
    assert!(hint(&ApiError::Forbidden("no".into())).is_some());
  }

  #[test]
  fn test_created_id() {
    assert_eq!(created_id(&json!({ "id": 7 })), Some(7));
    assert_eq!(created_id(&Value::Null), None);
  }

  #[test]
  fn test_parse_issue_create() {
    let cli = TestCli::try_parse_from([
      "kanbo",
      "issue",
      "create",
      "Launch",
      "--status",
      "in progress",
      "-P",
      "normal",
      "--assignee",
      "bo",
    ])
    .unwrap();
    let Command::Issue {
      action: IssueAction::Create { title, fields },
    } = cli.command
    else {
      panic!("expected issue create");
    };
    assert_eq!(title, "Launch");
    assert_eq!(fields.status, Some(Status::InProgress));
    assert_eq!(fields.priority, Some(Priority::Medium));
    assert_eq!(fields.assignee.as_deref(), Some("bo"));
  }

  #[test]
  fn test_parse_collaborator_role() {
    let cli = TestCli::try_parse_from(["kanbo", "collaborators", "role", "bo", "guest"]).unwrap();
    assert!(matches!(
      cli.command,
      Command::Collaborators {
        action: CollaboratorAction::Role { role: Role::Guest, .. }
      }
    ));
  }

  #[test]
  fn test_unassign_conflicts_with_assignee() {
    let result = TestCli::try_parse_from([
      "kanbo", "issue", "edit", "5", "--assignee", "bo", "--unassign",
    ]);
    assert!(result.is_err());
  }
}
