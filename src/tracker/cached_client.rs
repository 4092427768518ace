//! Cached tracker client that wraps TrackerClient with transparent caching.

use chrono::Duration;
use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheResult, MemoryStorage, NoopStorage, QueryCache};
use crate::config::{CacheConfig, Config, MAX_STALE_SECS};
use crate::error::{ApiError, ApiResult};
use crate::session::{SessionProvider, SessionStore, SignInPrompt};
use crate::validate;

use super::api_types::{
  CollaboratorMutationRequest, IssueFields, IssueMutationRequest, MutationRequest, ProjectFields,
  ProjectMutationRequest,
};
use super::cache::QueryKey;
use super::client::TrackerClient;
use super::http::{AuthGuard, HttpClient};
use super::types::{
  Issue, IssueId, IssueSummary, Project, ProjectId, ProjectSummary, Role, UserId,
};

/// Tracker client with transparent caching support.
///
/// Reads go through the shared [`QueryCache`] under keys from
/// [`QueryKey`]; writes go straight to the backend and, once accepted,
/// invalidate whatever their [`Mutation`](super::cache::Mutation) names.
#[derive(Clone)]
pub struct CachedTrackerClient {
  inner: TrackerClient,
  cache: QueryCache,
  /// Username of the signed-in user, if known
  current_user: Option<String>,
}

impl CachedTrackerClient {
  pub fn new(inner: TrackerClient, cache: QueryCache) -> Self {
    Self {
      inner,
      cache,
      current_user: None,
    }
  }

  pub fn with_current_user(mut self, username: Option<String>) -> Self {
    self.current_user = username;
    self
  }

  /// Wire up cache, session store, login redirect and HTTP client.
  pub fn from_config(config: &Config) -> Result<Self> {
    let cache = build_cache(&config.cache);
    let sessions = Arc::new(SessionStore::for_config(&config.auth)?);
    let current_user = sessions.session().and_then(|s| s.username);
    let redirect = Arc::new(SignInPrompt::new(&config.auth)?);
    let guard = Arc::new(AuthGuard::new(cache.clone(), redirect));
    let http = HttpClient::new(config, sessions, guard)?;

    Ok(Self::new(TrackerClient::new(http), cache).with_current_user(current_user))
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  pub async fn projects(&self) -> ApiResult<CacheResult<Vec<ProjectSummary>>> {
    self
      .cache
      .fetch_or_serve(&QueryKey::all_projects(), || self.inner.get_projects())
      .await
  }

  pub async fn project(&self, project_id: ProjectId) -> ApiResult<CacheResult<Project>> {
    self
      .cache
      .fetch_or_serve(&QueryKey::project(project_id), || {
        self.inner.get_project(project_id)
      })
      .await
  }

  pub async fn project_issues(
    &self,
    project_id: ProjectId,
  ) -> ApiResult<CacheResult<Vec<IssueSummary>>> {
    self
      .cache
      .fetch_or_serve(&QueryKey::project_issues(project_id), || {
        self.inner.get_project_issues(project_id)
      })
      .await
  }

  pub async fn issue(
    &self,
    project_id: ProjectId,
    issue_id: IssueId,
  ) -> ApiResult<CacheResult<Issue>> {
    self
      .cache
      .fetch_or_serve(&QueryKey::issue(project_id, issue_id), || {
        self.inner.get_issue(project_id, issue_id)
      })
      .await
  }

  // ==========================================================================
  // Writes
  // ==========================================================================

  /// Send a write and invalidate the queries it affects.
  pub async fn mutate<R: MutationRequest>(&self, request: &R) -> ApiResult<Value> {
    let response = self.inner.execute(request).await?;

    let mutation = request.mutation();
    let touched = self.cache.invalidate(&mutation.invalidations());
    debug!(?mutation, invalidated = touched.len(), "Mutation applied");

    Ok(response)
  }

  pub async fn create_project(&self, fields: ProjectFields) -> ApiResult<Value> {
    self.mutate(&ProjectMutationRequest::Create(fields)).await
  }

  pub async fn update_project(&self, project_id: ProjectId, fields: ProjectFields) -> ApiResult<Value> {
    self
      .mutate(&ProjectMutationRequest::Update { project_id, fields })
      .await
  }

  pub async fn delete_project(&self, project_id: ProjectId) -> ApiResult<Value> {
    self
      .mutate(&ProjectMutationRequest::Delete { project_id })
      .await
  }

  pub async fn create_issue(&self, project_id: ProjectId, fields: IssueFields) -> ApiResult<Value> {
    let request = IssueMutationRequest::Create { project_id, fields };
    self.check_assignee(&request).await?;
    self.mutate(&request).await
  }

  pub async fn update_issue(
    &self,
    project_id: ProjectId,
    issue_id: IssueId,
    fields: IssueFields,
  ) -> ApiResult<Value> {
    let request = IssueMutationRequest::Update {
      project_id,
      issue_id,
      fields,
    };
    self.check_assignee(&request).await?;
    self.mutate(&request).await
  }

  pub async fn delete_issue(&self, project_id: ProjectId, issue_id: IssueId) -> ApiResult<Value> {
    self
      .mutate(&IssueMutationRequest::Delete {
        project_id,
        issue_id,
      })
      .await
  }

  pub async fn add_collaborator(
    &self,
    project_id: ProjectId,
    username: &str,
    role: Role,
  ) -> ApiResult<Value> {
    let project = self.project(project_id).await?.data;
    validate::new_collaborator(&project, username)?;
    self
      .mutate(&CollaboratorMutationRequest::Add {
        project_id,
        username: username.trim().to_string(),
        role,
      })
      .await
  }

  pub async fn change_collaborator_role(
    &self,
    project_id: ProjectId,
    user_id: UserId,
    role: Role,
  ) -> ApiResult<Value> {
    let request = CollaboratorMutationRequest::ChangeRole {
      project_id,
      user_id,
      role,
    };
    self.check_can_manage(&request).await?;
    self.mutate(&request).await
  }

  pub async fn remove_collaborator(&self, project_id: ProjectId, user_id: UserId) -> ApiResult<Value> {
    let request = CollaboratorMutationRequest::Remove {
      project_id,
      user_id,
    };
    self.check_can_manage(&request).await?;
    self.mutate(&request).await
  }

  /// Reject assignees who are not collaborators before anything is sent.
  async fn check_assignee(&self, request: &IssueMutationRequest) -> ApiResult<()> {
    request.validate()?;
    let Some(assignee) = request.fields().and_then(|f| f.assignee.as_deref()) else {
      return Ok(());
    };
    let project = self.project(request.project_id()).await?.data;
    validate::assignee(&project, Some(assignee))?;
    Ok(())
  }

  /// Only admins manage other collaborators. Skipped when the signed-in
  /// user is unknown; the backend still enforces it.
  async fn check_can_manage(&self, request: &CollaboratorMutationRequest) -> ApiResult<()> {
    let (Some(username), Some(target_id)) = (self.current_user.as_deref(), request.target()) else {
      return Ok(());
    };
    let project = self.project(request.project_id()).await?.data;
    let (Some(actor), Some(target)) = (
      project.collaborator_by_username(username),
      project.collaborator(target_id),
    ) else {
      return Ok(());
    };
    if actor.can_manage(target) {
      Ok(())
    } else if actor.user.id == target.user.id {
      Err(ApiError::Forbidden(
        "you cannot change your own collaborator entry".to_string(),
      ))
    } else {
      Err(ApiError::Forbidden(
        "only project admins can manage other collaborators".to_string(),
      ))
    }
  }
}

fn build_cache(config: &CacheConfig) -> QueryCache {
  let cache = if config.enabled {
    QueryCache::new(MemoryStorage::new())
  } else {
    QueryCache::new(NoopStorage)
  };
  cache.with_stale_time(Duration::seconds(config.stale_secs.clamp(0, MAX_STALE_SECS)))
}
