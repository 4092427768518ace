use reqwest::Method;
use serde_json::Value;
use tracing::info;

use crate::error::ApiResult;
use crate::tracker::api_types::MutationRequest;
use crate::tracker::http::HttpClient;
use crate::tracker::types::{Issue, IssueId, IssueSummary, Project, ProjectId, ProjectSummary};

/// Typed accessors for the tracker REST API
#[derive(Clone)]
pub struct TrackerClient {
  http: HttpClient,
}

impl TrackerClient {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  /// List all projects visible to the current user
  pub async fn get_projects(&self) -> ApiResult<Vec<ProjectSummary>> {
    info!("Fetching projects");
    self.http.get("/projects").await
  }

  /// Get a single project with collaborators and issue summaries
  pub async fn get_project(&self, project_id: ProjectId) -> ApiResult<Project> {
    info!(%project_id, "Fetching project");
    self.http.get(&format!("/projects/{}", project_id)).await
  }

  /// List the issues of a project
  pub async fn get_project_issues(&self, project_id: ProjectId) -> ApiResult<Vec<IssueSummary>> {
    info!(%project_id, "Fetching project issues");
    self
      .http
      .get(&format!("/projects/{}/issues", project_id))
      .await
  }

  /// Get a single issue by project and id
  pub async fn get_issue(&self, project_id: ProjectId, issue_id: IssueId) -> ApiResult<Issue> {
    info!(%project_id, %issue_id, "Fetching issue");
    self
      .http
      .get(&format!("/projects/{}/issues/{}", project_id, issue_id))
      .await
  }

  /// Validate and send a write. Returns the response body (`null` if empty).
  pub async fn execute<R: MutationRequest>(&self, request: &R) -> ApiResult<Value> {
    request.validate()?;

    let method = request.method();
    let path = request.path();
    let body = request.body()?;
    info!(%method, %path, "Sending mutation");

    let payload = body.unwrap_or(Value::Null);
    match method {
      Method::POST => self.http.post(&path, &payload).await,
      Method::PUT => self.http.put(&path, &payload).await,
      Method::PATCH => self.http.patch(&path, &payload).await,
      Method::DELETE => self.http.delete(&path).await,
      other => self.http.send(other, &path, Some(&payload)).await,
    }
  }
}
