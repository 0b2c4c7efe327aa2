//! GitLab v4 REST client
//!
//! Authenticates with an administrative `PRIVATE-TOKEN`. Authored writes are
//! impersonated per request through the `Sudo` header taken from the
//! [`Actor`] passed in; the client itself never changes identity.

use super::error::{GitlabError, Result};
use super::models::*;
use super::traits::Actor;
use crate::retry::RetryPolicy;
use anyhow::Context;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const API_PREFIX: &str = "/api/v4";
const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const SUDO_HEADER: &str = "Sudo";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const PER_PAGE: &str = "100";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for one GitLab instance
#[derive(Clone)]
pub struct GitlabClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryPolicy,
}

fn project_path(project_id: u64) -> String {
    format!("/projects/{}", project_id)
}

fn encoded(full_path: &str) -> String {
    urlencoding::encode(full_path).into_owned()
}

impl GitlabClient {
    /// Create a client for `base_url` (instance root, without `/api/v4`).
    ///
    /// Requests are attempted once; see [`with_retry`](Self::with_retry).
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::none(),
        })
    }

    /// Retry transient failures (5xx, 429, connect/timeouts) with `retry`.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Request plumbing
    // ========================================================================

    fn request(&self, method: Method, path: &str, actor: Option<&Actor>) -> RequestBuilder {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let mut builder = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.token);
        if let Some(sudo) = actor.and_then(Actor::sudo) {
            builder = builder.header(SUDO_HEADER, sudo);
        }
        builder
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn execute<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        self.retry
            .run_if(
                what,
                move || async move {
                    let response = build().send().await.map_err(|source| {
                        GitlabError::Transport {
                            what: what.to_string(),
                            source,
                        }
                    })?;
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    Err(GitlabError::from_status(what, status.as_u16(), body))
                },
                GitlabError::is_transient,
            )
            .await
    }

    async fn decode<T: DeserializeOwned>(what: &str, response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|source| GitlabError::Decode {
                what: what.to_string(),
                source,
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .execute(what, || self.request(Method::GET, path, None).query(query))
            .await?;
        Self::decode(what, response).await
    }

    /// GET that maps 404 to `None`
    async fn get_optional<T: DeserializeOwned>(&self, what: &str, path: &str) -> Result<Option<T>> {
        match self.get_json(what, path, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// GET every page of a list endpoint, following `X-Next-Page`.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;
        loop {
            let page_param = page.to_string();
            let response = self
                .execute(what, || {
                    self.request(Method::GET, path, None)
                        .query(query)
                        .query(&[("per_page", PER_PAGE), ("page", page_param.as_str())])
                })
                .await?;
            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());
            let batch: Vec<T> = Self::decode(what, response).await?;
            let exhausted = batch.is_empty();
            items.extend(batch);

            match next_page {
                Some(next) if next > page && !exhausted => page = next,
                _ => break,
            }
        }
        tracing::trace!(what, count = items.len(), "Fetched list");
        Ok(items)
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        what: &str,
        path: &str,
        actor: Option<&Actor>,
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .execute(what, || {
                self.request(method.clone(), path, actor).json(body)
            })
            .await?;
        Self::decode(what, response).await
    }

    /// Write whose response body is not needed
    async fn send_unit<B>(
        &self,
        method: Method,
        what: &str,
        path: &str,
        actor: Option<&Actor>,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(what, || {
            let builder = self.request(method.clone(), path, actor);
            match body {
                Some(body) => builder.json(body),
                None => builder,
            }
        })
        .await?;
        Ok(())
    }

    // ========================================================================
    // Instance
    // ========================================================================

    pub async fn current_user(&self) -> Result<ApiUser> {
        self.get_json("current user", "/user", &[]).await
    }

    pub async fn version(&self) -> Result<ApiVersion> {
        self.get_json("version", "/version", &[]).await
    }

    pub async fn list_users(&self) -> Result<Vec<ApiUser>> {
        self.get_paginated("users", "/users", &[("active", "true")])
            .await
    }

    pub async fn list_groups(&self) -> Result<Vec<ApiGroup>> {
        self.get_paginated(
            "groups",
            "/groups",
            &[("all_available", "true"), ("order_by", "id"), ("sort", "asc")],
        )
        .await
    }

    pub async fn list_projects(&self) -> Result<Vec<ApiProject>> {
        self.get_paginated("projects", "/projects", &[("order_by", "id"), ("sort", "asc")])
            .await
    }

    // ========================================================================
    // Source project collections
    // ========================================================================

    pub async fn list_labels(&self, project_id: u64) -> Result<Vec<ApiLabel>> {
        let path = format!("{}/labels", project_path(project_id));
        self.get_paginated("labels", &path, &[]).await
    }

    pub async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>> {
        let path = format!("{}/milestones", project_path(project_id));
        self.get_paginated("milestones", &path, &[]).await
    }

    pub async fn list_forks(&self, project_id: u64) -> Result<Vec<ApiProject>> {
        let path = format!("{}/forks", project_path(project_id));
        self.get_paginated("forks", &path, &[]).await
    }

    pub async fn list_pipelines(&self, project_id: u64) -> Result<Vec<ApiPipeline>> {
        let path = format!("{}/pipelines", project_path(project_id));
        self.get_paginated("pipelines", &path, &[]).await
    }

    pub async fn get_pipeline(&self, project_id: u64, pipeline_id: u64) -> Result<ApiPipeline> {
        let path = format!("{}/pipelines/{}", project_path(project_id), pipeline_id);
        self.get_json("pipeline", &path, &[]).await
    }

    pub async fn list_pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> Result<Vec<ApiJob>> {
        let path = format!("{}/pipelines/{}/jobs", project_path(project_id), pipeline_id);
        self.get_paginated("pipeline jobs", &path, &[]).await
    }

    pub async fn list_wiki_pages(&self, project_id: u64) -> Result<Vec<ApiWikiPage>> {
        let path = format!("{}/wikis", project_path(project_id));
        self.get_json("wiki pages", &path, &[("with_content", "1")])
            .await
    }

    pub async fn list_issues(&self, project_id: u64) -> Result<Vec<ApiIssue>> {
        let path = format!("{}/issues", project_path(project_id));
        self.get_paginated(
            "issues",
            &path,
            &[("order_by", "created_at"), ("sort", "asc")],
        )
        .await
    }

    pub async fn list_issue_notes(&self, project_id: u64, issue_iid: u64) -> Result<Vec<ApiNote>> {
        let path = format!("{}/issues/{}/notes", project_path(project_id), issue_iid);
        self.get_paginated(
            "issue notes",
            &path,
            &[("order_by", "created_at"), ("sort", "asc")],
        )
        .await
    }

    pub async fn list_merge_requests(&self, project_id: u64) -> Result<Vec<ApiMergeRequest>> {
        let path = format!("{}/merge_requests", project_path(project_id));
        self.get_paginated(
            "merge requests",
            &path,
            &[("state", "all"), ("order_by", "created_at"), ("sort", "asc")],
        )
        .await
    }

    pub async fn list_merge_request_notes(
        &self,
        project_id: u64,
        mr_iid: u64,
    ) -> Result<Vec<ApiNote>> {
        let path = format!("{}/merge_requests/{}/notes", project_path(project_id), mr_iid);
        self.get_paginated(
            "merge request notes",
            &path,
            &[("order_by", "created_at"), ("sort", "asc")],
        )
        .await
    }

    pub async fn list_project_members_all(&self, project_id: u64) -> Result<Vec<ApiMember>> {
        let path = format!("{}/members/all", project_path(project_id));
        self.get_paginated("project members", &path, &[]).await
    }

    // ========================================================================
    // Target identities and namespaces
    // ========================================================================

    pub async fn find_user(&self, username: &str) -> Result<Option<ApiUser>> {
        let users: Vec<ApiUser> = self
            .get_json("user lookup", "/users", &[("username", username)])
            .await?;
        Ok(users
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username)))
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<ApiUser> {
        self.send_json(Method::POST, "create user", "/users", None, user)
            .await
    }

    pub async fn find_group(&self, full_path: &str) -> Result<Option<ApiGroup>> {
        let path = format!("/groups/{}", encoded(full_path));
        self.get_optional("group", &path).await
    }

    pub async fn create_group(&self, group: &NewGroup) -> Result<ApiGroup> {
        self.send_json(Method::POST, "create group", "/groups", None, group)
            .await
    }

    // ========================================================================
    // Target projects
    // ========================================================================

    pub async fn find_project(&self, full_path: &str) -> Result<Option<ApiProject>> {
        let path = format!("/projects/{}", encoded(full_path));
        self.get_optional("project", &path).await
    }

    pub async fn create_project(&self, owner: ProjectOwner, project: &NewProject) -> Result<ApiProject> {
        match owner {
            ProjectOwner::Admin => {
                let payload = NewProject {
                    namespace_id: None,
                    ..project.clone()
                };
                self.send_json(Method::POST, "create project", "/projects", None, &payload)
                    .await
            }
            ProjectOwner::Group(group_id) => {
                let payload = NewProject {
                    namespace_id: Some(group_id),
                    ..project.clone()
                };
                self.send_json(Method::POST, "create project", "/projects", None, &payload)
                    .await
            }
            ProjectOwner::User(user_id) => {
                let path = format!("/projects/user/{}", user_id);
                self.send_json(Method::POST, "create project", &path, None, project)
                    .await
            }
        }
    }

    pub async fn add_member(&self, project_id: u64, member: &NewMember) -> Result<()> {
        let path = format!("{}/members", project_path(project_id));
        self.send_unit(Method::POST, "add member", &path, None, Some(member))
            .await
    }

    pub async fn create_label(&self, project_id: u64, label: &NewLabel) -> Result<ApiLabel> {
        let path = format!("{}/labels", project_path(project_id));
        self.send_json(Method::POST, "create label", &path, None, label)
            .await
    }

    pub async fn create_milestone(
        &self,
        project_id: u64,
        milestone: &NewMilestone,
    ) -> Result<ApiMilestone> {
        let path = format!("{}/milestones", project_path(project_id));
        self.send_json(Method::POST, "create milestone", &path, None, milestone)
            .await
    }

    pub async fn close_milestone(&self, project_id: u64, milestone_id: u64) -> Result<()> {
        let path = format!("{}/milestones/{}", project_path(project_id), milestone_id);
        let body = serde_json::json!({ "state_event": "close" });
        self.send_unit(Method::PUT, "close milestone", &path, None, Some(&body))
            .await
    }

    pub async fn star_project(&self, project_id: u64, actor: &Actor) -> Result<bool> {
        let path = format!("{}/star", project_path(project_id));
        match self
            .send_unit(Method::POST, "star project", &path, Some(actor), None::<&()>)
            .await
        {
            Ok(()) => Ok(true),
            Err(GitlabError::Status { status: 304, .. }) => Ok(false),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create_wiki_page(&self, project_id: u64, page: &NewWikiPage) -> Result<()> {
        let path = format!("{}/wikis", project_path(project_id));
        self.send_unit(Method::POST, "create wiki page", &path, None, Some(page))
            .await
    }

    // ========================================================================
    // Target issues and merge requests
    // ========================================================================

    pub async fn create_issue(&self, project_id: u64, actor: &Actor, issue: &NewIssue) -> Result<ApiIssue> {
        let path = format!("{}/issues", project_path(project_id));
        self.send_json(Method::POST, "create issue", &path, Some(actor), issue)
            .await
    }

    pub async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()> {
        let path = format!("{}/issues/{}/notes", project_path(project_id), issue_iid);
        self.send_unit(Method::POST, "create issue note", &path, Some(actor), Some(note))
            .await
    }

    pub async fn close_issue(&self, project_id: u64, issue_iid: u64) -> Result<()> {
        let path = format!("{}/issues/{}", project_path(project_id), issue_iid);
        let body = serde_json::json!({ "state_event": "close" });
        self.send_unit(Method::PUT, "close issue", &path, None, Some(&body))
            .await
    }

    pub async fn create_merge_request(
        &self,
        project_id: u64,
        actor: &Actor,
        mr: &NewMergeRequest,
    ) -> Result<ApiMergeRequest> {
        let path = format!("{}/merge_requests", project_path(project_id));
        self.send_json(Method::POST, "create merge request", &path, Some(actor), mr)
            .await
    }

    pub async fn create_merge_request_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()> {
        let path = format!("{}/merge_requests/{}/notes", project_path(project_id), mr_iid);
        self.send_unit(
            Method::POST,
            "create merge request note",
            &path,
            Some(actor),
            Some(note),
        )
        .await
    }

    pub async fn merge_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()> {
        let path = format!("{}/merge_requests/{}/merge", project_path(project_id), mr_iid);
        self.send_unit(Method::PUT, "merge merge request", &path, None, None::<&()>)
            .await
    }

    pub async fn close_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()> {
        let path = format!("{}/merge_requests/{}", project_path(project_id), mr_iid);
        let body = serde_json::json!({ "state_event": "close" });
        self.send_unit(Method::PUT, "close merge request", &path, None, Some(&body))
            .await
    }
}
