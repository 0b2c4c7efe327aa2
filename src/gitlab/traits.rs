//! Trait abstraction over the two sides of a migration
//!
//! `SourceApi` is the read-only surface the extractor crawls; `TargetApi` is
//! the write surface the reconstructor replays onto. `GitlabClient`
//! implements both; tests use the in-memory `MockGitlab`.

use super::error::Result;
use super::models::*;
use async_trait::async_trait;

/// Identity an authored write is performed as.
///
/// A value built per call and handed to the client; the client never holds
/// an impersonated identity between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// The administrative token itself
    Admin,
    /// Impersonate a resolved target user
    User { id: u64, username: String },
}

impl Actor {
    pub fn user(id: u64, username: impl Into<String>) -> Self {
        Actor::User {
            id,
            username: username.into(),
        }
    }

    /// Value of the `Sudo` header, if any
    pub fn sudo(&self) -> Option<String> {
        match self {
            Actor::Admin => None,
            Actor::User { id, .. } => Some(id.to_string()),
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Actor::Admin => None,
            Actor::User { username, .. } => Some(username),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin)
    }
}

/// Read side: everything the extractor needs from a source instance
#[async_trait]
pub trait SourceApi: Send + Sync {
    // ========================================================================
    // Instance
    // ========================================================================

    /// User owning the token; fails when the credential is rejected
    async fn current_user(&self) -> Result<ApiUser>;

    async fn version(&self) -> Result<ApiVersion>;

    async fn list_users(&self) -> Result<Vec<ApiUser>>;

    async fn list_groups(&self) -> Result<Vec<ApiGroup>>;

    async fn list_projects(&self) -> Result<Vec<ApiProject>>;

    // ========================================================================
    // Project collections
    // ========================================================================

    async fn list_labels(&self, project_id: u64) -> Result<Vec<ApiLabel>>;

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>>;

    async fn list_forks(&self, project_id: u64) -> Result<Vec<ApiProject>>;

    async fn list_pipelines(&self, project_id: u64) -> Result<Vec<ApiPipeline>>;

    async fn get_pipeline(&self, project_id: u64, pipeline_id: u64) -> Result<ApiPipeline>;

    async fn list_pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> Result<Vec<ApiJob>>;

    /// Wiki pages including their content
    async fn list_wiki_pages(&self, project_id: u64) -> Result<Vec<ApiWikiPage>>;

    async fn list_issues(&self, project_id: u64) -> Result<Vec<ApiIssue>>;

    async fn list_issue_notes(&self, project_id: u64, issue_iid: u64) -> Result<Vec<ApiNote>>;

    async fn list_merge_requests(&self, project_id: u64) -> Result<Vec<ApiMergeRequest>>;

    async fn list_merge_request_notes(&self, project_id: u64, mr_iid: u64)
        -> Result<Vec<ApiNote>>;

    /// Effective members, including those inherited from ancestor groups
    async fn list_project_members_all(&self, project_id: u64) -> Result<Vec<ApiMember>>;
}

/// Write side: everything the reconstructor does to a target instance
#[async_trait]
pub trait TargetApi: Send + Sync {
    // ========================================================================
    // Identities and namespaces
    // ========================================================================

    async fn current_user(&self) -> Result<ApiUser>;

    /// Exact username lookup
    async fn find_user(&self, username: &str) -> Result<Option<ApiUser>>;

    async fn create_user(&self, user: &NewUser) -> Result<ApiUser>;

    async fn find_group(&self, full_path: &str) -> Result<Option<ApiGroup>>;

    async fn create_group(&self, group: &NewGroup) -> Result<ApiGroup>;

    // ========================================================================
    // Projects
    // ========================================================================

    /// Lookup by `namespace/path`
    async fn find_project(&self, full_path: &str) -> Result<Option<ApiProject>>;

    async fn create_project(&self, owner: ProjectOwner, project: &NewProject)
        -> Result<ApiProject>;

    async fn add_member(&self, project_id: u64, member: &NewMember) -> Result<()>;

    async fn create_label(&self, project_id: u64, label: &NewLabel) -> Result<ApiLabel>;

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>>;

    async fn create_milestone(
        &self,
        project_id: u64,
        milestone: &NewMilestone,
    ) -> Result<ApiMilestone>;

    async fn close_milestone(&self, project_id: u64, milestone_id: u64) -> Result<()>;

    /// Star as `actor`. Returns `false` when the project was already starred.
    async fn star_project(&self, project_id: u64, actor: &Actor) -> Result<bool>;

    async fn create_wiki_page(&self, project_id: u64, page: &NewWikiPage) -> Result<()>;

    // ========================================================================
    // Issues and merge requests
    // ========================================================================

    async fn create_issue(&self, project_id: u64, actor: &Actor, issue: &NewIssue)
        -> Result<ApiIssue>;

    async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()>;

    /// Privileged transition, always performed as the administrator
    async fn close_issue(&self, project_id: u64, issue_iid: u64) -> Result<()>;

    async fn create_merge_request(
        &self,
        project_id: u64,
        actor: &Actor,
        mr: &NewMergeRequest,
    ) -> Result<ApiMergeRequest>;

    async fn create_merge_request_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()>;

    async fn merge_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()>;

    async fn close_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()>;
}
