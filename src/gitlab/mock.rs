//! In-memory mock of both GitLab API sides for testing without an instance.
//!
//! The source side is seeded directly through [`MockGitlab::source`]. The
//! target side behaves like a fresh instance: it enforces the uniqueness
//! rules the reconstructor relies on (usernames, group paths, project paths,
//! label names, milestone titles, memberships) and answers violations with
//! conflicts. Every target mutation is appended to a call log so tests can
//! assert ordering.

use super::error::{GitlabError, Result};
use super::models::*;
use super::traits::{Actor, SourceApi, TargetApi};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const MOCK_ADMIN_ID: u64 = 1;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn api_user(id: u64, username: &str) -> ApiUser {
    ApiUser {
        id,
        username: username.to_string(),
        name: username.to_string(),
        email: Some(format!("{}@source.test", username)),
        state: "active".to_string(),
        is_admin: false,
    }
}

pub fn user_ref(id: u64, username: &str) -> ApiUserRef {
    ApiUserRef {
        id,
        username: username.to_string(),
    }
}

pub fn api_project(id: u64, namespace: &str, kind: &str, path: &str) -> ApiProject {
    ApiProject {
        id,
        name: path.to_string(),
        path: path.to_string(),
        path_with_namespace: format!("{}/{}", namespace, path),
        namespace: ApiNamespace {
            id: 0,
            path: namespace.rsplit('/').next().unwrap_or(namespace).to_string(),
            full_path: namespace.to_string(),
            kind: kind.to_string(),
        },
        visibility: Some("private".to_string()),
        description: None,
        web_url: format!("http://source.test/{}/{}", namespace, path),
        http_url_to_repo: format!("http://source.test/{}/{}.git", namespace, path),
        ssh_url_to_repo: format!("git@source.test:{}/{}.git", namespace, path),
        default_branch: Some("main".to_string()),
        created_at: None,
        last_activity_at: None,
        star_count: 0,
        forks_count: 0,
        wiki_enabled: Some(true),
        issues_enabled: Some(true),
        merge_requests_enabled: Some(true),
        snippets_enabled: Some(false),
        owner: None,
    }
}

pub fn api_issue(iid: u64, title: &str, author: ApiUserRef) -> ApiIssue {
    ApiIssue {
        id: iid * 100,
        iid,
        title: title.to_string(),
        description: None,
        state: "opened".to_string(),
        author,
        assignees: vec![],
        labels: vec![],
        milestone: None,
        created_at: Some("2023-03-01T10:00:00Z".to_string()),
        updated_at: None,
    }
}

pub fn api_merge_request(iid: u64, title: &str, author: ApiUserRef, state: &str) -> ApiMergeRequest {
    ApiMergeRequest {
        id: iid * 100,
        iid,
        title: title.to_string(),
        description: None,
        state: state.to_string(),
        source_branch: format!("feature-{}", iid),
        target_branch: "main".to_string(),
        author,
        assignees: vec![],
        labels: vec![],
        milestone: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn api_note(body: &str, author: ApiUserRef, system: bool) -> ApiNote {
    ApiNote {
        id: 0,
        body: body.to_string(),
        system,
        author,
        created_at: Some("2023-03-02T10:00:00Z".to_string()),
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Seeded content of a source instance
#[derive(Default)]
pub struct SourceData {
    pub current_user: Option<ApiUser>,
    pub version: Option<String>,
    pub users: Vec<ApiUser>,
    pub groups: Vec<ApiGroup>,
    pub projects: Vec<ApiProject>,
    pub labels: HashMap<u64, Vec<ApiLabel>>,
    pub milestones: HashMap<u64, Vec<ApiMilestone>>,
    pub forks: HashMap<u64, Vec<ApiProject>>,
    pub pipelines: HashMap<u64, Vec<ApiPipeline>>,
    /// Keyed by pipeline id
    pub jobs: HashMap<u64, Vec<ApiJob>>,
    pub wiki_pages: HashMap<u64, Vec<ApiWikiPage>>,
    pub issues: HashMap<u64, Vec<ApiIssue>>,
    /// Keyed by (project id, issue iid)
    pub issue_notes: HashMap<(u64, u64), Vec<ApiNote>>,
    pub merge_requests: HashMap<u64, Vec<ApiMergeRequest>>,
    pub merge_request_notes: HashMap<(u64, u64), Vec<ApiNote>>,
    pub members: HashMap<u64, Vec<ApiMember>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockNote {
    pub project_id: u64,
    /// `issue` or `merge_request`
    pub noteable: &'static str,
    pub iid: u64,
    pub author: String,
    pub body: String,
}

/// Live state of the target instance
pub struct TargetData {
    next_id: u64,
    pub users: Vec<ApiUser>,
    pub groups: Vec<ApiGroup>,
    pub projects: Vec<ApiProject>,
    /// (project id, user id, access level)
    pub members: Vec<(u64, u64, u16)>,
    pub labels: Vec<(u64, ApiLabel)>,
    pub milestones: Vec<(u64, ApiMilestone)>,
    /// (project id, user id)
    pub stars: Vec<(u64, u64)>,
    pub wiki_pages: Vec<(u64, NewWikiPage)>,
    pub issues: Vec<(u64, ApiIssue)>,
    pub merge_requests: Vec<(u64, ApiMergeRequest)>,
    pub notes: Vec<MockNote>,
    /// Every successful mutation, in order
    pub calls: Vec<String>,
}

impl TargetData {
    fn new() -> Self {
        let mut admin = api_user(MOCK_ADMIN_ID, "root");
        admin.is_admin = true;
        Self {
            next_id: 100,
            users: vec![admin],
            groups: Vec::new(),
            projects: Vec::new(),
            members: Vec::new(),
            labels: Vec::new(),
            milestones: Vec::new(),
            stars: Vec::new(),
            wiki_pages: Vec::new(),
            issues: Vec::new(),
            merge_requests: Vec::new(),
            notes: Vec::new(),
            calls: Vec::new(),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_id(&self, id: u64) -> Option<&ApiUser> {
        self.users.iter().find(|u| u.id == id)
    }

    fn actor_ref(&self, actor: &Actor) -> Result<ApiUserRef> {
        let id = match actor {
            Actor::Admin => MOCK_ADMIN_ID,
            Actor::User { id, .. } => *id,
        };
        self.user_by_id(id)
            .map(|u| user_ref(u.id, &u.username))
            .ok_or_else(|| GitlabError::Status {
                what: "sudo".into(),
                status: 403,
                body: format!("no user with id {}", id),
            })
    }

    fn project_exists(&self, project_id: u64) -> Result<()> {
        if self.projects.iter().any(|p| p.id == project_id) {
            Ok(())
        } else {
            Err(GitlabError::NotFound {
                what: format!("project {}", project_id),
            })
        }
    }

    pub fn issues_of(&self, project_id: u64) -> Vec<&ApiIssue> {
        self.issues
            .iter()
            .filter(|(p, _)| *p == project_id)
            .map(|(_, i)| i)
            .collect()
    }

    pub fn merge_requests_of(&self, project_id: u64) -> Vec<&ApiMergeRequest> {
        self.merge_requests
            .iter()
            .filter(|(p, _)| *p == project_id)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn project_by_path(&self, full_path: &str) -> Option<&ApiProject> {
        self.projects
            .iter()
            .find(|p| p.path_with_namespace == full_path)
    }

    /// Position of the first logged call starting with `prefix`
    pub fn call_index(&self, prefix: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.starts_with(prefix))
    }
}

fn conflict(what: &str) -> GitlabError {
    GitlabError::Conflict {
        what: what.to_string(),
        body: "has already been taken".to_string(),
    }
}

/// In-memory implementation of `SourceApi` and `TargetApi`
pub struct MockGitlab {
    pub source: RwLock<SourceData>,
    pub target: RwLock<TargetData>,
    /// Remaining injected failures per operation key (`op` or `op:id`)
    failures: RwLock<HashMap<String, u32>>,
    /// Remaining lookups (`find_user`, `find_group`) that report "not found"
    misses: RwLock<HashMap<String, u32>>,
}

impl MockGitlab {
    pub fn new() -> Self {
        let mut admin = api_user(MOCK_ADMIN_ID, "root");
        admin.is_admin = true;
        Self {
            source: RwLock::new(SourceData {
                current_user: Some(admin),
                version: Some("15.11.0".to_string()),
                ..Default::default()
            }),
            target: RwLock::new(TargetData::new()),
            failures: RwLock::new(HashMap::new()),
            misses: RwLock::new(HashMap::new()),
        }
    }

    /// Make every call matching `key` fail with a transient error.
    pub async fn fail_always(&self, key: &str) {
        self.failures.write().await.insert(key.to_string(), u32::MAX);
    }

    /// Make the next `times` calls matching `key` fail.
    pub async fn fail_times(&self, key: &str, times: u32) {
        self.failures.write().await.insert(key.to_string(), times);
    }

    /// Make the next `times` lookups of `op` miss even when the entity exists,
    /// as a target still replicating a concurrent creation would.
    pub async fn miss_times(&self, op: &str, times: u32) {
        self.misses.write().await.insert(op.to_string(), times);
    }

    async fn missed(&self, op: &str) -> bool {
        match self.misses.write().await.get_mut(op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    async fn check(&self, op: &str, id: Option<u64>) -> Result<()> {
        let mut failures = self.failures.write().await;
        let mut keys = vec![op.to_string()];
        if let Some(id) = id {
            keys.push(format!("{}:{}", op, id));
        }
        for key in keys {
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(GitlabError::Transient {
                        what: key,
                        status: 500,
                        body: "injected failure".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for MockGitlab {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SourceApi implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SourceApi for MockGitlab {
    async fn current_user(&self) -> Result<ApiUser> {
        self.check("current_user", None).await?;
        self.source
            .read()
            .await
            .current_user
            .clone()
            .ok_or_else(|| GitlabError::Status {
                what: "current user".into(),
                status: 401,
                body: "401 Unauthorized".into(),
            })
    }

    async fn version(&self) -> Result<ApiVersion> {
        self.check("version", None).await?;
        let version = self.source.read().await.version.clone();
        version
            .map(|version| ApiVersion {
                version,
                revision: String::new(),
            })
            .ok_or_else(|| GitlabError::NotFound {
                what: "version".into(),
            })
    }

    async fn list_users(&self) -> Result<Vec<ApiUser>> {
        self.check("list_users", None).await?;
        Ok(self.source.read().await.users.clone())
    }

    async fn list_groups(&self) -> Result<Vec<ApiGroup>> {
        self.check("list_groups", None).await?;
        Ok(self.source.read().await.groups.clone())
    }

    async fn list_projects(&self) -> Result<Vec<ApiProject>> {
        self.check("list_projects", None).await?;
        Ok(self.source.read().await.projects.clone())
    }

    async fn list_labels(&self, project_id: u64) -> Result<Vec<ApiLabel>> {
        self.check("list_labels", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.labels.get(&project_id).cloned().unwrap_or_default())
    }

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>> {
        self.check("list_milestones", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.milestones.get(&project_id).cloned().unwrap_or_default())
    }

    async fn list_forks(&self, project_id: u64) -> Result<Vec<ApiProject>> {
        self.check("list_forks", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.forks.get(&project_id).cloned().unwrap_or_default())
    }

    async fn list_pipelines(&self, project_id: u64) -> Result<Vec<ApiPipeline>> {
        self.check("list_pipelines", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.pipelines.get(&project_id).cloned().unwrap_or_default())
    }

    async fn get_pipeline(&self, project_id: u64, pipeline_id: u64) -> Result<ApiPipeline> {
        self.check("get_pipeline", Some(pipeline_id)).await?;
        let source = self.source.read().await;
        source
            .pipelines
            .get(&project_id)
            .and_then(|ps| ps.iter().find(|p| p.id == pipeline_id))
            .cloned()
            .ok_or_else(|| GitlabError::NotFound {
                what: format!("pipeline {}", pipeline_id),
            })
    }

    async fn list_pipeline_jobs(&self, _project_id: u64, pipeline_id: u64) -> Result<Vec<ApiJob>> {
        self.check("list_pipeline_jobs", Some(pipeline_id)).await?;
        let source = self.source.read().await;
        Ok(source.jobs.get(&pipeline_id).cloned().unwrap_or_default())
    }

    async fn list_wiki_pages(&self, project_id: u64) -> Result<Vec<ApiWikiPage>> {
        self.check("list_wiki_pages", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.wiki_pages.get(&project_id).cloned().unwrap_or_default())
    }

    async fn list_issues(&self, project_id: u64) -> Result<Vec<ApiIssue>> {
        self.check("list_issues", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.issues.get(&project_id).cloned().unwrap_or_default())
    }

    async fn list_issue_notes(&self, project_id: u64, issue_iid: u64) -> Result<Vec<ApiNote>> {
        self.check("list_issue_notes", Some(issue_iid)).await?;
        let source = self.source.read().await;
        Ok(source
            .issue_notes
            .get(&(project_id, issue_iid))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_merge_requests(&self, project_id: u64) -> Result<Vec<ApiMergeRequest>> {
        self.check("list_merge_requests", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source
            .merge_requests
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_merge_request_notes(&self, project_id: u64, mr_iid: u64) -> Result<Vec<ApiNote>> {
        self.check("list_merge_request_notes", Some(mr_iid)).await?;
        let source = self.source.read().await;
        Ok(source
            .merge_request_notes
            .get(&(project_id, mr_iid))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_project_members_all(&self, project_id: u64) -> Result<Vec<ApiMember>> {
        self.check("list_project_members_all", Some(project_id)).await?;
        let source = self.source.read().await;
        Ok(source.members.get(&project_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// TargetApi implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TargetApi for MockGitlab {
    async fn current_user(&self) -> Result<ApiUser> {
        self.check("target_current_user", None).await?;
        let target = self.target.read().await;
        target
            .user_by_id(MOCK_ADMIN_ID)
            .cloned()
            .ok_or_else(|| GitlabError::NotFound {
                what: "current user".into(),
            })
    }

    async fn find_user(&self, username: &str) -> Result<Option<ApiUser>> {
        self.check("find_user", None).await?;
        if self.missed("find_user").await {
            return Ok(None);
        }
        let target = self.target.read().await;
        Ok(target
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<ApiUser> {
        self.check("create_user", None).await?;
        let mut target = self.target.write().await;
        if target
            .users
            .iter()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(conflict("user"));
        }
        let id = target.allocate_id();
        let created = ApiUser {
            id,
            username: user.username.clone(),
            name: user.name.clone(),
            email: Some(user.email.clone()),
            state: "active".into(),
            is_admin: false,
        };
        target.users.push(created.clone());
        target.calls.push(format!("create_user:{}", user.username));
        Ok(created)
    }

    async fn find_group(&self, full_path: &str) -> Result<Option<ApiGroup>> {
        self.check("find_group", None).await?;
        if self.missed("find_group").await {
            return Ok(None);
        }
        let target = self.target.read().await;
        Ok(target
            .groups
            .iter()
            .find(|g| g.full_path == full_path)
            .cloned())
    }

    async fn create_group(&self, group: &NewGroup) -> Result<ApiGroup> {
        self.check("create_group", None).await?;
        let mut target = self.target.write().await;
        let full_path = match group.parent_id {
            Some(parent_id) => {
                let parent = target
                    .groups
                    .iter()
                    .find(|g| g.id == parent_id)
                    .ok_or_else(|| GitlabError::NotFound {
                        what: format!("group {}", parent_id),
                    })?;
                format!("{}/{}", parent.full_path, group.path)
            }
            None => group.path.clone(),
        };
        if target.groups.iter().any(|g| g.full_path == full_path) {
            return Err(conflict("group"));
        }
        let id = target.allocate_id();
        let created = ApiGroup {
            id,
            name: group.name.clone(),
            path: group.path.clone(),
            full_path: full_path.clone(),
            parent_id: group.parent_id,
            description: Some(group.description.clone()),
            visibility: Some(group.visibility.clone()),
        };
        target.groups.push(created.clone());
        target.calls.push(format!("create_group:{}", full_path));
        Ok(created)
    }

    async fn find_project(&self, full_path: &str) -> Result<Option<ApiProject>> {
        self.check("find_project", None).await?;
        Ok(self.target.read().await.project_by_path(full_path).cloned())
    }

    async fn create_project(&self, owner: ProjectOwner, project: &NewProject) -> Result<ApiProject> {
        self.check("create_project", None).await?;
        let mut target = self.target.write().await;
        let (namespace, kind, owner_ref) = match owner {
            ProjectOwner::Admin => ("root".to_string(), "user", Some(user_ref(MOCK_ADMIN_ID, "root"))),
            ProjectOwner::Group(group_id) => {
                let group = target
                    .groups
                    .iter()
                    .find(|g| g.id == group_id)
                    .ok_or_else(|| GitlabError::NotFound {
                        what: format!("namespace {}", group_id),
                    })?;
                (group.full_path.clone(), "group", None)
            }
            ProjectOwner::User(user_id) => {
                let user = target.user_by_id(user_id).ok_or_else(|| GitlabError::NotFound {
                    what: format!("user {}", user_id),
                })?;
                (
                    user.username.clone(),
                    "user",
                    Some(user_ref(user.id, &user.username)),
                )
            }
        };
        let full_path = format!("{}/{}", namespace, project.path);
        if target.project_by_path(&full_path).is_some() {
            return Err(conflict("project"));
        }
        let id = target.allocate_id();
        let mut created = api_project(id, &namespace, kind, &project.path);
        created.name = project.name.clone();
        created.web_url = format!("http://target.test/{}", full_path);
        created.http_url_to_repo = format!("http://target.test/{}.git", full_path);
        created.visibility = Some(project.visibility.clone());
        created.owner = owner_ref;
        target.projects.push(created.clone());
        target.calls.push(format!("create_project:{}", full_path));
        Ok(created)
    }

    async fn add_member(&self, project_id: u64, member: &NewMember) -> Result<()> {
        self.check("add_member", Some(member.user_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        if target
            .members
            .iter()
            .any(|(p, u, _)| *p == project_id && *u == member.user_id)
        {
            return Err(conflict("member"));
        }
        target
            .members
            .push((project_id, member.user_id, member.access_level));
        target
            .calls
            .push(format!("add_member:{}:{}", project_id, member.user_id));
        Ok(())
    }

    async fn create_label(&self, project_id: u64, label: &NewLabel) -> Result<ApiLabel> {
        self.check("create_label", Some(project_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        if target
            .labels
            .iter()
            .any(|(p, l)| *p == project_id && l.name == label.name)
        {
            return Err(conflict("label"));
        }
        let id = target.allocate_id();
        let created = ApiLabel {
            id,
            name: label.name.clone(),
            color: label.color.clone(),
            description: Some(label.description.clone()),
        };
        target.labels.push((project_id, created.clone()));
        target
            .calls
            .push(format!("create_label:{}:{}", project_id, label.name));
        Ok(created)
    }

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>> {
        self.check("target_list_milestones", Some(project_id)).await?;
        let target = self.target.read().await;
        Ok(target
            .milestones
            .iter()
            .filter(|(p, _)| *p == project_id)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn create_milestone(&self, project_id: u64, milestone: &NewMilestone) -> Result<ApiMilestone> {
        self.check("create_milestone", Some(project_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        if target
            .milestones
            .iter()
            .any(|(p, m)| *p == project_id && m.title == milestone.title)
        {
            return Err(GitlabError::from_status(
                "create milestone",
                400,
                r#"{"message":"Title already being used for another group or project milestone."}"#
                    .to_string(),
            ));
        }
        let id = target.allocate_id();
        let created = ApiMilestone {
            id,
            iid: id,
            title: milestone.title.clone(),
            description: Some(milestone.description.clone()),
            state: "active".into(),
            due_date: milestone.due_date.clone(),
            start_date: milestone.start_date.clone(),
        };
        target.milestones.push((project_id, created.clone()));
        target
            .calls
            .push(format!("create_milestone:{}:{}", project_id, milestone.title));
        Ok(created)
    }

    async fn close_milestone(&self, project_id: u64, milestone_id: u64) -> Result<()> {
        self.check("close_milestone", Some(milestone_id)).await?;
        let mut target = self.target.write().await;
        let milestone = target
            .milestones
            .iter_mut()
            .find(|(p, m)| *p == project_id && m.id == milestone_id)
            .ok_or_else(|| GitlabError::NotFound {
                what: format!("milestone {}", milestone_id),
            })?;
        milestone.1.state = "closed".into();
        target
            .calls
            .push(format!("close_milestone:{}:{}", project_id, milestone_id));
        Ok(())
    }

    async fn star_project(&self, project_id: u64, actor: &Actor) -> Result<bool> {
        self.check("star_project", Some(project_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        let user = target.actor_ref(actor)?;
        if target
            .stars
            .iter()
            .any(|(p, u)| *p == project_id && *u == user.id)
        {
            return Ok(false);
        }
        target.stars.push((project_id, user.id));
        target
            .calls
            .push(format!("star_project:{}:{}", project_id, user.username));
        Ok(true)
    }

    async fn create_wiki_page(&self, project_id: u64, page: &NewWikiPage) -> Result<()> {
        self.check("create_wiki_page", Some(project_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        target.wiki_pages.push((project_id, page.clone()));
        target
            .calls
            .push(format!("create_wiki_page:{}:{}", project_id, page.title));
        Ok(())
    }

    async fn create_issue(&self, project_id: u64, actor: &Actor, issue: &NewIssue) -> Result<ApiIssue> {
        self.check("create_issue", Some(project_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        let author = target.actor_ref(actor)?;
        let iid = target.issues_of(project_id).len() as u64 + 1;
        let milestone = issue.milestone_id.and_then(|id| {
            target
                .milestones
                .iter()
                .find(|(_, m)| m.id == id)
                .map(|(_, m)| m.clone())
        });
        let assignees = issue
            .assignee_ids
            .iter()
            .filter_map(|id| target.user_by_id(*id))
            .map(|u| user_ref(u.id, &u.username))
            .collect();
        let mut created = api_issue(iid, &issue.title, author.clone());
        created.description = Some(issue.description.clone());
        created.labels = issue
            .labels
            .split(',')
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        created.milestone = milestone;
        created.assignees = assignees;
        created.created_at = issue.created_at.clone();
        target.issues.push((project_id, created.clone()));
        target.calls.push(format!(
            "create_issue:{}:{}:{}",
            project_id, iid, author.username
        ));
        Ok(created)
    }

    async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()> {
        self.check("create_issue_note", Some(issue_iid)).await?;
        let mut target = self.target.write().await;
        if !target.issues_of(project_id).iter().any(|i| i.iid == issue_iid) {
            return Err(GitlabError::NotFound {
                what: format!("issue {}", issue_iid),
            });
        }
        let author = target.actor_ref(actor)?;
        target.notes.push(MockNote {
            project_id,
            noteable: "issue",
            iid: issue_iid,
            author: author.username.clone(),
            body: note.body.clone(),
        });
        target.calls.push(format!(
            "create_issue_note:{}:{}:{}",
            project_id, issue_iid, author.username
        ));
        Ok(())
    }

    async fn close_issue(&self, project_id: u64, issue_iid: u64) -> Result<()> {
        self.check("close_issue", Some(issue_iid)).await?;
        let mut target = self.target.write().await;
        let issue = target
            .issues
            .iter_mut()
            .find(|(p, i)| *p == project_id && i.iid == issue_iid)
            .ok_or_else(|| GitlabError::NotFound {
                what: format!("issue {}", issue_iid),
            })?;
        issue.1.state = "closed".into();
        target
            .calls
            .push(format!("close_issue:{}:{}", project_id, issue_iid));
        Ok(())
    }

    async fn create_merge_request(
        &self,
        project_id: u64,
        actor: &Actor,
        mr: &NewMergeRequest,
    ) -> Result<ApiMergeRequest> {
        self.check("create_merge_request", Some(project_id)).await?;
        let mut target = self.target.write().await;
        target.project_exists(project_id)?;
        let author = target.actor_ref(actor)?;
        let iid = target.merge_requests_of(project_id).len() as u64 + 1;
        let mut created = api_merge_request(iid, &mr.title, author.clone(), "opened");
        created.source_branch = mr.source_branch.clone();
        created.target_branch = mr.target_branch.clone();
        created.description = Some(mr.description.clone());
        created.created_at = mr.created_at.clone();
        target.merge_requests.push((project_id, created.clone()));
        target.calls.push(format!(
            "create_merge_request:{}:{}:{}",
            project_id, iid, author.username
        ));
        Ok(created)
    }

    async fn create_merge_request_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()> {
        self.check("create_merge_request_note", Some(mr_iid)).await?;
        let mut target = self.target.write().await;
        if !target
            .merge_requests_of(project_id)
            .iter()
            .any(|m| m.iid == mr_iid)
        {
            return Err(GitlabError::NotFound {
                what: format!("merge request {}", mr_iid),
            });
        }
        let author = target.actor_ref(actor)?;
        target.notes.push(MockNote {
            project_id,
            noteable: "merge_request",
            iid: mr_iid,
            author: author.username.clone(),
            body: note.body.clone(),
        });
        target.calls.push(format!(
            "create_merge_request_note:{}:{}:{}",
            project_id, mr_iid, author.username
        ));
        Ok(())
    }

    async fn merge_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()> {
        self.check("merge_merge_request", Some(mr_iid)).await?;
        self.transition_merge_request(project_id, mr_iid, "merged")
            .await
    }

    async fn close_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()> {
        self.check("close_merge_request", Some(mr_iid)).await?;
        self.transition_merge_request(project_id, mr_iid, "closed")
            .await
    }
}

impl MockGitlab {
    async fn transition_merge_request(&self, project_id: u64, mr_iid: u64, state: &str) -> Result<()> {
        let mut target = self.target.write().await;
        let mr = target
            .merge_requests
            .iter_mut()
            .find(|(p, m)| *p == project_id && m.iid == mr_iid)
            .ok_or_else(|| GitlabError::NotFound {
                what: format!("merge request {}", mr_iid),
            })?;
        mr.1.state = state.to_string();
        target
            .calls
            .push(format!("{}_merge_request:{}:{}", state, project_id, mr_iid));
        Ok(())
    }
}
