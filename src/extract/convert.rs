//! Conversions from API responses to journal records

use crate::gitlab::models::*;
use crate::model::*;

impl From<ApiUser> for UserRecord {
    fn from(user: ApiUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            email: user.email.unwrap_or_default(),
            state: user.state,
            is_admin: user.is_admin,
        }
    }
}

impl From<ApiGroup> for GroupRecord {
    fn from(group: ApiGroup) -> Self {
        let parent_full_path = group
            .full_path
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string());
        Self {
            id: group.id,
            name: group.name,
            path: group.path,
            full_path: group.full_path,
            parent_full_path,
            description: group.description.unwrap_or_default(),
            visibility: group.visibility.unwrap_or_else(|| "private".to_string()),
        }
    }
}

/// Namespace kind as reported by the API; anything not `group` is personal
pub fn namespace_kind(kind: &str) -> NamespaceKind {
    if kind.eq_ignore_ascii_case("group") {
        NamespaceKind::Group
    } else {
        NamespaceKind::User
    }
}

/// Project record without nested collections
pub fn project_record(project: &ApiProject, authed_http_url_to_repo: Option<String>) -> ProjectRecord {
    ProjectRecord {
        id: project.id,
        name: project.name.clone(),
        path: project.path.clone(),
        namespace: NamespaceRef {
            full_path: project.namespace.full_path.clone(),
            kind: namespace_kind(&project.namespace.kind),
        },
        visibility: project
            .visibility
            .clone()
            .unwrap_or_else(|| "private".to_string()),
        description: project.description.clone().unwrap_or_default(),
        web_url: project.web_url.clone(),
        http_url_to_repo: project.http_url_to_repo.clone(),
        ssh_url_to_repo: project.ssh_url_to_repo.clone(),
        authed_http_url_to_repo,
        default_branch: project.default_branch.clone(),
        created_at: project.created_at.clone(),
        last_activity_at: project.last_activity_at.clone(),
        star_count: project.star_count,
        forks_count: project.forks_count,
        wiki_enabled: project.wiki_enabled.unwrap_or(false),
        issues_enabled: project.issues_enabled.unwrap_or(false),
        merge_requests_enabled: project.merge_requests_enabled.unwrap_or(false),
        snippets_enabled: project.snippets_enabled.unwrap_or(false),
        labels: Vec::new(),
        milestones: Vec::new(),
        forks: Vec::new(),
        stars: StarRecord {
            star_count: project.star_count,
        },
        pipelines: Vec::new(),
        wiki_pages: Vec::new(),
        issues: Vec::new(),
        merge_requests: Vec::new(),
        failed_collections: Vec::new(),
    }
}

impl From<ApiLabel> for LabelRecord {
    fn from(label: ApiLabel) -> Self {
        Self {
            name: label.name,
            color: label.color,
            description: label.description.unwrap_or_default(),
        }
    }
}

impl From<ApiMilestone> for MilestoneRecord {
    fn from(milestone: ApiMilestone) -> Self {
        Self {
            title: milestone.title,
            description: milestone.description.unwrap_or_default(),
            state: if milestone.state.is_empty() {
                "active".to_string()
            } else {
                milestone.state
            },
            due_date: milestone.due_date,
            start_date: milestone.start_date,
        }
    }
}

impl From<ApiProject> for ForkRecord {
    fn from(fork: ApiProject) -> Self {
        Self {
            id: fork.id,
            name: fork.name,
            path: fork.path,
            namespace: fork.namespace.full_path,
            web_url: fork.web_url,
        }
    }
}

pub fn pipeline_record(pipeline: ApiPipeline, jobs: Vec<ApiJob>) -> PipelineRecord {
    PipelineRecord {
        id: pipeline.id,
        status: pipeline.status,
        git_ref: pipeline.git_ref.unwrap_or_default(),
        sha: pipeline.sha.unwrap_or_default(),
        created_at: pipeline.created_at,
        updated_at: pipeline.updated_at,
        jobs: jobs.into_iter().map(JobRecord::from).collect(),
    }
}

impl From<ApiJob> for JobRecord {
    fn from(job: ApiJob) -> Self {
        Self {
            id: job.id,
            name: job.name,
            stage: job.stage,
            status: job.status,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

impl From<ApiWikiPage> for WikiPageRecord {
    fn from(page: ApiWikiPage) -> Self {
        Self {
            slug: page.slug,
            title: page.title,
            format: page.format.unwrap_or_else(|| "markdown".to_string()),
            content: page.content.unwrap_or_default(),
        }
    }
}

/// Map an API state string; unknown states replay as opened
pub fn entity_state(state: &str) -> EntityState {
    match state {
        "closed" => EntityState::Closed,
        "merged" => EntityState::Merged,
        "locked" => EntityState::Locked,
        _ => EntityState::Opened,
    }
}

/// Human-authored notes only, oldest first as returned
pub fn comments(notes: Vec<ApiNote>) -> Vec<CommentRecord> {
    notes
        .into_iter()
        .filter(|n| !n.system)
        .map(|n| CommentRecord {
            author: n.author.username,
            body: n.body,
            created_at: n.created_at,
        })
        .collect()
}

pub fn issue_record(issue: ApiIssue, comments: Vec<CommentRecord>) -> IssueRecord {
    IssueRecord {
        iid: issue.iid,
        title: issue.title,
        description: issue.description.unwrap_or_default(),
        state: entity_state(&issue.state),
        author: issue.author.username,
        assignees: issue.assignees.into_iter().map(|a| a.username).collect(),
        labels: issue.labels,
        milestone: issue.milestone.map(|m| m.title),
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        comments,
    }
}

pub fn merge_request_record(mr: ApiMergeRequest, comments: Vec<CommentRecord>) -> MergeRequestRecord {
    MergeRequestRecord {
        iid: mr.iid,
        title: mr.title,
        description: mr.description.unwrap_or_default(),
        state: entity_state(&mr.state),
        source_branch: mr.source_branch,
        target_branch: mr.target_branch,
        author: mr.author.username,
        assignees: mr.assignees.into_iter().map(|a| a.username).collect(),
        labels: mr.labels,
        milestone: mr.milestone.map(|m| m.title),
        created_at: mr.created_at,
        updated_at: mr.updated_at,
        comments,
    }
}

/// Known access level, or `None` for levels outside the five project roles
pub fn member_record(member: ApiMember) -> Option<MemberRecord> {
    match AccessLevel::try_from(member.access_level) {
        Ok(access_level) => Some(MemberRecord {
            username: member.username,
            access_level,
        }),
        Err(e) => {
            tracing::debug!(username = %member.username, "Skipping member: {}", e);
            None
        }
    }
}
