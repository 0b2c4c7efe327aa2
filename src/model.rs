//! Journal records: the typed shape of an exported workspace
//!
//! Every record is written once by the extractor and read back by the
//! reconstructor. Optional fields default at deserialization so journals
//! produced by older exports (or edited by hand) still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Export document
// ============================================================================

/// Header written once when a journal is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportInfo {
    pub source_url: String,
    pub export_time: DateTime<Utc>,
    #[serde(default)]
    pub gitlab_version: Option<String>,
}

impl ExportInfo {
    pub fn new(source_url: impl Into<String>, gitlab_version: Option<String>) -> Self {
        Self {
            source_url: source_url.into(),
            export_time: Utc::now(),
            gitlab_version,
        }
    }
}

/// The whole journal document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub export_info: ExportInfo,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}

impl ExportDocument {
    pub fn empty(export_info: ExportInfo) -> Self {
        Self {
            export_info,
            users: Vec::new(),
            groups: Vec::new(),
            projects: Vec::new(),
        }
    }
}

// ============================================================================
// Identities and namespaces
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_user_state")]
    pub state: String,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_user_state() -> String {
    "active".to_string()
}

impl UserRecord {
    /// Minimal record for a username that only appears as a reference
    pub fn placeholder(username: &str) -> Self {
        Self {
            id: 0,
            username: username.to_string(),
            name: username.to_string(),
            email: String::new(),
            state: default_user_state(),
            is_admin: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub path: String,
    pub full_path: String,
    #[serde(default)]
    pub parent_full_path: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
}

impl GroupRecord {
    /// Nesting depth; top-level groups are 0
    pub fn depth(&self) -> usize {
        self.full_path.matches('/').count()
    }
}

fn default_visibility() -> String {
    "private".to_string()
}

/// Kind of container owning a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    User,
    Group,
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceKind::User => write!(f, "user"),
            NamespaceKind::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRef {
    pub full_path: String,
    pub kind: NamespaceKind,
}

// ============================================================================
// Access levels
// ============================================================================

/// Ordinal project role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl AccessLevel {
    /// Numeric value used by the GitLab API
    pub fn as_u16(self) -> u16 {
        match self {
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Maintainer => 40,
            AccessLevel::Owner => 50,
        }
    }
}

impl TryFrom<u16> for AccessLevel {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(AccessLevel::Guest),
            20 => Ok(AccessLevel::Reporter),
            30 => Ok(AccessLevel::Developer),
            40 => Ok(AccessLevel::Maintainer),
            50 => Ok(AccessLevel::Owner),
            other => Err(format!("unknown access level {}", other)),
        }
    }
}

impl From<AccessLevel> for u16 {
    fn from(level: AccessLevel) -> Self {
        level.as_u16()
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessLevel::Guest => "Guest",
            AccessLevel::Reporter => "Reporter",
            AccessLevel::Developer => "Developer",
            AccessLevel::Maintainer => "Maintainer",
            AccessLevel::Owner => "Owner",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub username: String,
    pub access_level: AccessLevel,
}

/// Membership pass output, keyed by source project id.
///
/// `None` is the "extraction failed" sentinel, distinct from an empty list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub export_info: ExportInfo,
    #[serde(default, deserialize_with = "known_members")]
    pub project_members: BTreeMap<String, Option<Vec<MemberRecord>>>,
}

/// Member entry as found on disk, before its level is checked
#[derive(Deserialize)]
struct StoredMember {
    username: String,
    access_level: u16,
}

/// Drop members whose level is not one of the five project roles
/// (minimal access, custom roles) instead of rejecting the snapshot.
fn known_members<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Option<Vec<MemberRecord>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = BTreeMap::<String, Option<Vec<StoredMember>>>::deserialize(deserializer)?;
    Ok(stored
        .into_iter()
        .map(|(project_id, members)| {
            let members = members.map(|members| {
                members
                    .into_iter()
                    .filter_map(|m| match AccessLevel::try_from(m.access_level) {
                        Ok(access_level) => Some(MemberRecord {
                            username: m.username,
                            access_level,
                        }),
                        Err(e) => {
                            tracing::warn!(
                                project_id = %project_id,
                                username = %m.username,
                                "Skipping member in snapshot: {}",
                                e
                            );
                            None
                        }
                    })
                    .collect()
            });
            (project_id, members)
        })
        .collect())
}

impl MembershipSnapshot {
    pub fn empty(export_info: ExportInfo) -> Self {
        Self {
            export_info,
            project_members: BTreeMap::new(),
        }
    }

    /// Members recorded for a source project id
    pub fn lookup(&self, project_id: u64) -> MembershipLookup<'_> {
        match self.project_members.get(&project_id.to_string()) {
            None => MembershipLookup::Absent,
            Some(None) => MembershipLookup::Failed,
            Some(Some(members)) => MembershipLookup::Found(members),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum MembershipLookup<'a> {
    /// Project was not part of the membership pass
    Absent,
    /// Membership extraction failed for this project
    Failed,
    Found(&'a [MemberRecord]),
}

// ============================================================================
// Project and nested collections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub path: String,
    pub namespace: NamespaceRef,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub http_url_to_repo: String,
    #[serde(default)]
    pub ssh_url_to_repo: String,
    #[serde(default)]
    pub authed_http_url_to_repo: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_activity_at: Option<String>,
    #[serde(default)]
    pub star_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default = "default_true")]
    pub wiki_enabled: bool,
    #[serde(default = "default_true")]
    pub issues_enabled: bool,
    #[serde(default = "default_true")]
    pub merge_requests_enabled: bool,
    #[serde(default)]
    pub snippets_enabled: bool,
    #[serde(default)]
    pub labels: Vec<LabelRecord>,
    #[serde(default)]
    pub milestones: Vec<MilestoneRecord>,
    #[serde(default)]
    pub forks: Vec<ForkRecord>,
    #[serde(default)]
    pub stars: StarRecord,
    #[serde(default)]
    pub pipelines: Vec<PipelineRecord>,
    #[serde(default)]
    pub wiki_pages: Vec<WikiPageRecord>,
    #[serde(default)]
    pub issues: Vec<IssueRecord>,
    #[serde(default)]
    pub merge_requests: Vec<MergeRequestRecord>,
    /// Sub-collections that could not be extracted after retries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_collections: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ProjectRecord {
    /// `namespace/path`, the key a target project is matched by
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.namespace.full_path, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_milestone_state")]
    pub state: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
}

fn default_milestone_state() -> String {
    "active".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub web_url: String,
}

/// Star aggregate; the source exposes only a count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StarRecord {
    #[serde(default)]
    pub star_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiPageRecord {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_wiki_format")]
    pub format: String,
    #[serde(default)]
    pub content: String,
}

fn default_wiki_format() -> String {
    "markdown".to_string()
}

/// Lifecycle state of an issue or merge request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    #[default]
    Opened,
    Closed,
    /// Merge requests only
    Merged,
    /// Merge requests only; replayed as opened
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: EntityState,
    pub author: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequestRecord {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: EntityState,
    pub source_branch: String,
    pub target_branch: String,
    pub author: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
}
