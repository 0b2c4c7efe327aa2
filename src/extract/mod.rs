//! Extraction engine
//!
//! Crawls a source instance and writes the workspace into a [`Journal`]:
//! users and groups first, then one fully nested record per project. Each
//! project is appended to the journal as soon as it is complete, so a crash
//! midway keeps every project already written.
//!
//! Every remote call goes through the configured [`RetryPolicy`]. A
//! sub-collection that still fails is left empty and named in the project's
//! `failed_collections`; it never aborts the project or the run.

pub mod convert;
mod members;

pub use members::{MembershipExtractor, MembershipReport};

use crate::git::{self, TOKEN_USER};
use crate::gitlab::models::ApiProject;
use crate::gitlab::{GitlabError, SourceApi};
use crate::model::{ExportInfo, GroupRecord, ProjectRecord, UserRecord};
use crate::retry::RetryPolicy;
use crate::store::{Journal, JournalStats};
use crate::SourceSettings;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one export run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub users: usize,
    pub groups: usize,
    /// Projects appended to the journal
    pub projects: usize,
    /// Projects that could not be listed or written
    pub failed_projects: usize,
    /// Sub-collections left empty after retries, across all projects
    pub failed_collections: usize,
}

pub struct Extractor {
    source: Arc<dyn SourceApi>,
    settings: SourceSettings,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(source: Arc<dyn SourceApi>, settings: SourceSettings, retry: RetryPolicy) -> Self {
        Self {
            source,
            settings,
            retry,
        }
    }

    /// Export the whole workspace into a fresh journal at `journal_path`.
    pub async fn run(&self, journal_path: &Path) -> Result<ExportReport> {
        let me = self
            .source
            .current_user()
            .await
            .with_context(|| format!("Cannot authenticate to source {}", self.settings.url))?;
        info!(username = %me.username, url = %self.settings.url, "Connected to source");

        let version = match self.source.version().await {
            Ok(v) => Some(v.version),
            Err(e) => {
                warn!("Could not detect source version: {}", e);
                None
            }
        };

        let journal = Journal::create(
            journal_path,
            ExportInfo::new(self.settings.url.clone(), version),
        )?;
        let mut report = ExportReport::default();

        let users = self.export_users().await;
        journal.set_users(&users)?;
        report.users = users.len();

        let groups = self.export_groups().await;
        journal.set_groups(&groups)?;
        report.groups = groups.len();

        let projects = match self
            .retry
            .run("list projects", || self.source.list_projects())
            .await
        {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Failed to list projects: {}", e);
                return Ok(report);
            }
        };
        info!("Exporting {} projects", projects.len());

        for (index, project) in projects.iter().enumerate() {
            info!(
                project = %project.path_with_namespace,
                "[{}/{}] Exporting project",
                index + 1,
                projects.len()
            );
            let record = self.extract_project(project).await;
            report.failed_collections += record.failed_collections.len();
            match journal.append(&record) {
                Ok(()) => report.projects += 1,
                Err(e) => {
                    warn!(project = %project.path_with_namespace, "Failed to write project: {:#}", e);
                    report.failed_projects += 1;
                }
            }
        }

        info!(
            projects = report.projects,
            failed = report.failed_projects,
            failed_collections = report.failed_collections,
            "Export finished"
        );
        if let Ok(doc) = Journal::read(journal.path()) {
            JournalStats::from_document(&doc).log();
        }
        Ok(report)
    }

    /// Active users other than the built-in administrator
    async fn export_users(&self) -> Vec<UserRecord> {
        match self
            .retry
            .run("list users", || self.source.list_users())
            .await
        {
            Ok(users) => users
                .into_iter()
                .filter(|u| u.state == "active")
                .filter(|u| u.username != self.settings.admin_username)
                .map(UserRecord::from)
                .collect(),
            Err(e) => {
                warn!("Failed to list users: {}", e);
                Vec::new()
            }
        }
    }

    async fn export_groups(&self) -> Vec<GroupRecord> {
        match self
            .retry
            .run("list groups", || self.source.list_groups())
            .await
        {
            Ok(groups) => groups.into_iter().map(GroupRecord::from).collect(),
            Err(e) => {
                warn!("Failed to list groups: {}", e);
                Vec::new()
            }
        }
    }

    /// Run one collection fetch under retry. On final failure the collection
    /// name is recorded and the default (empty) value returned.
    async fn fetch<T, F, Fut>(
        &self,
        project: &str,
        collection: String,
        failed: &mut Vec<String>,
        op: F,
    ) -> T
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitlabError>>,
    {
        let label = format!("{} of {}", collection, project);
        match self.retry.run(&label, op).await {
            Ok(value) => value,
            Err(e) => {
                warn!(project, collection = %collection, "Collection export failed: {}", e);
                failed.push(collection);
                T::default()
            }
        }
    }

    /// Build the full nested record of one project.
    pub async fn extract_project(&self, project: &ApiProject) -> ProjectRecord {
        let id = project.id;
        let name = project.path_with_namespace.as_str();
        let source = &self.source;
        let mut failed = Vec::new();

        let authed = git::embed_credentials(&project.http_url_to_repo, TOKEN_USER, &self.settings.token);
        if authed.is_none() && !project.http_url_to_repo.is_empty() {
            debug!(project = name, "Clone URL is not a valid URL, no credentials embedded");
        }
        let mut record = convert::project_record(project, authed);

        record.labels = self
            .fetch(name, "labels".into(), &mut failed, || source.list_labels(id))
            .await
            .into_iter()
            .map(Into::into)
            .collect();

        record.milestones = self
            .fetch(name, "milestones".into(), &mut failed, || source.list_milestones(id))
            .await
            .into_iter()
            .map(Into::into)
            .collect();

        record.forks = self
            .fetch(name, "forks".into(), &mut failed, || source.list_forks(id))
            .await
            .into_iter()
            .map(Into::into)
            .collect();

        let pipelines = self
            .fetch(name, "pipelines".into(), &mut failed, || source.list_pipelines(id))
            .await;
        for summary in pipelines {
            let pipeline_id = summary.id;
            let label = format!("pipeline {} of {}", pipeline_id, name);
            let detail = match self
                .retry
                .run(&label, || source.get_pipeline(id, pipeline_id))
                .await
            {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(project = name, pipeline = pipeline_id, "Skipping pipeline: {}", e);
                    failed.push(format!("pipelines/{}", pipeline_id));
                    continue;
                }
            };
            let jobs = self
                .fetch(
                    name,
                    format!("pipelines/{}/jobs", pipeline_id),
                    &mut failed,
                    || source.list_pipeline_jobs(id, pipeline_id),
                )
                .await;
            record.pipelines.push(convert::pipeline_record(detail, jobs));
        }

        if record.wiki_enabled {
            record.wiki_pages = self
                .fetch(name, "wiki_pages".into(), &mut failed, || source.list_wiki_pages(id))
                .await
                .into_iter()
                .map(Into::into)
                .collect();
        }

        let issues = self
            .fetch(name, "issues".into(), &mut failed, || source.list_issues(id))
            .await;
        for issue in issues {
            let iid = issue.iid;
            let notes = self
                .fetch(name, format!("issues/{}/notes", iid), &mut failed, || {
                    source.list_issue_notes(id, iid)
                })
                .await;
            record
                .issues
                .push(convert::issue_record(issue, convert::comments(notes)));
        }

        let merge_requests = self
            .fetch(name, "merge_requests".into(), &mut failed, || {
                source.list_merge_requests(id)
            })
            .await;
        for mr in merge_requests {
            let iid = mr.iid;
            let notes = self
                .fetch(
                    name,
                    format!("merge_requests/{}/notes", iid),
                    &mut failed,
                    || source.list_merge_request_notes(id, iid),
                )
                .await;
            record
                .merge_requests
                .push(convert::merge_request_record(mr, convert::comments(notes)));
        }

        debug!(
            project = name,
            labels = record.labels.len(),
            milestones = record.milestones.len(),
            pipelines = record.pipelines.len(),
            issues = record.issues.len(),
            merge_requests = record.merge_requests.len(),
            "Project extracted"
        );
        record.failed_collections = failed;
        record
    }
}
