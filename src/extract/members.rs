//! Membership pass
//!
//! Project member lists on a project object leave out roles inherited from
//! ancestor groups, so effective membership is fetched separately through
//! the `members/all` endpoint and stored in its own snapshot, keyed by
//! source project id. A project whose members cannot be fetched is stored
//! as `null` rather than an empty list.

use super::convert;
use crate::gitlab::SourceApi;
use crate::model::ExportInfo;
use crate::retry::RetryPolicy;
use crate::store::MembershipStore;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipReport {
    pub projects: usize,
    pub failed: usize,
    pub members: usize,
}

pub struct MembershipExtractor {
    source: Arc<dyn SourceApi>,
    source_url: String,
    retry: RetryPolicy,
}

impl MembershipExtractor {
    pub fn new(source: Arc<dyn SourceApi>, source_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            source,
            source_url: source_url.into(),
            retry,
        }
    }

    pub async fn run(&self, output: &Path) -> Result<MembershipReport> {
        self.source
            .current_user()
            .await
            .with_context(|| format!("Cannot authenticate to source {}", self.source_url))?;

        let projects = self
            .retry
            .run("list projects", || self.source.list_projects())
            .await
            .context("Failed to list projects for the membership pass")?;

        let mut store = MembershipStore::create(output, ExportInfo::new(self.source_url.clone(), None))?;
        let mut report = MembershipReport::default();

        for project in &projects {
            let id = project.id;
            let label = format!("members of {}", project.path_with_namespace);
            let members = match self
                .retry
                .run(&label, || self.source.list_project_members_all(id))
                .await
            {
                Ok(members) => {
                    let members: Vec<_> = members
                        .into_iter()
                        .filter_map(convert::member_record)
                        .collect();
                    report.members += members.len();
                    Some(members)
                }
                Err(e) => {
                    warn!(project = %project.path_with_namespace, "Failed to fetch members: {}", e);
                    report.failed += 1;
                    None
                }
            };
            store.record(id, members)?;
            report.projects += 1;
        }

        info!(
            projects = report.projects,
            failed = report.failed,
            members = report.members,
            "Membership export finished"
        );
        Ok(report)
    }
}
