//! SourceApi trait implementation for GitlabClient
//!
//! Each trait method delegates directly to the corresponding inherent method
//! on `GitlabClient`.

use async_trait::async_trait;

use super::client::GitlabClient;
use super::error::Result;
use super::models::*;
use super::traits::SourceApi;

#[async_trait]
impl SourceApi for GitlabClient {
    async fn current_user(&self) -> Result<ApiUser> {
        self.current_user().await
    }

    async fn version(&self) -> Result<ApiVersion> {
        self.version().await
    }

    async fn list_users(&self) -> Result<Vec<ApiUser>> {
        self.list_users().await
    }

    async fn list_groups(&self) -> Result<Vec<ApiGroup>> {
        self.list_groups().await
    }

    async fn list_projects(&self) -> Result<Vec<ApiProject>> {
        self.list_projects().await
    }

    async fn list_labels(&self, project_id: u64) -> Result<Vec<ApiLabel>> {
        self.list_labels(project_id).await
    }

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>> {
        self.list_milestones(project_id).await
    }

    async fn list_forks(&self, project_id: u64) -> Result<Vec<ApiProject>> {
        self.list_forks(project_id).await
    }

    async fn list_pipelines(&self, project_id: u64) -> Result<Vec<ApiPipeline>> {
        self.list_pipelines(project_id).await
    }

    async fn get_pipeline(&self, project_id: u64, pipeline_id: u64) -> Result<ApiPipeline> {
        self.get_pipeline(project_id, pipeline_id).await
    }

    async fn list_pipeline_jobs(&self, project_id: u64, pipeline_id: u64) -> Result<Vec<ApiJob>> {
        self.list_pipeline_jobs(project_id, pipeline_id).await
    }

    async fn list_wiki_pages(&self, project_id: u64) -> Result<Vec<ApiWikiPage>> {
        self.list_wiki_pages(project_id).await
    }

    async fn list_issues(&self, project_id: u64) -> Result<Vec<ApiIssue>> {
        self.list_issues(project_id).await
    }

    async fn list_issue_notes(&self, project_id: u64, issue_iid: u64) -> Result<Vec<ApiNote>> {
        self.list_issue_notes(project_id, issue_iid).await
    }

    async fn list_merge_requests(&self, project_id: u64) -> Result<Vec<ApiMergeRequest>> {
        self.list_merge_requests(project_id).await
    }

    async fn list_merge_request_notes(
        &self,
        project_id: u64,
        mr_iid: u64,
    ) -> Result<Vec<ApiNote>> {
        self.list_merge_request_notes(project_id, mr_iid).await
    }

    async fn list_project_members_all(&self, project_id: u64) -> Result<Vec<ApiMember>> {
        self.list_project_members_all(project_id).await
    }
}
