//! TargetApi trait implementation for GitlabClient

use async_trait::async_trait;

use super::client::GitlabClient;
use super::error::Result;
use super::models::*;
use super::traits::{Actor, TargetApi};

#[async_trait]
impl TargetApi for GitlabClient {
    // ========================================================================
    // Identities and namespaces
    // ========================================================================

    async fn current_user(&self) -> Result<ApiUser> {
        self.current_user().await
    }

    async fn find_user(&self, username: &str) -> Result<Option<ApiUser>> {
        self.find_user(username).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<ApiUser> {
        self.create_user(user).await
    }

    async fn find_group(&self, full_path: &str) -> Result<Option<ApiGroup>> {
        self.find_group(full_path).await
    }

    async fn create_group(&self, group: &NewGroup) -> Result<ApiGroup> {
        self.create_group(group).await
    }

    // ========================================================================
    // Projects
    // ========================================================================

    async fn find_project(&self, full_path: &str) -> Result<Option<ApiProject>> {
        self.find_project(full_path).await
    }

    async fn create_project(
        &self,
        owner: ProjectOwner,
        project: &NewProject,
    ) -> Result<ApiProject> {
        self.create_project(owner, project).await
    }

    async fn add_member(&self, project_id: u64, member: &NewMember) -> Result<()> {
        self.add_member(project_id, member).await
    }

    async fn create_label(&self, project_id: u64, label: &NewLabel) -> Result<ApiLabel> {
        self.create_label(project_id, label).await
    }

    async fn list_milestones(&self, project_id: u64) -> Result<Vec<ApiMilestone>> {
        self.list_milestones(project_id).await
    }

    async fn create_milestone(
        &self,
        project_id: u64,
        milestone: &NewMilestone,
    ) -> Result<ApiMilestone> {
        self.create_milestone(project_id, milestone).await
    }

    async fn close_milestone(&self, project_id: u64, milestone_id: u64) -> Result<()> {
        self.close_milestone(project_id, milestone_id).await
    }

    async fn star_project(&self, project_id: u64, actor: &Actor) -> Result<bool> {
        self.star_project(project_id, actor).await
    }

    async fn create_wiki_page(&self, project_id: u64, page: &NewWikiPage) -> Result<()> {
        self.create_wiki_page(project_id, page).await
    }

    // ========================================================================
    // Issues and merge requests
    // ========================================================================

    async fn create_issue(
        &self,
        project_id: u64,
        actor: &Actor,
        issue: &NewIssue,
    ) -> Result<ApiIssue> {
        self.create_issue(project_id, actor, issue).await
    }

    async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()> {
        self.create_issue_note(project_id, issue_iid, actor, note)
            .await
    }

    async fn close_issue(&self, project_id: u64, issue_iid: u64) -> Result<()> {
        self.close_issue(project_id, issue_iid).await
    }

    async fn create_merge_request(
        &self,
        project_id: u64,
        actor: &Actor,
        mr: &NewMergeRequest,
    ) -> Result<ApiMergeRequest> {
        self.create_merge_request(project_id, actor, mr).await
    }

    async fn create_merge_request_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        actor: &Actor,
        note: &NewNote,
    ) -> Result<()> {
        self.create_merge_request_note(project_id, mr_iid, actor, note)
            .await
    }

    async fn merge_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()> {
        self.merge_merge_request(project_id, mr_iid).await
    }

    async fn close_merge_request(&self, project_id: u64, mr_iid: u64) -> Result<()> {
        self.close_merge_request(project_id, mr_iid).await
    }
}
