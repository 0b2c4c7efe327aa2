//! Identity and namespace resolution on the target
//!
//! Maps source usernames and namespace paths to target ids. Every
//! resolution is lookup-first and treats a creation conflict as "someone
//! created it already", so resolving the same identity twice (or re-running
//! a whole migration) never duplicates users or groups.

use crate::gitlab::models::{ApiGroup, ApiUser, NewGroup, NewUser, ProjectOwner};
use crate::gitlab::{Actor, TargetApi};
use crate::model::{GroupRecord, NamespaceKind, NamespaceRef, UserRecord};
use crate::TargetSettings;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolved owner of a project on the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceHandle {
    User { id: u64, username: String },
    Group { id: u64, full_path: String },
}

impl NamespaceHandle {
    pub fn owner(&self) -> ProjectOwner {
        match self {
            NamespaceHandle::User { id, .. } => ProjectOwner::User(*id),
            NamespaceHandle::Group { id, .. } => ProjectOwner::Group(*id),
        }
    }
}

/// Resolves one kind of namespace path to a target handle, creating it if needed
#[async_trait]
pub trait NamespaceResolver: Send + Sync {
    async fn resolve(&self, full_path: &str) -> Result<NamespaceHandle>;
}

// ============================================================================
// Users
// ============================================================================

pub struct UserResolver {
    target: Arc<dyn TargetApi>,
    default_password: String,
    email_domain: String,
}

impl UserResolver {
    pub fn new(target: Arc<dyn TargetApi>, settings: &TargetSettings) -> Self {
        Self {
            target,
            default_password: settings.default_password.clone(),
            email_domain: settings.placeholder_email_domain.clone(),
        }
    }

    fn new_user(&self, user: &UserRecord) -> NewUser {
        let email = if user.email.trim().is_empty() {
            format!("{}@{}", user.username, self.email_domain)
        } else {
            user.email.clone()
        };
        let name = if user.name.trim().is_empty() {
            user.username.clone()
        } else {
            user.name.clone()
        };
        NewUser {
            username: user.username.clone(),
            name,
            email,
            password: self.default_password.clone(),
            skip_confirmation: true,
        }
    }

    /// Find `user` on the target by username, creating it when absent.
    /// Returns the target user and whether it was created by this call.
    pub async fn resolve_user(&self, user: &UserRecord) -> Result<(ApiUser, bool)> {
        if let Some(existing) = self.target.find_user(&user.username).await? {
            return Ok((existing, false));
        }
        match self.target.create_user(&self.new_user(user)).await {
            Ok(created) => {
                info!(username = %created.username, id = created.id, "Created user");
                Ok((created, true))
            }
            Err(e) if e.is_conflict() => {
                debug!(username = %user.username, "User already exists, looking it up");
                let existing = self
                    .target
                    .find_user(&user.username)
                    .await?
                    .ok_or_else(|| anyhow!("User {} conflicts but cannot be found", user.username))?;
                Ok((existing, false))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to create user {}", user.username)),
        }
    }
}

#[async_trait]
impl NamespaceResolver for UserResolver {
    async fn resolve(&self, full_path: &str) -> Result<NamespaceHandle> {
        let (user, _) = self.resolve_user(&UserRecord::placeholder(full_path)).await?;
        Ok(NamespaceHandle::User {
            id: user.id,
            username: user.username,
        })
    }
}

// ============================================================================
// Groups
// ============================================================================

pub struct GroupResolver {
    target: Arc<dyn TargetApi>,
    /// Exported group metadata by full path
    known: HashMap<String, GroupRecord>,
}

impl GroupResolver {
    pub fn new(target: Arc<dyn TargetApi>, groups: &[GroupRecord]) -> Self {
        Self {
            target,
            known: groups
                .iter()
                .map(|g| (g.full_path.clone(), g.clone()))
                .collect(),
        }
    }

    fn new_group(&self, full_path: &str, parent_id: Option<u64>) -> NewGroup {
        let path = full_path.rsplit('/').next().unwrap_or(full_path).to_string();
        match self.known.get(full_path) {
            Some(group) => NewGroup {
                name: if group.name.is_empty() {
                    path.clone()
                } else {
                    group.name.clone()
                },
                path,
                description: group.description.clone(),
                visibility: group.visibility.clone(),
                parent_id,
            },
            None => NewGroup {
                name: path.clone(),
                path,
                description: String::new(),
                visibility: "private".to_string(),
                parent_id,
            },
        }
    }

    /// Find the group at `full_path`, creating it and any missing ancestors.
    /// Returns the target group and whether it was created by this call.
    pub async fn resolve_group(&self, full_path: &str) -> Result<(ApiGroup, bool)> {
        if let Some(existing) = self.target.find_group(full_path).await? {
            return Ok((existing, false));
        }

        let parent_id = match full_path.rsplit_once('/') {
            Some((parent, _)) => match self.resolve(parent).await? {
                NamespaceHandle::Group { id, .. } => Some(id),
                NamespaceHandle::User { .. } => bail!("Parent of group {} is not a group", full_path),
            },
            None => None,
        };

        match self.target.create_group(&self.new_group(full_path, parent_id)).await {
            Ok(created) => {
                info!(group = %created.full_path, id = created.id, "Created group");
                Ok((created, true))
            }
            Err(e) if e.is_conflict() => {
                debug!(group = full_path, "Group already exists, looking it up");
                let existing = self
                    .target
                    .find_group(full_path)
                    .await?
                    .ok_or_else(|| anyhow!("Group {} conflicts but cannot be found", full_path))?;
                Ok((existing, false))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to create group {}", full_path)),
        }
    }
}

#[async_trait]
impl NamespaceResolver for GroupResolver {
    async fn resolve(&self, full_path: &str) -> Result<NamespaceHandle> {
        let (group, _) = self.resolve_group(full_path).await?;
        Ok(NamespaceHandle::Group {
            id: group.id,
            full_path: group.full_path,
        })
    }
}

// ============================================================================
// Identity map
// ============================================================================

/// Cache of resolved identities for one reconstruction run
pub struct IdentityMap {
    users: UserResolver,
    groups: GroupResolver,
    admin: ApiUser,
    /// Lowercased username -> target user id
    user_ids: HashMap<String, u64>,
    namespaces: HashMap<String, NamespaceHandle>,
}

impl IdentityMap {
    /// Resolve the administrator by username. A missing administrator is a
    /// setup fault.
    pub async fn connect(
        target: Arc<dyn TargetApi>,
        settings: &TargetSettings,
        groups: &[GroupRecord],
    ) -> Result<Self> {
        let admin = target
            .find_user(&settings.admin_username)
            .await
            .with_context(|| format!("Cannot look up administrator on {}", settings.url))?
            .ok_or_else(|| {
                anyhow!(
                    "Administrator {} not found on target {}",
                    settings.admin_username,
                    settings.url
                )
            })?;
        info!(username = %admin.username, id = admin.id, "Resolved target administrator");

        Ok(Self {
            users: UserResolver::new(target.clone(), settings),
            groups: GroupResolver::new(target, groups),
            admin,
            user_ids: HashMap::new(),
            namespaces: HashMap::new(),
        })
    }

    pub fn admin(&self) -> &ApiUser {
        &self.admin
    }

    /// Resolve (or create) a user and remember its id.
    pub async fn resolve_user(&mut self, user: &UserRecord) -> Result<(u64, bool)> {
        if let Some(id) = self.user_id(&user.username) {
            return Ok((id, false));
        }
        let (resolved, created) = self.users.resolve_user(user).await?;
        self.user_ids
            .insert(user.username.to_lowercase(), resolved.id);
        Ok((resolved.id, created))
    }

    /// Resolve (or create) a group and its ancestors.
    pub async fn resolve_group(&mut self, full_path: &str) -> Result<(u64, bool)> {
        if let Some(NamespaceHandle::Group { id, .. }) = self.namespaces.get(full_path) {
            return Ok((*id, false));
        }
        let (group, created) = self.groups.resolve_group(full_path).await?;
        self.namespaces.insert(
            full_path.to_string(),
            NamespaceHandle::Group {
                id: group.id,
                full_path: group.full_path,
            },
        );
        Ok((group.id, created))
    }

    /// Target id of a resolved username (case-insensitive)
    pub fn user_id(&self, username: &str) -> Option<u64> {
        if username.eq_ignore_ascii_case(&self.admin.username) {
            return Some(self.admin.id);
        }
        self.user_ids.get(&username.to_lowercase()).copied()
    }

    /// Impersonation context for `username`, or the administrator when the
    /// username was never resolved.
    pub fn actor_for(&self, username: &str) -> Actor {
        if username.eq_ignore_ascii_case(&self.admin.username) {
            return Actor::Admin;
        }
        match self.user_ids.get(&username.to_lowercase()) {
            Some(id) => Actor::user(*id, username),
            None => {
                warn!(username, "Unknown author, writing as administrator");
                Actor::Admin
            }
        }
    }

    /// Resolve a project's namespace, dispatching on its kind.
    pub async fn resolve_namespace(&mut self, namespace: &NamespaceRef) -> Result<NamespaceHandle> {
        if let Some(handle) = self.namespaces.get(&namespace.full_path) {
            return Ok(handle.clone());
        }
        if namespace.kind == NamespaceKind::User {
            if let Some(id) = self.user_id(&namespace.full_path) {
                let handle = NamespaceHandle::User {
                    id,
                    username: namespace.full_path.clone(),
                };
                self.namespaces
                    .insert(namespace.full_path.clone(), handle.clone());
                return Ok(handle);
            }
        }

        let resolver: &dyn NamespaceResolver = match namespace.kind {
            NamespaceKind::User => &self.users,
            NamespaceKind::Group => &self.groups,
        };
        let handle = resolver.resolve(&namespace.full_path).await?;
        if let NamespaceHandle::User { id, username } = &handle {
            self.user_ids.insert(username.to_lowercase(), *id);
        }
        self.namespaces
            .insert(namespace.full_path.clone(), handle.clone());
        Ok(handle)
    }

    /// Resolved non-administrative users as `(id, username)`, sorted by username
    pub fn non_admin_users(&self) -> Vec<(u64, String)> {
        let mut users: Vec<_> = self
            .user_ids
            .iter()
            .filter(|(_, id)| **id != self.admin.id)
            .map(|(name, id)| (*id, name.clone()))
            .collect();
        users.sort_by(|a, b| a.1.cmp(&b.1));
        users
    }
}
