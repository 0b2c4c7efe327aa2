//! On-disk journal of the extracted workspace
//!
//! The journal is a single JSON document rewritten in full after every
//! project. Each rewrite goes to a sibling temp file that is renamed over
//! the target, so a reader always sees either the previous or the new
//! document and never a torn write.

use crate::model::{
    ExportDocument, ExportInfo, GroupRecord, MemberRecord, MembershipSnapshot, ProjectRecord,
    UserRecord,
};
use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

// ============================================================================
// Atomic JSON file helpers
// ============================================================================

fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid journal path {}", target.display()))?;
    let parent = target.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!(".{}.tmp", file_name)))
}

/// Serialize `value` and atomically replace `target` with it.
pub fn write_json_atomic<T: Serialize>(target: &Path, value: &T) -> Result<()> {
    let temp_path = temp_path_for(target)?;
    let bytes = serde_json::to_vec_pretty(value).context("Failed to serialize journal")?;

    {
        let mut file = std::fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.sync_all()?;
    }

    if let Err(e) = std::fs::rename(&temp_path, target) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to replace {}", target.display()));
    }
    Ok(())
}

/// Outcome of reading a JSON document that may not exist yet
enum Loaded<T> {
    Ok(T),
    Missing,
    Corrupt(String),
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    match serde_json::from_slice(&contents) {
        Ok(doc) => Ok(Loaded::Ok(doc)),
        Err(e) => Ok(Loaded::Corrupt(e.to_string())),
    }
}

/// Move an unparseable file aside so reinitialisation does not destroy it.
fn quarantine(path: &Path, reason: &str) {
    let backup = path.with_extension("corrupt");
    tracing::warn!(
        path = %path.display(),
        backup = %backup.display(),
        "Journal is not valid JSON ({}), starting a fresh document",
        reason
    );
    if let Err(e) = std::fs::rename(path, &backup) {
        tracing::warn!("Failed to move corrupt journal aside: {}", e);
    }
}

// ============================================================================
// Export journal
// ============================================================================

/// Append-as-you-go store for the export document
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    export_info: ExportInfo,
}

impl Journal {
    /// Create (or truncate) a journal holding only its header.
    pub fn create(path: impl Into<PathBuf>, export_info: ExportInfo) -> Result<Self> {
        let journal = Self {
            path: path.into(),
            export_info,
        };
        write_json_atomic(
            &journal.path,
            &ExportDocument::empty(journal.export_info.clone()),
        )?;
        tracing::info!("Initialized journal {}", journal.path.display());
        Ok(journal)
    }

    /// Attach to an existing journal path without touching the file.
    pub fn open(path: impl Into<PathBuf>, export_info: ExportInfo) -> Self {
        Self {
            path: path.into(),
            export_info,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current document, or a fresh one if absent or corrupt
    fn load_or_init(&self) -> Result<ExportDocument> {
        match load_json::<ExportDocument>(&self.path)? {
            Loaded::Ok(doc) => Ok(doc),
            Loaded::Missing => Ok(ExportDocument::empty(self.export_info.clone())),
            Loaded::Corrupt(reason) => {
                quarantine(&self.path, &reason);
                Ok(ExportDocument::empty(self.export_info.clone()))
            }
        }
    }

    /// Append one fully-resolved project and rewrite the journal.
    pub fn append(&self, project: &ProjectRecord) -> Result<()> {
        let mut doc = self.load_or_init()?;
        doc.projects.push(project.clone());
        write_json_atomic(&self.path, &doc)
    }

    pub fn set_users(&self, users: &[UserRecord]) -> Result<()> {
        let mut doc = self.load_or_init()?;
        doc.users = users.to_vec();
        write_json_atomic(&self.path, &doc)
    }

    pub fn set_groups(&self, groups: &[GroupRecord]) -> Result<()> {
        let mut doc = self.load_or_init()?;
        doc.groups = groups.to_vec();
        write_json_atomic(&self.path, &doc)
    }

    /// Read a complete journal for reconstruction. A missing or unparseable
    /// file is a setup fault.
    pub fn read(path: &Path) -> Result<ExportDocument> {
        match load_json::<ExportDocument>(path)? {
            Loaded::Ok(doc) => Ok(doc),
            Loaded::Missing => Err(anyhow!("Journal {} not found", path.display())),
            Loaded::Corrupt(reason) => Err(anyhow!(
                "Journal {} is not valid: {}",
                path.display(),
                reason
            )),
        }
    }
}

// ============================================================================
// Journal statistics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalStats {
    pub users: usize,
    pub groups: usize,
    pub projects: usize,
    pub labels: usize,
    pub milestones: usize,
    pub forks: usize,
    pub pipelines: usize,
    pub wiki_pages: usize,
    pub issues: usize,
    pub merge_requests: usize,
    pub comments: usize,
    pub projects_with_failures: usize,
}

impl JournalStats {
    pub fn from_document(doc: &ExportDocument) -> Self {
        let mut stats = Self {
            users: doc.users.len(),
            groups: doc.groups.len(),
            projects: doc.projects.len(),
            ..Default::default()
        };
        for p in &doc.projects {
            stats.labels += p.labels.len();
            stats.milestones += p.milestones.len();
            stats.forks += p.forks.len();
            stats.pipelines += p.pipelines.len();
            stats.wiki_pages += p.wiki_pages.len();
            stats.issues += p.issues.len();
            stats.merge_requests += p.merge_requests.len();
            stats.comments += p.issues.iter().map(|i| i.comments.len()).sum::<usize>();
            stats.comments += p
                .merge_requests
                .iter()
                .map(|m| m.comments.len())
                .sum::<usize>();
            if !p.failed_collections.is_empty() {
                stats.projects_with_failures += 1;
            }
        }
        stats
    }

    pub fn log(&self) {
        tracing::info!(
            users = self.users,
            groups = self.groups,
            projects = self.projects,
            labels = self.labels,
            milestones = self.milestones,
            forks = self.forks,
            pipelines = self.pipelines,
            wiki_pages = self.wiki_pages,
            issues = self.issues,
            merge_requests = self.merge_requests,
            comments = self.comments,
            "Journal totals"
        );
        if self.projects_with_failures > 0 {
            tracing::warn!(
                "{} project(s) have sub-collections that failed to export",
                self.projects_with_failures
            );
        }
    }
}

// ============================================================================
// Membership snapshot
// ============================================================================

/// Separate store for the membership pass, keyed by source project id
#[derive(Debug)]
pub struct MembershipStore {
    path: PathBuf,
    snapshot: MembershipSnapshot,
}

impl MembershipStore {
    pub fn create(path: impl Into<PathBuf>, export_info: ExportInfo) -> Result<Self> {
        let store = Self {
            path: path.into(),
            snapshot: MembershipSnapshot::empty(export_info),
        };
        write_json_atomic(&store.path, &store.snapshot)?;
        Ok(store)
    }

    /// Record a project's members (`None` = extraction failed) and persist.
    pub fn record(&mut self, project_id: u64, members: Option<Vec<MemberRecord>>) -> Result<()> {
        self.snapshot
            .project_members
            .insert(project_id.to_string(), members);
        write_json_atomic(&self.path, &self.snapshot)
    }

    pub fn snapshot(&self) -> &MembershipSnapshot {
        &self.snapshot
    }

    pub fn read(path: &Path) -> Result<MembershipSnapshot> {
        match load_json::<MembershipSnapshot>(path)? {
            Loaded::Ok(snapshot) => Ok(snapshot),
            Loaded::Missing => Err(anyhow!("Membership snapshot {} not found", path.display())),
            Loaded::Corrupt(reason) => Err(anyhow!(
                "Membership snapshot {} is not valid: {}",
                path.display(),
                reason
            )),
        }
    }
}
