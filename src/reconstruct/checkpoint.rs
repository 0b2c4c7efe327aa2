//! Resume gate for a partially completed import
//!
//! With a marker set, every project up to and including the one matching the
//! marker is skipped; everything after it is processed.

use crate::model::ProjectRecord;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CheckpointGate {
    marker: Option<String>,
    reached: bool,
}

impl CheckpointGate {
    /// An empty or blank marker means "process everything".
    pub fn new(marker: Option<&str>) -> Self {
        let marker = marker
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| m.trim_matches('/').to_string());
        Self {
            marker,
            reached: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.marker.is_some()
    }

    /// Pin a bare-path marker to the full path of the first project carrying
    /// that path, warning when several namespaces share it.
    pub fn prepare(&mut self, projects: &[ProjectRecord]) {
        let Some(marker) = self.marker.as_deref() else {
            return;
        };
        if marker.contains('/') {
            return;
        }
        let candidates: Vec<String> = projects
            .iter()
            .filter(|p| p.path == marker)
            .map(ProjectRecord::full_path)
            .collect();
        if candidates.len() > 1 {
            warn!(
                checkpoint = %marker,
                candidates = ?candidates,
                "Checkpoint matches several projects, resuming after the first; pass namespace/path to disambiguate"
            );
        }
        if let Some(first) = candidates.into_iter().next() {
            self.marker = Some(first);
        }
    }

    /// A marker with a namespace matches the full path only.
    fn matches(marker: &str, project: &ProjectRecord) -> bool {
        if marker.contains('/') {
            marker == project.full_path()
        } else {
            marker == project.path
        }
    }

    /// Whether `project` should be processed.
    pub fn admit(&mut self, project: &ProjectRecord) -> bool {
        let Some(marker) = self.marker.as_deref() else {
            return true;
        };
        if self.reached {
            return true;
        }
        if Self::matches(marker, project) {
            self.reached = true;
            info!(
                project = %project.full_path(),
                "Checkpoint reached, resuming with the next project"
            );
        } else {
            info!(project = %project.full_path(), "Skipping project before checkpoint");
        }
        false
    }

    /// Warn when the marker never matched any project.
    pub fn finish(&self) {
        if let (Some(marker), false) = (&self.marker, self.reached) {
            warn!(checkpoint = %marker, "Checkpoint never matched a project, nothing was imported");
        }
    }
}
