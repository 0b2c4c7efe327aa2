//! Typed failures of the GitLab REST API

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GitlabError>;

#[derive(Debug, Error)]
pub enum GitlabError {
    /// Uniqueness conflict: the entity already exists on the instance
    #[error("{what} already exists: {body}")]
    Conflict { what: String, body: String },

    #[error("{what} not found")]
    NotFound { what: String },

    /// Permanent rejection (4xx other than conflict/not found)
    #[error("{what} failed with HTTP {status}: {body}")]
    Status {
        what: String,
        status: u16,
        body: String,
    },

    /// Server-side or rate-limit failure worth retrying
    #[error("{what} failed with HTTP {status} (transient): {body}")]
    Transient {
        what: String,
        status: u16,
        body: String,
    },

    #[error("Request to {what} failed: {source}")]
    Transport {
        what: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response of {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Body fragments GitLab uses for uniqueness violations on 400 responses
const CONFLICT_MARKERS: &[&str] = &[
    "has already been taken",
    "already exists",
    "already being used",
];

impl GitlabError {
    /// Classify a non-success response.
    pub fn from_status(what: impl Into<String>, status: u16, body: String) -> Self {
        let what = what.into();
        match status {
            409 => GitlabError::Conflict { what, body },
            400 if CONFLICT_MARKERS.iter().any(|m| body.contains(m)) => {
                GitlabError::Conflict { what, body }
            }
            404 => GitlabError::NotFound { what },
            429 | 500..=599 => GitlabError::Transient { what, status, body },
            _ => GitlabError::Status { what, status, body },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, GitlabError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GitlabError::NotFound { .. })
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GitlabError::Transient { .. } => true,
            GitlabError::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            _ => false,
        }
    }
}
