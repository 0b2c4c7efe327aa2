//! Repository transfer through the external `git` client
//!
//! A project's content moves as a bare mirror: `git clone --mirror` from the
//! source into a scratch directory, then `git push --mirror` to the target.
//! Credentials travel inside the URLs, so every URL that reaches a log line
//! or an error message goes through [`redact_url`] first.

use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, warn};

/// User name GitLab accepts for token-authenticated HTTP git access
pub const TOKEN_USER: &str = "oauth2";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git {step}: {source}")]
    Spawn {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("git {step} exited with {code:?}: {stderr}")]
    Failed {
        step: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// URL helpers
// ============================================================================

/// Put `user:token` into the authority of an HTTP(S) URL.
pub fn embed_credentials(url: &str, user: &str, token: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_username(user).ok()?;
    parsed.set_password(Some(token)).ok()?;
    Some(parsed.to_string())
}

/// Replace host (and port, when `host` is `name:port`) keeping everything else.
pub fn rewrite_host(url: &str, host: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) => (name, Some(port.parse::<u16>().ok()?)),
        None => (host, None),
    };
    parsed.set_host(Some(name)).ok()?;
    parsed.set_port(port).ok()?;
    Some(parsed.to_string())
}

/// Mask embedded credentials for logging.
pub fn redact_url(url: &str) -> String {
    if let Ok(mut parsed) = Url::parse(url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        } else if !parsed.username().is_empty() {
            let _ = parsed.set_username("***");
        }
        return parsed.to_string();
    }
    // Not a URL; still strip anything that looks like `scheme://creds@`
    match (url.find("://"), url.find('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// Redact every URL-looking token of a free-form message (git's stderr).
pub fn redact_text(text: &str) -> String {
    text.split_inclusive(char::is_whitespace)
        .map(|word| {
            if word.contains("://") && word.contains('@') {
                let trimmed = word.trim_end();
                let trailing = &word[trimmed.len()..];
                format!(
                    "{}{}",
                    redact_url(trimmed.trim_matches(|c| c == '\'' || c == '"')),
                    trailing
                )
            } else {
                word.to_string()
            }
        })
        .collect()
}

// ============================================================================
// Transport
// ============================================================================

/// The two git operations a migration needs
#[async_trait]
pub trait GitTransport: Send + Sync {
    /// Bare mirror clone of `source_url` into `dest`
    async fn mirror_clone(&self, source_url: &str, dest: &Path) -> Result<(), GitError>;

    /// Push every ref of the bare repository at `repo` to `target_url`
    async fn mirror_push(&self, repo: &Path, target_url: &str) -> Result<(), GitError>;
}

/// `GitTransport` backed by the `git` executable
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    async fn run(&self, step: &'static str, args: &[&str], cwd: Option<&Path>) -> Result<(), GitError> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command
            .output()
            .await
            .map_err(|source| GitError::Spawn { step, source })?;

        if !output.status.success() {
            let stderr = redact_text(String::from_utf8_lossy(&output.stderr).trim());
            warn!(
                step,
                exit_code = ?output.status.code(),
                "git exited with non-zero status"
            );
            return Err(GitError::Failed {
                step,
                code: output.status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitTransport for GitCli {
    async fn mirror_clone(&self, source_url: &str, dest: &Path) -> Result<(), GitError> {
        debug!(url = %redact_url(source_url), dest = %dest.display(), "git clone --mirror");
        let dest = dest.to_string_lossy();
        self.run("clone", &["clone", "--mirror", source_url, dest.as_ref()], None)
            .await
    }

    async fn mirror_push(&self, repo: &Path, target_url: &str) -> Result<(), GitError> {
        debug!(url = %redact_url(target_url), repo = %repo.display(), "git push --mirror");
        self.run("push", &["push", "--mirror", target_url], Some(repo))
            .await
    }
}

// ============================================================================
// Scratch space
// ============================================================================

/// Empty (or create) the scratch directory.
pub fn prepare_scratch(dir: &Path) -> Result<(), GitError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|source| GitError::Scratch {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    std::fs::create_dir_all(dir).map_err(|source| GitError::Scratch {
        path: dir.to_path_buf(),
        source,
    })
}

pub fn remove_scratch(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!(path = %dir.display(), "Failed to remove scratch directory: {}", e);
        }
    }
}

/// Clone `source_url` and push it to `target_url` through `workdir/<name>.git`.
///
/// The intermediate bare repository is removed afterwards either way.
pub async fn mirror_repository(
    git: &dyn GitTransport,
    workdir: &Path,
    name: &str,
    source_url: &str,
    target_url: &str,
) -> Result<(), GitError> {
    let repo = workdir.join(format!("{}.git", name.replace('/', "__")));
    if repo.exists() {
        std::fs::remove_dir_all(&repo).map_err(|source| GitError::Scratch {
            path: repo.clone(),
            source,
        })?;
    }

    let result = async {
        git.mirror_clone(source_url, &repo).await?;
        git.mirror_push(&repo, target_url).await
    }
    .await;

    remove_scratch(&repo);
    result
}
