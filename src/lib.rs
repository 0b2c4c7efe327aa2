//! GitLab Migrator
//!
//! One-shot migration of a GitLab workspace between two instances:
//! - Extraction of users, groups, projects and their collections into an
//!   append-as-you-go JSON journal
//! - Separate membership pass (inherited roles included)
//! - Reconstruction on the target with author impersonation, git mirroring
//!   and checkpoint resume

pub mod extract;
pub mod git;
pub mod gitlab;
pub mod model;
pub mod reconstruct;
pub mod resolve;
pub mod retry;
pub mod store;

use anyhow::{bail, Result};
use retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub source: SourceYamlConfig,
    pub target: TargetYamlConfig,
    pub git: GitYamlConfig,
    pub retry: RetryYamlConfig,
}

/// Source instance section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceYamlConfig {
    pub url: String,
    pub token: String,
    /// Built-in administrator excluded from the user export
    pub admin_username: String,
}

impl Default for SourceYamlConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8023".into(),
            token: String::new(),
            admin_username: "root".into(),
        }
    }
}

/// Target instance section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetYamlConfig {
    pub url: String,
    pub token: String,
    /// Administrator used for privileged writes and as the fallback author
    pub admin_username: String,
    /// Password given to every user created on the target
    pub default_password: String,
    /// Domain of `<username>@<domain>` for users exported without an email
    pub placeholder_email_domain: String,
}

impl Default for TargetYamlConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8012".into(),
            token: String::new(),
            admin_username: "root".into(),
            default_password: "a_very_secure_password_123!".into(),
            placeholder_email_domain: "example.com".into(),
        }
    }
}

/// Git transfer section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitYamlConfig {
    pub scratch_dir: String,
    /// Host (`name[:port]`) replacing the one in exported clone URLs
    pub source_host: Option<String>,
    /// Token replacing the one embedded at export time
    pub source_token: Option<String>,
    /// Host replacing the one in target push URLs
    pub target_host: Option<String>,
    pub keep_scratch: bool,
}

impl Default for GitYamlConfig {
    fn default() -> Self {
        Self {
            scratch_dir: "./temp_repo_clones".into(),
            source_host: None,
            source_token: None,
            target_host: None,
            keep_scratch: false,
        }
    }
}

/// Retry section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryYamlConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryYamlConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: retry::DEFAULT_BASE_DELAY.as_millis() as u64,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Credentials and identity for the source instance
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub token: String,
    pub admin_username: String,
}

/// Credentials and identity for the target instance
#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub url: String,
    pub token: String,
    pub admin_username: String,
    pub default_password: String,
    pub placeholder_email_domain: String,
}

#[derive(Debug, Clone)]
pub struct GitSettings {
    pub scratch_dir: PathBuf,
    pub source_host: Option<String>,
    pub source_token: Option<String>,
    pub target_host: Option<String>,
    pub keep_scratch: bool,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: String,
    pub source_token: String,
    pub source_admin_username: String,
    pub target_url: String,
    pub target_token: String,
    pub target_admin_username: String,
    pub default_password: String,
    pub placeholder_email_domain: String,
    pub git: GitSettings,
    pub retry: RetryPolicy,
}

fn env_or(name: &str, fallback: String) -> String {
    std::env::var(name).unwrap_or(fallback)
}

fn env_opt(name: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(name)
        .ok()
        .or(fallback)
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "migrate.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let max_attempts = std::env::var("MIGRATE_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(yaml.retry.max_attempts);
        let base_delay_ms = std::env::var("MIGRATE_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(yaml.retry.base_delay_ms);

        Ok(Self {
            source_url: env_or("GITLAB_SOURCE_URL", yaml.source.url),
            source_token: env_or("GITLAB_SOURCE_TOKEN", yaml.source.token),
            source_admin_username: yaml.source.admin_username,
            target_url: env_or("GITLAB_TARGET_URL", yaml.target.url),
            target_token: env_or("GITLAB_TARGET_TOKEN", yaml.target.token),
            target_admin_username: yaml.target.admin_username,
            default_password: env_or("GITLAB_DEFAULT_PASSWORD", yaml.target.default_password),
            placeholder_email_domain: yaml.target.placeholder_email_domain,
            git: GitSettings {
                scratch_dir: PathBuf::from(yaml.git.scratch_dir),
                source_host: env_opt("GIT_SOURCE_HOST", yaml.git.source_host),
                source_token: env_opt("GIT_SOURCE_TOKEN", yaml.git.source_token),
                target_host: env_opt("GIT_TARGET_HOST", yaml.git.target_host),
                keep_scratch: yaml.git.keep_scratch,
            },
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(base_delay_ms)),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("migrate.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    /// Source side of the configuration; fails when URL or token is missing.
    pub fn source_settings(&self) -> Result<SourceSettings> {
        if self.source_url.trim().is_empty() {
            bail!("Source URL is not set (GITLAB_SOURCE_URL or source.url)");
        }
        if self.source_token.trim().is_empty() {
            bail!("Source token is not set (GITLAB_SOURCE_TOKEN or source.token)");
        }
        Ok(SourceSettings {
            url: self.source_url.clone(),
            token: self.source_token.clone(),
            admin_username: self.source_admin_username.clone(),
        })
    }

    /// Target side of the configuration; fails when URL or token is missing.
    pub fn target_settings(&self) -> Result<TargetSettings> {
        if self.target_url.trim().is_empty() {
            bail!("Target URL is not set (GITLAB_TARGET_URL or target.url)");
        }
        if self.target_token.trim().is_empty() {
            bail!("Target token is not set (GITLAB_TARGET_TOKEN or target.token)");
        }
        Ok(TargetSettings {
            url: self.target_url.clone(),
            token: self.target_token.clone(),
            admin_username: self.target_admin_username.clone(),
            default_password: self.default_password.clone(),
            placeholder_email_domain: self.placeholder_email_domain.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
