//! GitLab Migrator - command line entry point
//!
//! Export a source instance to a journal, then replay it onto a target.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gitlab_migrator::extract::{Extractor, MembershipExtractor};
use gitlab_migrator::git::GitCli;
use gitlab_migrator::gitlab::GitlabClient;
use gitlab_migrator::reconstruct::{ImportOptions, Reconstructor};
use gitlab_migrator::retry::RetryPolicy;
use gitlab_migrator::store::{Journal, JournalStats, MembershipStore};
use gitlab_migrator::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gitlab-migrator")]
#[command(about = "Migrate a GitLab workspace between instances")]
struct Cli {
    /// Path to the YAML config file (default: ./migrate.yaml)
    #[arg(long, global = true, env = "MIGRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the source instance to a journal
    Export {
        /// Journal file (default: gitlab_data_<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export effective project memberships, including inherited roles
    ExportMembers {
        /// Snapshot file (default: gitlab_member_roles_<timestamp>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay a journal onto the target instance
    Import {
        /// Journal produced by `export`
        #[arg(short, long)]
        input: PathBuf,

        /// Membership snapshot produced by `export-members`
        #[arg(short, long)]
        members: Option<PathBuf>,

        /// Skip every project up to and including this one (path or namespace/path)
        #[arg(long, env = "MIGRATE_CHECKPOINT")]
        checkpoint: Option<String>,

        /// Seed for choosing which users re-create stars
        #[arg(long)]
        star_seed: Option<u64>,
    },

    /// Print totals of a journal
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,gitlab_migrator=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    let config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Export { output } => {
            let output = output.unwrap_or_else(|| timestamped("gitlab_data"));
            run_export(&config, &output).await
        }
        Commands::ExportMembers { output } => {
            let output = output.unwrap_or_else(|| timestamped("gitlab_member_roles"));
            run_export_members(&config, &output).await
        }
        Commands::Import {
            input,
            members,
            checkpoint,
            star_seed,
        } => {
            let options = ImportOptions {
                checkpoint,
                star_seed,
            };
            run_import(&config, &input, members.as_deref(), &options).await
        }
        Commands::Inspect { input } => run_inspect(&input),
    }
}

fn timestamped(prefix: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}_{}.json",
        prefix,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Source client; the extractor retries every failed call itself.
fn source_client(config: &Config) -> Result<(Arc<GitlabClient>, gitlab_migrator::SourceSettings)> {
    let settings = config.source_settings()?;
    let client = GitlabClient::new(&settings.url, &settings.token)?.with_retry(RetryPolicy::none());
    Ok((Arc::new(client), settings))
}

async fn run_export(config: &Config, output: &Path) -> Result<()> {
    let (client, settings) = source_client(config)?;
    tracing::info!("Exporting {} to {}", settings.url, output.display());

    let report = Extractor::new(client, settings, config.retry)
        .run(output)
        .await?;

    tracing::info!(
        "Export complete: {} users, {} groups, {} projects ({} failed)",
        report.users,
        report.groups,
        report.projects,
        report.failed_projects
    );
    Ok(())
}

async fn run_export_members(config: &Config, output: &Path) -> Result<()> {
    let (client, settings) = source_client(config)?;
    tracing::info!("Exporting memberships of {} to {}", settings.url, output.display());

    let report = MembershipExtractor::new(client, settings.url, config.retry)
        .run(output)
        .await?;

    tracing::info!(
        "Membership export complete: {} projects, {} failed",
        report.projects,
        report.failed
    );
    Ok(())
}

async fn run_import(
    config: &Config,
    input: &Path,
    members: Option<&Path>,
    options: &ImportOptions,
) -> Result<()> {
    let settings = config.target_settings()?;
    let doc = Journal::read(input)?;
    let snapshot = members.map(MembershipStore::read).transpose()?;

    let client = GitlabClient::new(&settings.url, &settings.token)?.with_retry(config.retry);
    let client = Arc::new(client);
    client
        .current_user()
        .await
        .with_context(|| format!("Cannot authenticate to target {}", settings.url))?;

    let reconstructor = Reconstructor::new(
        client,
        Arc::new(GitCli::new()),
        settings,
        config.git.clone(),
    );
    let report = reconstructor.run(&doc, snapshot.as_ref(), options).await?;

    tracing::info!(
        "Import complete: {} projects created, {} existing, {} failed",
        report.projects.created,
        report.projects.existing,
        report.projects.failed
    );
    Ok(())
}

fn run_inspect(input: &Path) -> Result<()> {
    let doc = Journal::read(input)?;
    let stats = JournalStats::from_document(&doc);

    println!("Journal:        {}", input.display());
    println!("Source:         {}", doc.export_info.source_url);
    println!("Exported at:    {}", doc.export_info.export_time);
    if let Some(version) = &doc.export_info.gitlab_version {
        println!("GitLab version: {}", version);
    }
    println!("Users:          {}", stats.users);
    println!("Groups:         {}", stats.groups);
    println!("Projects:       {}", stats.projects);
    println!("  labels:         {}", stats.labels);
    println!("  milestones:     {}", stats.milestones);
    println!("  forks:          {}", stats.forks);
    println!("  pipelines:      {}", stats.pipelines);
    println!("  wiki pages:     {}", stats.wiki_pages);
    println!("  issues:         {}", stats.issues);
    println!("  merge requests: {}", stats.merge_requests);
    println!("  comments:       {}", stats.comments);
    if stats.projects_with_failures > 0 {
        println!(
            "Incomplete:     {} project(s) with failed collections",
            stats.projects_with_failures
        );
    }
    Ok(())
}
