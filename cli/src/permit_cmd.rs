//! `permit-log` subcommands.
//!
//! Each command resolves configuration, opens a [`SyncCoordinator`] for the
//! active project and performs one operation against it.
//!
//! ## Commands
//!
//! - `permit-log list [--json]` (rows plus per-type counts)
//! - `permit-log create --type <ID> --location <L> --contractor <C> --supervisor <S> [...]`
//! - `permit-log export [--out <DIR>]`
//! - `permit-log projects`
//! - `permit-log types`
//! - `permit-log status`
//!
//! Global flags: `--config <FILE>`, `--project <KEY>`, `--offline`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use permit_log_core::config::{ConfigLoader, PermitLogConfig};
use permit_log_core::export::write_export;
use permit_log_core::permit::{PermitDraft, PermitStatus, PermitType, counts_by_type};
use permit_log_core::sync::{LoadOutcome, LoadSource, RemoteOutcome, SyncCoordinator};

/// Record and review construction work permits.
#[derive(Debug, Parser)]
#[command(name = "permit-log", version)]
pub struct PermitLogCli {
    /// Read this config file instead of `$PERMIT_LOG_HOME/config.toml`.
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Project to work on (defaults to the configured default project).
    #[arg(long = "project", short = 'p', global = true)]
    pub project: Option<String>,

    /// Never contact the remote sheet.
    #[arg(long = "offline", global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: PermitSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum PermitSubcommand {
    /// Show the permit log for the active project.
    List(ListArgs),
    /// Log a new permit.
    Create(CreateArgs),
    /// Write the permit log as CSV.
    Export(ExportArgs),
    /// List configured projects.
    Projects,
    /// List the permit-type catalog.
    Types,
    /// Show configuration and storage status.
    Status,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CreateArgs {
    /// Permit type id (confined-space, excavation, work-height, lifting).
    #[arg(long = "type", short = 't')]
    pub permit_type: Option<PermitType>,

    /// Permit date, YYYY-MM-DD (defaults to today).
    #[arg(long = "date")]
    pub date: Option<String>,

    /// Start time, HH:MM (defaults to now).
    #[arg(long = "time")]
    pub time: Option<String>,

    #[arg(long = "location", short = 'l')]
    pub location: Option<String>,

    #[arg(long = "contractor")]
    pub contractor: Option<String>,

    #[arg(long = "supervisor")]
    pub supervisor: Option<String>,

    #[arg(long = "work-description")]
    pub work_description: Option<String>,

    #[arg(long = "hazards")]
    pub hazards: Option<String>,

    #[arg(long = "control-measures")]
    pub control_measures: Option<String>,

    #[arg(long = "permit-issuer")]
    pub permit_issuer: Option<String>,

    #[arg(long = "valid-from")]
    pub valid_from: Option<String>,

    #[arg(long = "valid-to")]
    pub valid_to: Option<String>,

    /// Active, Closed or Suspended.
    #[arg(long = "status", default_value = "Active")]
    pub status: PermitStatus,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

impl CreateArgs {
    /// Form input with today's date and the current time pre-filled.
    pub fn to_draft(&self) -> PermitDraft {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let defaults = PermitDraft::for_now();
        PermitDraft {
            permit_type: self.permit_type,
            date: self.date.clone().unwrap_or(defaults.date),
            time: self.time.clone().unwrap_or(defaults.time),
            location: text(&self.location),
            contractor: text(&self.contractor),
            supervisor: text(&self.supervisor),
            work_description: text(&self.work_description),
            hazards: text(&self.hazards),
            control_measures: text(&self.control_measures),
            permit_issuer: text(&self.permit_issuer),
            valid_from: text(&self.valid_from),
            valid_to: text(&self.valid_to),
            status: self.status,
        }
    }
}

#[derive(Debug, Parser)]
pub struct ExportArgs {
    /// Directory for the CSV file (defaults to the configured export dir).
    #[arg(long = "out", short = 'o')]
    pub out: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

impl PermitLogCli {
    pub async fn run(&self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        match &self.command {
            PermitSubcommand::List(args) => cmd_list(&config, args).await,
            PermitSubcommand::Create(args) => cmd_create(&config, args).await,
            PermitSubcommand::Export(args) => cmd_export(&config, args).await,
            PermitSubcommand::Projects => {
                cmd_projects(&config);
                Ok(())
            }
            PermitSubcommand::Types => {
                cmd_types();
                Ok(())
            }
            PermitSubcommand::Status => cmd_status(&config),
        }
    }

    /// Layered config plus the global flags, which win over everything.
    fn load_config(&self) -> anyhow::Result<PermitLogConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_config_file(path.clone());
        }
        let mut config = loader.load().context("failed to load configuration")?;

        if self.offline {
            config.endpoint = None;
        }
        if let Some(project) = &self.project {
            if !config.is_known_project(project) {
                anyhow::bail!(
                    "unknown project '{project}' (expected one of: {})",
                    config.projects.join(", ")
                );
            }
            config.default_project = project.clone();
        }
        Ok(config)
    }
}

fn open(config: &PermitLogConfig) -> anyhow::Result<SyncCoordinator> {
    SyncCoordinator::from_config(config).context("failed to open permit log")
}

fn warn_on_fallback(outcome: &LoadOutcome) {
    if let LoadSource::LocalFallback(e) = &outcome.source {
        eprintln!("warning: remote sheet unavailable, using local copy ({e})");
    }
}

fn remote_label(outcome: &RemoteOutcome) -> &'static str {
    match outcome {
        RemoteOutcome::NotConfigured => "not-configured",
        RemoteOutcome::Dispatched => "dispatched",
        RemoteOutcome::ConfirmedPersisted => "confirmed",
        RemoteOutcome::Unreachable(_) => "pending",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

async fn cmd_list(config: &PermitLogConfig, args: &ListArgs) -> anyhow::Result<()> {
    let mut coordinator = open(config)?;
    let outcome = coordinator.load().await;
    warn_on_fallback(&outcome);

    if args.json {
        println!("{}", serde_json::to_string_pretty(coordinator.permits())?);
        return Ok(());
    }

    println!(
        "{}: {} permit(s) [{}]",
        coordinator.project(),
        outcome.count,
        coordinator.state().as_str()
    );
    for permit in coordinator.permits() {
        println!(
            "  {} {:<5}  {:<32}  {:<20}  {:<16}  {}",
            permit.date,
            permit.time,
            permit.permit_type_name,
            permit.location,
            permit.contractor,
            permit.status
        );
    }

    println!("By type:");
    for (permit_type, count) in counts_by_type(coordinator.permits()) {
        println!("  {count:>3}  {}", permit_type.title());
    }
    Ok(())
}

async fn cmd_create(config: &PermitLogConfig, args: &CreateArgs) -> anyhow::Result<()> {
    let mut coordinator = open(config)?;
    let loaded = coordinator.load().await;
    warn_on_fallback(&loaded);

    let outcome = coordinator.create(args.to_draft()).await?;

    if args.json {
        let value = serde_json::json!({
            "permit": outcome.permit,
            "remote": remote_label(&outcome.remote),
            "summary": outcome.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("✓ {}", outcome.summary());
        println!("  id: {}", outcome.permit.id);
    }
    if let RemoteOutcome::Unreachable(e) = &outcome.remote {
        eprintln!("warning: remote publish failed: {e}");
    }
    Ok(())
}

async fn cmd_export(config: &PermitLogConfig, args: &ExportArgs) -> anyhow::Result<()> {
    let mut coordinator = open(config)?;
    let loaded = coordinator.load().await;
    warn_on_fallback(&loaded);

    let dir = args.out.clone().unwrap_or_else(|| config.export_dir.clone());
    let today = chrono::Local::now().date_naive();
    let path = write_export(&dir, coordinator.project(), coordinator.permits(), today)
        .with_context(|| format!("failed to write export to {}", dir.display()))?;

    println!(
        "Exported {} permit(s) to {}",
        coordinator.permits().len(),
        path.display()
    );
    Ok(())
}

fn cmd_projects(config: &PermitLogConfig) {
    for project in &config.projects {
        let marker = if *project == config.default_project {
            "*"
        } else {
            " "
        };
        println!("{marker} {project}");
    }
}

fn cmd_types() {
    for permit_type in PermitType::ALL {
        println!("{:<15} {}", permit_type.id(), permit_type.display_name());
    }
}

fn cmd_status(config: &PermitLogConfig) -> anyhow::Result<()> {
    let store = config
        .local_store()
        .context("local storage unavailable")?;
    let stored = store.projects()?;

    println!("Project:        {}", config.default_project);
    match &config.endpoint {
        Some(url) => println!("Remote:         {url}"),
        None => println!("Remote:         not configured (local only)"),
    }
    println!(
        "Confirm writes: {}",
        if config.confirm_writes { "yes" } else { "no" }
    );
    match config.request_timeout {
        Some(timeout) => println!("Timeout:        {} ms", timeout.as_millis()),
        None => println!("Timeout:        none"),
    }
    println!("Data directory: {}", store.base_dir().display());
    if stored.is_empty() {
        println!("Stored:         none");
    } else {
        println!("Stored:         {}", stored.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> PermitLogCli {
        match PermitLogCli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(err) => panic!("Failed to parse {args:?}: {err}"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        PermitLogCli::command().debug_assert();
    }

    #[test]
    fn create_args_become_a_draft() {
        let cli = parse(&[
            "permit-log",
            "--project",
            "TW O-16124",
            "create",
            "--type",
            "excavation",
            "--date",
            "2024-03-01",
            "--time",
            "08:15",
            "--location",
            "Pit A",
            "--contractor",
            "Acme",
            "--supervisor",
            "J. Lee",
            "--status",
            "closed",
        ]);
        assert_eq!(cli.project.as_deref(), Some("TW O-16124"));
        let PermitSubcommand::Create(args) = cli.command else {
            panic!("Expected create subcommand");
        };
        let draft = args.to_draft();
        assert_eq!(draft.permit_type, Some(PermitType::Excavation));
        assert_eq!(draft.date, "2024-03-01");
        assert_eq!(draft.time, "08:15");
        assert_eq!(draft.location, "Pit A");
        assert_eq!(draft.hazards, "");
        assert_eq!(draft.status, PermitStatus::Closed);
        assert_eq!(draft.validate(), Ok(()));
    }

    #[test]
    fn omitted_date_defaults_to_today() {
        let cli = parse(&["permit-log", "create", "--type", "lifting"]);
        let PermitSubcommand::Create(args) = cli.command else {
            panic!("Expected create subcommand");
        };
        let draft = args.to_draft();
        assert_eq!(draft.date.len(), "YYYY-MM-DD".len());
        assert_eq!(draft.time.len(), "HH:MM".len());
        assert!(draft.validate().is_err());
    }

    #[test]
    fn unknown_type_is_a_usage_error() {
        let parsed = PermitLogCli::try_parse_from(["permit-log", "create", "--type", "hot-work"]);
        assert!(parsed.is_err());
    }
}
