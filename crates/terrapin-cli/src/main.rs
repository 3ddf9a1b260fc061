//! # terrapin-cli
//!
//! Binary entry point for Terrapin.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Logging initialisation
//! - Settings file and profile resolution
//! - `terrapin plan`, `terrapin apply`, and `terrapin destroy` driving a run
//!   through its lifecycle
//! - `terrapin cancel` for queued or running runs

mod completions;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terrapin_adapters::HttpBackend;
use terrapin_core::{
    ApplyOptions, ExitStatus, Lifecycle, ProfileEnv, RunRequest, StdConsole, TerrapinConfig,
    VariableSources, WaitBudget, keychain_token,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exit code used when a second interrupt forces the process down.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Terrapin - drive Terraform runs on a remote automation backend
#[derive(Parser, Debug)]
#[command(name = "terrapin", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ~/.terrapin/settings.yml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Settings profile to use
    #[arg(long, value_name = "NAME", global = true)]
    profile: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a speculative run and show its plan
    Plan(PlanArgs),

    /// Plan a run and apply it once approved
    Apply(ApplyArgs),

    /// Plan a destroy run and apply it once approved
    Destroy(ApplyArgs),

    /// Cancel a queued or running run
    Cancel(CancelArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Options shared by every command that creates a run.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
struct RunFlags {
    /// Terraform configuration directory (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    directory_path: Option<PathBuf>,

    /// Remote module source to run instead of a local directory
    #[arg(long, value_name = "SOURCE")]
    module_source: Option<String>,

    /// Version of the remote module
    #[arg(long, value_name = "VERSION")]
    module_version: Option<String>,

    /// Terraform variable sent as a string; may be repeated
    #[arg(long = "tf-var", value_name = "KEY=VALUE")]
    tf_vars: Vec<String>,

    /// Terraform variable whose value is an HCL expression (list, map, number); may be repeated
    #[arg(long = "tf-hcl-var", value_name = "KEY=EXPR")]
    tf_hcl_vars: Vec<String>,

    /// Terraform variables file (.tfvars or .tfvars.json); may be repeated
    #[arg(long = "tf-var-file", value_name = "FILE")]
    tf_var_files: Vec<PathBuf>,

    /// Environment variable; may be repeated
    #[arg(long = "env-var", value_name = "KEY=VALUE")]
    env_vars: Vec<String>,

    /// Environment variables file with KEY=VALUE lines; may be repeated
    #[arg(long = "env-var-file", value_name = "FILE")]
    env_var_files: Vec<PathBuf>,

    /// Terraform CLI version to run with
    #[arg(long, value_name = "VERSION")]
    terraform_version: Option<String>,

    /// Limit the run to a resource address; may be repeated
    #[arg(long = "target", value_name = "ADDRESS")]
    targets: Vec<String>,

    /// Refresh state before planning
    #[arg(
        long,
        value_name = "BOOL",
        default_value_t = true,
        action = ArgAction::Set,
        require_equals = true
    )]
    refresh: bool,

    /// Only refresh state, proposing no other changes
    #[arg(long)]
    refresh_only: bool,
}

impl RunFlags {
    fn into_request(self, workspace_path: String) -> RunRequest {
        let directory = match (self.directory_path, &self.module_source) {
            (Some(dir), _) => Some(dir),
            (None, None) => Some(PathBuf::from(".")),
            (None, Some(_)) => None,
        };
        RunRequest {
            workspace_path,
            directory,
            module_source: self.module_source,
            module_version: self.module_version,
            variables: VariableSources {
                tf_vars: self.tf_vars,
                tf_hcl_vars: self.tf_hcl_vars,
                tf_var_files: self.tf_var_files,
                env_vars: self.env_vars,
                env_var_files: self.env_var_files,
            },
            terraform_version: self.terraform_version,
            is_destroy: false,
            speculative: false,
            target_addresses: self.targets,
            refresh: self.refresh,
            refresh_only: self.refresh_only,
        }
    }
}

/// Arguments for the plan subcommand.
#[derive(Parser, Debug)]
struct PlanArgs {
    /// Full path of the workspace
    workspace: String,

    #[command(flatten)]
    run: RunFlags,

    /// Plan a destroy
    #[arg(long)]
    destroy: bool,
}

/// Arguments for the apply and destroy subcommands.
#[derive(Parser, Debug)]
struct ApplyArgs {
    /// Full path of the workspace
    workspace: String,

    #[command(flatten)]
    run: RunFlags,

    /// Apply without asking for approval
    #[arg(long)]
    auto_approve: bool,

    /// Ask for approval; with --input=false the apply is skipped unless --auto-approve is set
    #[arg(
        long,
        value_name = "BOOL",
        default_value_t = true,
        action = ArgAction::Set,
        require_equals = true
    )]
    input: bool,

    /// Comment recorded with the apply
    #[arg(long)]
    comment: Option<String>,
}

impl ApplyArgs {
    fn options(&self) -> ApplyOptions {
        ApplyOptions {
            auto_approve: self.auto_approve,
            input: self.input,
            comment: self.comment.clone(),
        }
    }
}

/// Arguments for the cancel subcommand.
#[derive(Parser, Debug)]
struct CancelArgs {
    /// ID of the run to cancel
    run_id: String,

    /// Force cancellation of a run that did not stop gracefully
    #[arg(long)]
    force: bool,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Stdout carries command output and job logs only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<TerrapinConfig> {
    if let Some(path) = explicit {
        return TerrapinConfig::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }

    match TerrapinConfig::default_path() {
        Some(path) if path.exists() => TerrapinConfig::from_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        Some(path) => {
            warn!("Settings file {} not found, using defaults", path.display());
            Ok(TerrapinConfig::default())
        }
        None => {
            warn!("Could not determine home directory, using default settings");
            Ok(TerrapinConfig::default())
        }
    }
}

/// Cancels `token` on the first Ctrl-C and exits on the second.
fn watch_interrupts(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, cancelling");
        token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
}

async fn run_command(cli: Cli) -> Result<ExitStatus> {
    let config = load_config(cli.config.as_deref())?;
    let settings = config
        .run
        .to_settings()
        .context("Invalid run settings")?;
    let profile = config
        .resolve_profile(
            cli.profile.as_deref(),
            &ProfileEnv::from_process(),
            keychain_token,
        )
        .context("Failed to resolve profile")?;
    debug!(?profile, ?settings, "Loaded settings");

    let backend = HttpBackend::new(&profile.endpoint, profile.token.as_deref())
        .context("Failed to create backend client")?
        .with_request_timeout(settings.wait_timeout);

    let cancel = CancellationToken::new();
    watch_interrupts(cancel.clone());
    let budget = WaitBudget::new(cancel, settings.wait_timeout);
    let console = StdConsole::new(cli.color.should_use_colors());
    let mut lifecycle = Lifecycle::new(Arc::new(backend), settings, budget, console);

    let status = match cli.command {
        Commands::Plan(args) => {
            let mut request = args.run.into_request(args.workspace);
            request.is_destroy = args.destroy;
            lifecycle.plan(request).await
        }
        Commands::Apply(args) => {
            let options = args.options();
            lifecycle
                .apply(args.run.into_request(args.workspace), &options)
                .await
        }
        Commands::Destroy(args) => {
            let options = args.options();
            lifecycle
                .destroy(args.run.into_request(args.workspace), &options)
                .await
        }
        Commands::Cancel(args) => lifecycle.cancel(&args.run_id, args.force).await,
        Commands::Completions(_) => ExitStatus::Success,
    };
    Ok(status)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Completions(args) = &cli.command {
        completions::write_completions(args, &mut std::io::stdout());
        return Ok(());
    }

    let status = run_command(cli).await?;
    std::process::exit(status.code());
}
