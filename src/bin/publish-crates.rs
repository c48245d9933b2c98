//! publish-crates CLI
//!
//! Publishes the crates of a workspace in dependency order

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use publish_crates::core::{ConfigLoadOptions, ConfigLoader, RawFlags, RunError, Settings};
use publish_crates::orchestration::{CargoPublisher, WorkspacePublisher};
use publish_crates::registry::load_oracle;
use publish_crates::security::SecureTokenManager;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;

/// Publish the crates of a Cargo workspace in dependency order
#[derive(Parser)]
#[command(name = "publish-crates")]
#[command(version)]
#[command(about = "Publish the crates of a Cargo workspace in dependency order", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every unpublished crate, dependencies first
    Publish {
        #[command(flatten)]
        input: InputArgs,

        /// Print the run report as JSON
        #[arg(long)]
        report_json: bool,
    },

    /// Discover, check and print the publish order without publishing
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
}

/// Inputs shared by every subcommand
///
/// Boolean inputs are taken as strings and parsed by the config loader, so
/// flags, environment and config file follow the same rules.
#[derive(Args)]
struct InputArgs {
    /// Workspace root (defaults to current directory)
    #[arg(long, value_name = "PATH", default_value = ".")]
    path: PathBuf,

    /// Extra arguments for `cargo publish`, whitespace separated
    #[arg(long, allow_hyphen_values = true)]
    args: Option<String>,

    /// Target registry name
    #[arg(long)]
    registry: Option<String>,

    /// Registry token (prefer PUBLISH_CRATES_REGISTRY_TOKEN)
    #[arg(long)]
    registry_token: Option<String>,

    /// Only log what would be published: true|false
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    dry_run: Option<String>,

    /// Wait until each crate is visible in the registry: true|false
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    wait: Option<String>,

    /// Maximum seconds to wait for each crate
    #[arg(long, value_name = "SECS")]
    wait_timeout: Option<String>,

    /// Seconds between registry checks
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<String>,

    /// Registry query method: api|sparse
    #[arg(long)]
    oracle: Option<String>,

    /// Registry web API base URL
    #[arg(long, value_name = "URL")]
    registry_api_url: Option<String>,

    /// Sparse index URL
    #[arg(long, value_name = "URL")]
    index_url: Option<String>,
}

impl InputArgs {
    fn raw_flags(&self) -> RawFlags {
        RawFlags {
            args: self.args.clone(),
            registry: self.registry.clone(),
            dry_run: self.dry_run.clone(),
            wait: self.wait.clone(),
            wait_timeout: self.wait_timeout.clone(),
            poll_interval: self.poll_interval.clone(),
            oracle: self.oracle.clone(),
            registry_api_url: self.registry_api_url.clone(),
            index_url: self.index_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Publish { input, report_json } => publish_command(input, report_json).await,
        Commands::Check { input } => check_command(input).await,
    }
}

/// Load, validate and resolve configuration for `input`
async fn load_settings(input: &InputArgs) -> Result<Settings, RunError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let token = input
        .registry_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::new(t.into()))
        .or_else(|| ConfigLoader::load_env_token(&env));

    let config = ConfigLoader::load(ConfigLoadOptions {
        project_path: input.path.clone(),
        cli_flags: Some(input.raw_flags()),
        env,
    })
    .await?;

    let validation = ConfigLoader::validate(&config);
    if !validation.errors.is_empty() || !validation.warnings.is_empty() {
        println!("{}\n", ConfigLoader::format_validation_result(&validation));
    }

    Ok(ConfigLoader::resolve(config, input.path.clone(), token)?)
}

/// Cancel the token on Ctrl-C; the current package is always finished first
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current crate");
            trigger.cancel();
        }
    });
    cancel
}

async fn publish_command(input: InputArgs, report_json: bool) -> Result<i32> {
    println!("\n📦 publish-crates\n");

    let settings = match load_settings(&input).await {
        Ok(settings) => settings,
        Err(e) => return Ok(report_error(&e)),
    };

    let oracle = load_oracle(&settings.oracle)?;
    let tokens = SecureTokenManager::new(settings.run.registry.clone(), settings.registry_token);
    if !tokens.has_token() && !settings.run.dry_run {
        info!(
            "no registry token given; cargo falls back to {} or its credentials file",
            tokens.token_name()
        );
    }
    let publisher = CargoPublisher::new(tokens);
    let cancel = cancel_on_ctrl_c();

    match WorkspacePublisher::new(&publisher, oracle.as_ref())
        .publish(&settings.root, &settings.run, &cancel)
        .await
    {
        Ok(report) => {
            if report_json {
                println!("{}", report.to_json()?);
            }
            if settings.run.dry_run {
                println!("\n✅ Dry run completed: {}", report.summary());
            } else {
                println!("\n✅ Publishing completed successfully: {}", report.summary());
            }
            Ok(0)
        }
        Err(e) => Ok(report_error(&e)),
    }
}

async fn check_command(input: InputArgs) -> Result<i32> {
    println!("\n🔍 Workspace Check\n");

    let settings = match load_settings(&input).await {
        Ok(settings) => settings,
        Err(e) => return Ok(report_error(&e)),
    };

    let oracle = load_oracle(&settings.oracle)?;
    let publisher = CargoPublisher::new(SecureTokenManager::default());

    match WorkspacePublisher::new(&publisher, oracle.as_ref())
        .plan(&settings.root)
        .await
    {
        Ok(check) => {
            println!("Publish order:");
            for (index, name) in check.plan.iter().enumerate() {
                let status = match check.packages.get(name) {
                    Some(package) if package.is_published() => "published".to_string(),
                    Some(package) => format!("{} → publish", package.version()),
                    None => "unknown".to_string(),
                };
                println!("  {}. {} ({})", index + 1, name, status);
            }

            if !check.warnings.is_empty() {
                println!("\n🟡 Warnings:");
                for warning in &check.warnings {
                    println!("  - {}", warning);
                }
            }

            let pending = check.pending();
            println!(
                "\n✅ Workspace is ready: {} of {} crate(s) to publish",
                pending.len(),
                check.plan.len()
            );
            Ok(0)
        }
        Err(e) => Ok(report_error(&e)),
    }
}

/// Print a run error with its phase and suggested actions
fn report_error(error: &RunError) -> i32 {
    eprintln!("\n❌ Failed during {} [{}]", error.phase(), error.code());
    eprintln!("{}", error.report());

    let actions = error.suggested_actions();
    if !actions.is_empty() {
        eprintln!("\n💡 Suggested actions:");
        for action in actions {
            eprintln!("  - {}", action);
        }
    }

    1
}
