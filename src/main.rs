//! Stackwright CLI entrypoint.
//!
//! This is the main entrypoint for the stackwright command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use stackwright::cli::{Cli, Commands, OutputFormatter, StateCommands};
use stackwright::config::{ConfigParser, ConfigValidator, StackConfig, StateBackend, find_config_file};
use stackwright::error::Result;
use stackwright::graph::Graph;
use stackwright::planner::{CancelSignal, Executor, ExecutorOptions, Plan, Planner};
use stackwright::provider::HttpProvider;
use stackwright::state::{DeployedState, LocalStateStore, S3StateStore, StateStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Plan { detailed, destroy } => {
            cmd_plan(cli.config.as_ref(), detailed, destroy, &formatter).await
        }
        Commands::Apply { yes } => cmd_apply(cli.config.as_ref(), yes, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Stackwright project in: {}", path.display());

    let config_path = path.join("stackwright.stack.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Declaration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write declaration template
    let config_template = include_str!("../templates/stackwright.stack.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    // Write .env.example
    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    // Write/update .gitignore
    let gitignore_content = ".env\n.stackwright/\n";
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") || !existing.contains(".stackwright") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Stackwright")?;
            if !existing.contains(".env") {
                writeln!(file, ".env")?;
            }
            if !existing.contains(".stackwright") {
                writeln!(file, ".stackwright/")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, gitignore_content)?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your provider token");
    eprintln!("  2. Edit stackwright.stack.yaml with your resource declarations");
    eprintln!("  3. Run 'stackwright validate' to check your declaration");
    eprintln!("  4. Run 'stackwright plan' to see what will be provisioned");
    eprintln!("  5. Run 'stackwright apply' to provision your stack");

    Ok(())
}

/// Validate the declaration and its dependency graph.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating declaration: {}", config_file.display());

    // Load .env
    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    // Parse declaration
    let config = parser.load_file(&config_file)?;

    // Validate values
    let validator = ConfigValidator::new();
    let result = validator.validate(&config)?;

    // Build the graph: catches cycles and dangling references
    let graph = config.build_graph()?;

    if result.is_valid() {
        eprintln!("Declaration is valid!");
        if show_warnings && !result.warnings.is_empty() {
            eprintln!("\nWarnings:");
            for warning in &result.warnings {
                eprintln!("  - {warning}");
            }
        }
    }

    // Show summary
    eprintln!("\nDeclaration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Resources: {}", graph.len());
    let order: Vec<&str> = graph.ordered().map(|r| r.id.as_str()).collect();
    eprintln!("  Apply order: {}", order.join(" -> "));

    Ok(())
}

/// Show the reconciliation plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    destroy: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let graph = config.build_graph()?;

    // Load state
    let state = state_store
        .load()
        .await?
        .unwrap_or_else(|| DeployedState::new(&config.project.name, &config.project.environment));

    // Compute plan
    let planner = Planner::new();
    let plan = if destroy {
        planner.plan_destroy(&graph, &state)
    } else {
        planner.plan(&graph, &state)
    };

    // Output
    let output = formatter.format_plan(&plan);
    eprintln!("{output}");

    if detailed {
        eprintln!("\nDetailed changes:");
        for action in plan.changes() {
            eprintln!(
                "  {} {} - {}",
                action.action_type, action.resource_id, action.reason
            );
        }
    }

    Ok(())
}

/// Apply the reconciliation plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let graph = config.build_graph()?;

    // Hold the state lock for the whole run: single writer.
    let lock = state_store.acquire_lock("").await?;
    let result = apply_locked(&config, &graph, &state_store, auto_approve, formatter).await;
    state_store.release_lock(&lock.lock_id).await?;

    result
}

/// The lock-guarded part of apply.
async fn apply_locked<S: StateStore>(
    config: &StackConfig,
    graph: &Graph,
    state_store: &S,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut state = state_store
        .load()
        .await?
        .unwrap_or_else(|| DeployedState::new(&config.project.name, &config.project.environment));

    let planner = Planner::new();
    let plan = planner.plan(graph, &state);

    if plan.is_unchanged() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    // Show plan
    let output = formatter.format_plan(&plan);
    eprintln!("{output}");

    // Confirm
    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    execute_plan(config, graph, &plan, &mut state, state_store, formatter).await
}

/// Destroy all provisioned resources.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;
    let graph = config.build_graph()?;

    let lock = state_store.acquire_lock("").await?;
    let result = destroy_locked(&config, &graph, &state_store, auto_approve, formatter).await;
    state_store.release_lock(&lock.lock_id).await?;

    result
}

/// The lock-guarded part of destroy.
async fn destroy_locked<S: StateStore>(
    config: &StackConfig,
    graph: &Graph,
    state_store: &S,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let Some(mut state) = state_store.load().await? else {
        eprintln!("No state found; nothing to destroy.");
        return Ok(());
    };

    let planner = Planner::new();
    let plan = planner.plan_destroy(graph, &state);

    if plan.is_unchanged() {
        eprintln!("Nothing to destroy.");
        return Ok(());
    }

    let output = formatter.format_plan(&plan);
    eprintln!("{output}");

    // Destructive deletes are gated behind a typed confirmation; the gate
    // itself is a declaration setting, not a hardcoded policy.
    if config.settings.destroy_confirmation
        && !auto_approve
        && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    execute_plan(config, graph, &plan, &mut state, state_store, formatter).await?;

    // Full teardown succeeded: drop the state itself.
    if state.is_empty() {
        state_store.delete().await?;
        eprintln!("\nAll resources destroyed.");
    }

    Ok(())
}

/// Executes a plan and persists the resulting state, partial or not.
async fn execute_plan<S: StateStore>(
    config: &StackConfig,
    graph: &Graph,
    plan: &Plan,
    state: &mut DeployedState,
    state_store: &S,
    formatter: &OutputFormatter,
) -> Result<()> {
    let provider = create_provider(config)?;

    // Stop between actions on ctrl-c; the in-flight provider call finishes.
    let cancel = CancelSignal::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current action");
            signal_cancel.cancel();
        }
    });

    let executor = Executor::new(&provider)
        .with_options(ExecutorOptions::from(&config.settings))
        .with_cancel(cancel);

    let report = executor.execute(plan, graph, state).await?;

    // Persist whatever was applied, success or not.
    state_store.save(state).await?;

    let output = formatter.format_report(&report);
    eprintln!("\n{output}");

    if report.success {
        Ok(())
    } else {
        Err(stackwright::error::StackError::internal(format!(
            "{} of {} actions applied before halting; partial state saved (serial {})",
            report.applied,
            plan.changes().len(),
            state.serial
        )))
    }
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path).await?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                let output = formatter.format_state(&state);
                eprintln!("{output}");
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder_str = holder.as_deref().unwrap_or("");
            let lock = state_store.acquire_lock(holder_str).await?;
            eprintln!("State locked: {}", lock.lock_id);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                // Force unlock by releasing whatever lock is present
                if let Some(lock_info) = state_store.get_lock_info().await? {
                    state_store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Prompts on stderr and compares the trimmed reply to `expected`
/// (case-insensitive).
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Resolves the declaration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads the declaration and creates the appropriate state store.
async fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(StackConfig, Box<dyn StateStore>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading declaration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    // Validate
    let validator = ConfigValidator::new();
    validator.validate(&config)?;

    // Create state store based on config
    let state_store: Box<dyn StateStore> = match config.state.backend {
        StateBackend::Local => {
            let path = config.state.path.as_ref().map_or_else(
                || {
                    config_file
                        .parent()
                        .unwrap_or_else(|| std::path::Path::new("."))
                        .join(".stackwright")
                },
                PathBuf::from,
            );
            Box::new(LocalStateStore::with_base_dir(path))
        }
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| stackwright::error::StackError::internal("S3 bucket not configured"))?;
            let prefix = config.state.prefix.as_deref();
            let region = config.state.region.as_deref();
            Box::new(S3StateStore::new(bucket, prefix, region).await?)
        }
    };

    Ok((config, state_store))
}

/// Creates the provisioning API client.
fn create_provider(config: &StackConfig) -> Result<HttpProvider> {
    let token = ConfigParser::get_provider_token()?;
    HttpProvider::with_timeout(
        &config.provider.endpoint,
        &token,
        config.provider.timeout_secs,
    )
}
