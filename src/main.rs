use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use fork_patcher::config::{discover_plan_files, load_from_path, PlanConfig};
use fork_patcher::{FailureKind, PatchEngine, PlanResult, StepOutcome};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const WORKSPACE_ENV: &str = "FORK_PATCHER_WORKSPACE";

#[derive(Parser)]
#[command(name = "fork-patcher")]
#[command(about = "Apply ordered text patch plans to derive a branded source tree", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch plans to a source tree
    Apply {
        /// Path to the source tree root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific plan file to apply (otherwise applies all in plans/)
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Dry run - report what would change without writing files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print results as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Report which steps are satisfied or pending, without writing
    Status {
        /// Path to the source tree root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific plan file to check (otherwise checks all in plans/)
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },

    /// List the steps of each plan
    List {
        /// Path to the source tree root (defaults to the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific plan file to list (otherwise lists all in plans/)
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Commands::Apply {
            workspace,
            plan,
            dry_run,
            diff,
            json,
        } => cmd_apply(workspace, plan, dry_run, diff, json),

        Commands::Status { workspace, plan } => cmd_status(workspace, plan),

        Commands::List { workspace, plan } => cmd_list(workspace, plan),
    }
}

/// Resolve the source tree root.
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. FORK_PATCHER_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_path) = env::var(WORKSPACE_ENV) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: {WORKSPACE_ENV} is set but path doesn't exist: {env_path}").yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Plan files to run, in execution order.
///
/// An explicit --plan wins. Otherwise `*.toml` files are collected from
/// `<workspace>/plans`, then `./plans`, sorted by name.
fn plan_files(workspace: &Path, explicit: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(vec![path]);
    }

    let cwd_plans_dir = env::current_dir().ok().map(|cwd| cwd.join("plans"));
    let candidate_dirs = std::iter::once(workspace.join("plans")).chain(cwd_plans_dir);

    let files = discover_plan_files(candidate_dirs)?;
    if files.is_empty() {
        anyhow::bail!(
            "No .toml plan files found in either ./plans or {}/plans",
            workspace.display()
        );
    }

    Ok(files)
}

fn plan_name(config: &PlanConfig, plan_file: &Path) -> String {
    if config.meta.name.trim().is_empty() {
        plan_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| plan_file.display().to_string())
    } else {
        config.meta.name.clone()
    }
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", line);
        if change.missing_newline() {
            println!();
        }
    }
}

#[derive(Serialize)]
struct PlanReport {
    plan: String,
    source: PathBuf,
    aborted: bool,
    not_attempted: usize,
    steps: Vec<StepReport>,
}

#[derive(Serialize)]
struct StepReport {
    label: String,
    target: PathBuf,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl PlanReport {
    fn new(plan: String, source: &Path, planned: usize, result: &PlanResult) -> Self {
        let steps = result
            .records
            .iter()
            .map(|record| StepReport {
                label: record.label.clone(),
                target: record.target.clone(),
                outcome: match record.outcome {
                    StepOutcome::Applied => "applied",
                    StepOutcome::AlreadySatisfied => "already_satisfied",
                    StepOutcome::Failed(_) => "failed",
                },
                failure: record.outcome.failure_kind(),
                error: match &record.outcome {
                    StepOutcome::Failed(failure) => Some(failure.to_string()),
                    _ => None,
                },
            })
            .collect();

        Self {
            plan,
            source: source.to_path_buf(),
            aborted: result.aborted,
            not_attempted: planned.saturating_sub(result.records.len()),
            steps,
        }
    }
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    plan: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let plan_files = plan_files(&workspace, plan)?;

    if !json {
        println!("Workspace: {}", workspace.display());
        if dry_run {
            println!("{}", "[DRY RUN - no files will be written]".cyan());
        }
        println!();
    }

    let engine = PatchEngine::new()
        .dry_run(dry_run)
        .capture_changes(show_diff);

    let mut reports = Vec::new();
    let mut total_applied = 0;
    let mut total_satisfied = 0;
    let mut total_failed = 0;
    let mut total_skipped = 0;
    let mut aborted = false;

    for plan_file in &plan_files {
        let config = load_from_path(plan_file)?;

        // Later plans may depend on earlier ones; never run past a failure.
        if aborted {
            total_skipped += config.steps.len();
            continue;
        }

        let name = plan_name(&config, plan_file);
        let plan = config.to_plan(&workspace)?;
        let planned = plan.len();

        if !json {
            println!("Applying plan '{}' from {}...", name, plan_file.display());
        }

        let result = engine.run(plan);

        total_applied += result.applied_count();
        total_satisfied += result.satisfied_count();
        total_skipped += planned.saturating_sub(result.records.len());

        for record in &result.records {
            match &record.outcome {
                StepOutcome::Applied => {
                    if !json {
                        let verb = if dry_run { "Would apply to" } else { "Applied to" };
                        println!(
                            "{} {}: {} {}",
                            "✓".green(),
                            record.label,
                            verb,
                            record.target.display()
                        );
                        if let Some(change) = &record.change {
                            display_diff(&record.target, &change.before, &change.after);
                        }
                    }
                }
                StepOutcome::AlreadySatisfied => {
                    if !json {
                        println!(
                            "{} {}: Already satisfied in {}",
                            "⊙".yellow(),
                            record.label,
                            record.target.display()
                        );
                    }
                }
                StepOutcome::Failed(failure) => {
                    total_failed += 1;
                    if !json {
                        eprintln!("{} {}: Failed - {}", "✗".red(), record.label, failure);
                        if failure.kind() == FailureKind::ReadError {
                            eprintln!("  Possible causes:");
                            eprintln!("    - Workspace does not point at the tree root");
                            eprintln!("    - File was renamed or removed upstream");
                        }
                    }
                }
            }
        }

        if result.aborted {
            aborted = true;
            if !json {
                eprintln!(
                    "{}",
                    format!(
                        "  Plan aborted; {} remaining step(s) not attempted",
                        planned.saturating_sub(result.records.len())
                    )
                    .red()
                );
            }
        }

        if json {
            reports.push(PlanReport::new(name, plan_file, planned, &result));
        } else {
            println!();
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", total_applied).green());
        println!(
            "  {} already satisfied",
            format!("{}", total_satisfied).yellow()
        );
        println!("  {} not attempted", format!("{}", total_skipped).cyan());
        println!("  {} failed", format!("{}", total_failed).red());
    }

    if aborted {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(workspace: Option<PathBuf>, plan: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let plan_files = plan_files(&workspace, plan)?;

    println!("{}", "Patch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut satisfied = Vec::new();
    let mut pending = Vec::new();
    let mut unreadable = Vec::new();
    let mut unchecked = Vec::new();

    // Later steps see what earlier pending steps would write.
    let engine = PatchEngine::new().dry_run(true);

    for plan_file in &plan_files {
        let config = load_from_path(plan_file)?;
        let plan = config.to_plan(&workspace)?;
        let labels: Vec<String> = plan.steps().iter().map(|s| s.label().to_string()).collect();

        let result = engine.run(plan);

        for record in &result.records {
            match &record.outcome {
                StepOutcome::AlreadySatisfied => satisfied.push(record.label.clone()),
                StepOutcome::Applied => pending.push(record.label.clone()),
                StepOutcome::Failed(failure) => {
                    unreadable.push((record.label.clone(), failure.to_string()))
                }
            }
        }
        unchecked.extend(labels.into_iter().skip(result.records.len()));
    }

    if !satisfied.is_empty() {
        println!(
            "{} {} ({} steps)",
            "✓".green(),
            "SATISFIED".green().bold(),
            satisfied.len()
        );
        for label in &satisfied {
            println!("  - {}", label);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} steps)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for label in &pending {
            println!("  - {}", label);
        }
        println!();
    }

    if !unreadable.is_empty() {
        println!(
            "{} {} ({} steps)",
            "✗".red(),
            "UNREADABLE".red().bold(),
            unreadable.len()
        );
        for (label, reason) in &unreadable {
            println!("  - {} ({})", label, reason.dimmed());
        }
        println!();
    }

    if !unchecked.is_empty() {
        println!(
            "{} {} ({} steps)",
            "⊘".cyan(),
            "NOT CHECKED".cyan().bold(),
            unchecked.len()
        );
        for label in &unchecked {
            println!("  - {}", label);
        }
        println!();
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>, plan: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let plan_files = plan_files(&workspace, plan)?;

    for plan_file in &plan_files {
        let config = load_from_path(plan_file)?;
        println!(
            "{} {}",
            plan_name(&config, plan_file).bold(),
            format!("({})", plan_file.display()).dimmed()
        );
        if let Some(description) = &config.meta.description {
            println!("  {}", description);
        }

        for (idx, step) in config.steps.iter().enumerate() {
            let target = config.resolve_file(&workspace, &step.file);
            println!(
                "  {:>2}. {} [{}] {}",
                idx + 1,
                step.label(),
                step.transform.kind().cyan(),
                target.display()
            );
        }
        println!();
    }

    Ok(())
}
