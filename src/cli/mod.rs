//! Command-line interface.
//!
//! The `simmer` binary is a thin host around the engine: it loads recipe
//! files, wires up the built-in capability registry, runs or inspects the
//! recipe, and prints the run report. Anything beyond that (custom
//! capabilities, embedding, dashboards) goes through the library API.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use console::style;
use serde_json::Value;

use crate::capability::CapabilityRegistry;
use crate::context::ContextStore;
use crate::error::{EngineError, Result};
use crate::graph::DependencyGraph;
use crate::recipe::{fingerprint, loader, Recipe, RecipeLibrary};
use crate::runner::{PreparedStep, RunOptions, Scheduler};

/// Recipe orchestration engine.
#[derive(Debug, Parser)]
#[command(name = "simmer", version, about)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a recipe.
    Run(RunArgs),

    /// Print a recipe's dispatch levels without running it.
    Graph(GraphArgs),

    /// Load a recipe and check its structure and dependency graph.
    Validate(ValidateArgs),

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Recipe file to run.
    pub recipe: PathBuf,

    /// Parameter binding, repeatable: --param key=value.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Worker pool size (default: available parallelism).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Directory of recipes resolvable as sub-recipes.
    #[arg(long, value_name = "DIR")]
    pub recipes_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct GraphArgs {
    /// Recipe file to inspect.
    pub recipe: PathBuf,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ValidateArgs {
    /// Recipe file to check.
    pub recipe: PathBuf,

    /// Directory of recipes resolvable as sub-recipes.
    #[arg(long, value_name = "DIR")]
    pub recipes_dir: Option<PathBuf>,
}

/// Execute a parsed command line.
pub fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run_command(args),
        Commands::Graph(args) => graph_command(args),
        Commands::Validate(args) => validate_command(args),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "simmer",
                &mut std::io::stdout(),
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Parse a `key=value` parameter binding. Values parse as JSON when they
/// can, so `--param n=3` binds a number and `--param name=world` a string.
pub fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| EngineError::RecipeValidation {
            message: format!("parameter '{}' must use key=value form", raw),
        })?;
    if key.trim().is_empty() {
        return Err(EngineError::RecipeValidation {
            message: format!("parameter '{}' has an empty key", raw),
        });
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn build_library(recipe: &Recipe, recipes_dir: Option<&PathBuf>) -> Result<Arc<RecipeLibrary>> {
    let library = RecipeLibrary::new();
    if let Some(dir) = recipes_dir {
        let loaded = library.load_dir(dir)?;
        tracing::debug!("loaded {} recipes from {}", loaded, dir.display());
    }
    library.register(recipe.clone());
    Ok(Arc::new(library))
}

fn run_command(args: RunArgs) -> Result<ExitCode> {
    let recipe = loader::from_path(&args.recipe)?;
    let library = build_library(&recipe, args.recipes_dir.as_ref())?;

    let mut options = RunOptions::default();
    if let Some(workers) = args.workers {
        options.workers = workers;
    }
    for raw in &args.params {
        let (key, value) = parse_param(raw)?;
        options.params.insert(key, value);
    }

    let scheduler = Scheduler::new(Arc::new(CapabilityRegistry::with_builtins()), library);
    let report = scheduler.run(&recipe, Arc::new(ContextStore::new()), &options)?;

    print!("{}", report.render());
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn graph_command(args: GraphArgs) -> Result<ExitCode> {
    let recipe = loader::from_path(&args.recipe)?;
    let graph = DependencyGraph::from_recipe(&recipe)?;

    println!(
        "{} v{} — {} steps",
        style(&recipe.name).bold(),
        recipe.version,
        recipe.steps.len()
    );
    for (i, level) in graph.levels().iter().enumerate() {
        let annotated: Vec<String> = level
            .iter()
            .map(|name| {
                match recipe.step(name).and_then(|s| s.parallel_group.as_deref()) {
                    Some(group) => format!("{} [{}]", name, group),
                    None => name.clone(),
                }
            })
            .collect();
        println!("  level {}: {}", i, annotated.join(", "));
    }

    let handlers: Vec<&str> = recipe.on_error_steps().map(|s| s.name.as_str()).collect();
    if !handlers.is_empty() {
        println!("  on_error: {}", handlers.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

fn validate_command(args: ValidateArgs) -> Result<ExitCode> {
    let recipe = loader::from_path(&args.recipe)?;
    let graph = DependencyGraph::from_recipe(&recipe)?;
    PreparedStep::prepare_all(&recipe)?;

    if let Some(dir) = args.recipes_dir.as_ref() {
        let library = RecipeLibrary::new();
        library.load_dir(dir)?;
        for step in &recipe.steps {
            if let Some(sub) = &step.sub_recipe {
                if !library.contains(sub) && sub != &recipe.name {
                    return Err(EngineError::UnknownRecipe { name: sub.clone() });
                }
            }
        }
    }

    println!(
        "{} {} v{}: {} steps, {} levels, fingerprint {}",
        style("ok").green(),
        recipe.name,
        recipe.version,
        recipe.steps.len(),
        graph.levels().len(),
        &fingerprint::fingerprint(&recipe)?[..12]
    );
    Ok(ExitCode::SUCCESS)
}
