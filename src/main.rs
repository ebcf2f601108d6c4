use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use rusty_reduce::api::parallel::configure_thread_pool;
use rusty_reduce::{AlgorithmRunner, Direction, Framework, FrameworkConfig};

#[derive(Parser)]
#[command(name = "rusty-reduce")]
#[command(about = "Run reduction algorithms on histogram workspaces")]
struct Cli {
    /// Framework configuration (TOML). Defaults to $RUSTY_REDUCE_CONFIG, then built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered algorithms
    List,

    /// Run a single algorithm
    Run {
        /// Algorithm name, e.g. Rebin
        algorithm: String,

        /// Algorithm version (highest registered if omitted)
        #[arg(long)]
        version: Option<u32>,

        /// Property assignments, KEY=VALUE
        properties: Vec<String>,
    },

    /// Run a file of algorithms, one per line, against one data service
    Pipeline {
        /// Lines of `Algorithm Key=Value ...`; `#` starts a comment
        file: PathBuf,

        /// Print the history of this workspace afterwards
        #[arg(long)]
        history: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FrameworkConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FrameworkConfig::from_env().context("loading config from environment")?,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter.as_str()))
        .init();
    configure_thread_pool(config.num_threads);
    let framework = Framework::with_config(config);

    match cli.command {
        Commands::List => {
            for d in framework.algorithms().descriptors() {
                println!("{:<28} v{}  {:<36} {}", d.name, d.version, d.category, d.summary);
            }
        }
        Commands::Run {
            algorithm,
            version,
            properties,
        } => {
            let runner = run_algorithm(&framework, &algorithm, version, properties.as_slice())?;
            print_outputs(&runner);
        }
        Commands::Pipeline { file, history } => {
            run_pipeline(&framework, &file)?;
            if let Some(name) = history {
                let ws = framework
                    .ads()
                    .retrieve(&name)
                    .with_context(|| format!("no workspace named {name}"))?;
                print!("{}", ws.history());
            }
        }
    }
    Ok(())
}

fn run_algorithm(
    framework: &Framework,
    name: &str,
    version: Option<u32>,
    assignments: &[impl AsRef<str>],
) -> Result<AlgorithmRunner> {
    let mut runner = framework.create_algorithm(name, version)?;
    runner.set_rethrows(true);
    for assignment in assignments {
        let assignment = assignment.as_ref();
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("expected KEY=VALUE, got '{assignment}'");
        };
        runner
            .set_property_value(key.trim(), value.trim())
            .with_context(|| format!("{name}: setting {key}"))?;
    }
    runner.execute().with_context(|| format!("{name} failed"))?;
    Ok(runner)
}

fn run_pipeline(framework: &Framework, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading pipeline {}", path.display()))?;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let assignments: Vec<&str> = tokens.collect();
        let runner = run_algorithm(framework, name, None, assignments.as_slice())
            .with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        print_outputs(&runner);
    }
    Ok(())
}

/// Print non-workspace outputs and the names output workspaces were stored under.
fn print_outputs(runner: &AlgorithmRunner) {
    for property in runner.properties().properties() {
        if !property.direction().is_output() || property.direction() == Direction::InOut {
            continue;
        }
        match property.workspace_value() {
            Some(w) if !w.name.is_empty() => println!("{}: {} = {}", runner.name(), property.name(), w.name),
            Some(_) => {}
            None => println!("{}: {} = {}", runner.name(), property.name(), property.value_as_string()),
        }
    }
}
