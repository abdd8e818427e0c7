use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ringfinder::sink::{export_text_summary, write_evaluation_file};
use ringfinder::source::load_json_table;
use ringfinder::{
    CancellationToken, ClusteringStrategy, Completion, ConfigOverrides, DefaultsOverrides,
    EngineConfig, EngineEvent, ProgressReporter, Rule, RuleEngine,
};

#[derive(Parser, Debug)]
#[command(
    name = "ringfinder",
    version,
    about = "Flag buyer identities that group into suspected fraud rings"
)]
struct Cli {
    /// Order table as a JSON array of objects or JSON Lines
    #[arg(short, long, required_unless_present = "list")]
    input: Option<PathBuf>,
    /// Rule to evaluate, preset or custom; repeatable
    #[arg(short, long = "rule", value_name = "NAME")]
    rules: Vec<String>,
    /// Evaluate every preset and custom rule
    #[arg(long, conflicts_with = "rules")]
    all: bool,
    /// Directory receiving one `<rule>.csv` per flagged result
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Minimum distinct buyers for the generic presets
    #[arg(long)]
    threshold: Option<usize>,
    /// Similarity threshold (0-100) for the fuzzy presets
    #[arg(long)]
    similarity: Option<u8>,
    /// Fuzzy clustering strategy: star or connected-components
    #[arg(long)]
    strategy: Option<ClusteringStrategy>,
    /// Print a text summary of every evaluation
    #[arg(long)]
    summary: bool,
    /// List the available rules and exit
    #[arg(long)]
    list: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides::with_defaults(DefaultsOverrides {
            threshold: self.threshold,
            similarity_threshold: self.similarity,
            strategy: self.strategy,
            ..DefaultsOverrides::default()
        })
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref(), cli.overrides())?;
    let engine = RuleEngine::new(config);

    if cli.list {
        for rule in engine.rules() {
            println!(
                "{:<34} {:<16} threshold {}",
                rule.name,
                rule.kind.label(),
                rule.threshold
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let rules = select_rules(&engine, &cli)?;
    let Some(input) = cli.input.as_deref() else {
        bail!("--input is required");
    };
    let table = load_json_table(input)?;
    eprintln!(
        "loaded {} rows with {} columns from {}",
        table.len(),
        table.columns().len(),
        input.display()
    );
    fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;

    let (reporter, events) = ProgressReporter::channel();
    let printer = thread::spawn(move || {
        for event in events {
            match event {
                EngineEvent::Progress { rule, percent } => eprintln!("[{rule}] {percent}%"),
                EngineEvent::Log { rule, message } => eprintln!("[{rule}] {message}"),
            }
        }
    });
    let evaluations =
        engine.evaluate_all_with(&rules, &table, &reporter, &CancellationToken::new());
    drop(reporter);
    if printer.join().is_err() {
        eprintln!("progress printer stopped early");
    }

    let mut failed = false;
    for evaluation in &evaluations {
        match &evaluation.completion {
            Completion::Flagged(ids) => {
                if let Some(path) = write_evaluation_file(&cli.output_dir, evaluation)? {
                    println!("{}: flagged {} -> {}", evaluation.rule, ids.len(), path.display());
                }
            }
            Completion::Empty => println!("{}: no groups found", evaluation.rule),
            Completion::Failed(err) => {
                failed = true;
                println!("{}: processing failed: {err}", evaluation.rule);
            }
        }
        if cli.summary {
            println!("{}", export_text_summary(evaluation));
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn select_rules(engine: &RuleEngine, cli: &Cli) -> Result<Vec<Rule>> {
    if cli.all {
        return Ok(engine.rules());
    }
    if cli.rules.is_empty() {
        bail!("choose rules with --rule <NAME> or pass --all (see --list)");
    }
    cli.rules
        .iter()
        .map(|name| {
            engine
                .rule(name)
                .with_context(|| format!("unknown rule `{name}` (see --list)"))
        })
        .collect()
}
