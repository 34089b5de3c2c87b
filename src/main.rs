use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pipebench::bench::{index_comparison_phases, BenchmarkRunner, PipelineOperation};
use pipebench::config::PipebenchConfig;
use pipebench::error::{exit_code, user_friendly_message};
use pipebench::llm::{generate_pipeline, AzureOpenAiClient};
use pipebench::models::Report;
use pipebench::pipeline::Pipeline;
use pipebench::prompt::{ExampleRegistry, PromptBuilder};
use pipebench::store::open_bench_store;
use pipebench::util::{format_duration, format_seconds, format_speedup, parse_duration};
use pipebench::{PipebenchError, Result};

/// Fields the ranking pipeline reads, indexed in the "with index" phase
const INDEX_PATHS: [&str; 2] = ["imdb.rating", "tomatoes.viewer.rating"];

#[derive(Debug, Parser)]
#[command(name = "pipebench", version, about = "Aggregation pipeline bench")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "PIPEBENCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Time the ranking pipeline cold, warm and with indexes
    Bench(BenchArgs),
    /// Ask the language model for a pipeline answering a question
    Generate(GenerateArgs),
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
struct BenchArgs {
    /// Synthetic movies to seed into a memory:// store
    #[arg(long)]
    movies: Option<usize>,
    /// Dataset seed
    #[arg(long)]
    seed: Option<u64>,
    /// Pause after creating indexes, e.g. "10s" or "0"
    #[arg(long, value_parser = parse_duration)]
    settle: Option<Duration>,
    /// Documents the ranking pipeline keeps
    #[arg(long)]
    limit: Option<u64>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Question to answer, e.g. "What are the best 5 movies?"
    question: String,
    /// Also run the generated pipeline against the configured store
    #[arg(long)]
    run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pipebench=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", user_friendly_message(&err));
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Bench(args) => {
            let config = load_config(cli.config.as_deref())?;
            bench(config, args).await
        }
        Command::Generate(args) => {
            let config = load_config(cli.config.as_deref())?;
            generate(config, args).await
        }
        Command::Init { force } => init(cli.config, force),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipebenchConfig> {
    match path {
        Some(path) => PipebenchConfig::load_from(path),
        None => PipebenchConfig::load(),
    }
}

async fn bench(mut config: PipebenchConfig, args: BenchArgs) -> Result<()> {
    if let Some(count) = args.movies {
        config.bench.movie_count = count;
    }
    if let Some(seed) = args.seed {
        config.bench.seed = seed;
    }
    if let Some(settle) = args.settle {
        config.bench.settle_delay = settle;
    }
    if let Some(limit) = args.limit {
        config.bench.result_limit = limit;
    }
    config.validate()?;

    let limit = config.bench.result_limit;
    let settle_delay = config.bench.settle_delay;
    let operation_name = format!("top-{}-by-combined-rating", limit);
    info!(
        collection = %config.store.collection,
        settle = %format_duration(settle_delay),
        "starting benchmark session"
    );

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {elapsed} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("measuring {}", operation_name));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let session_name = operation_name.clone();
    let joined = tokio::task::spawn_blocking(move || -> Result<_> {
        let store = open_bench_store(&config.store, &config.bench)?;
        let pipeline = Pipeline::top_by_combined_rating(limit);
        let phases = index_comparison_phases(&session_name, &pipeline, &INDEX_PATHS, settle_delay);
        Ok(BenchmarkRunner::new().run_session(&store, phases))
    })
    .await;
    // Clear before any error is printed below the spinner line
    spinner.finish_and_clear();
    let outcome = joined??;

    if args.json {
        println!("{}", outcome.report.to_json_pretty()?);
    } else {
        print_report(&outcome.report);
    }
    outcome.into_result().map(|_| ())
}

fn print_report(report: &Report) {
    for line in report.summary() {
        println!("{}", line);
    }
    println!("total: {}", format_seconds(report.total_seconds()));

    for baseline in ["cold, no index", "warm, no index"] {
        for comparison in report.compare(baseline, "with index") {
            println!(
                "{}: {} ({}) -> with index ({}): {}",
                comparison.operation_name,
                baseline,
                format_seconds(comparison.baseline_seconds),
                format_seconds(comparison.candidate_seconds),
                format_speedup(comparison.speedup)
            );
        }
    }
}

async fn generate(config: PipebenchConfig, args: GenerateArgs) -> Result<()> {
    config.validate_llm()?;
    let client = AzureOpenAiClient::new(&config.llm)?;
    let builder = PromptBuilder::new(config.store.collection.clone(), ExampleRegistry::movies());

    let response = generate_pipeline(&client, &builder, &args.question).await?;
    println!("{}", response.pipeline.to_json_pretty()?);

    if args.run {
        let pipeline = response.pipeline;
        let (measurement, documents) = tokio::task::spawn_blocking(move || -> Result<_> {
            let store = open_bench_store(&config.store, &config.bench)?;
            BenchmarkRunner::new().measure_with_results(&PipelineOperation::new(pipeline), &store)
        })
        .await??;

        for document in &documents {
            println!("{}", serde_json::to_string(document)?);
        }
        println!(
            "{} documents in {}",
            measurement.documents,
            format_seconds(measurement.duration_seconds)
        );
    }
    Ok(())
}

fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => PipebenchConfig::config_file_path()?,
    };
    if path.exists() && !force {
        return Err(PipebenchError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    PipebenchConfig::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
