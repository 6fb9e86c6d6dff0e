//! sjtagent CLI entry point.

use std::error::Error as _;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use serde::Deserialize;
use serde_json::json;

use sjtagent::aggregate::{ResultAggregator, RunSummary};
use sjtagent::config::{GenerationMode, GeneratorConfig};
use sjtagent::dataset::Dataset;
use sjtagent::export::export_results;
use sjtagent::generator::SjtGenerator;
use sjtagent::model::{BehaviorOption, OptionScheme};
use sjtagent::progress::{IndicatifProgress, ProgressReporter, TracingProgress};
use sjtagent::quality::QualityGate;
use sjtagent::{logging, GenerationError, Result};

/// Exit code for a quality gate that did not pass.
const EXIT_GATE_FAILED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "sjtagent", version, about = "Generate situational judgment test items")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate items for every (trait, source item) pair of a scale
    Generate(GenerateArgs),
    /// Run the quality gate on a list of options
    Evaluate(EvaluateArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemeArg {
    FiveOption,
    FourLevel,
}

impl From<SchemeArg> for OptionScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::FiveOption => OptionScheme::FiveOption,
            SchemeArg::FourLevel => OptionScheme::FourLevel,
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Scale JSON: trait -> {items: {key -> {item}}}
    #[arg(long)]
    scale: PathBuf,

    /// Trait metadata JSON: trait -> {domain, facet_name, low_score, high_score}
    #[arg(long)]
    meta: PathBuf,

    /// Traits to generate for (default: every trait in the scale)
    #[arg(long, value_delimiter = ',')]
    traits: Vec<String>,

    /// Cues generated per source item
    #[arg(long)]
    items_per_source: Option<usize>,

    /// Maximum (trait, item) tasks in flight
    #[arg(long)]
    batch_concurrency: Option<usize>,

    /// Maximum cue pipelines in flight
    #[arg(long)]
    cue_concurrency: Option<usize>,

    /// Option scheme
    #[arg(long, value_enum)]
    scheme: Option<SchemeArg>,

    /// Refine each source item once instead of fanning out over cues
    #[arg(long)]
    single_item: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for results.json and results_detailed.json
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// JSON file holding an option list, or an object with an "options" list
    #[arg(long)]
    options: PathBuf,

    /// Cues the options should reflect
    #[arg(long, value_delimiter = ',')]
    cues: Vec<String>,

    /// Option scheme whose levels count toward coverage
    #[arg(long, value_enum, default_value = "five-option")]
    scheme: SchemeArg,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsFile {
    List(Vec<BehaviorOption>),
    Wrapped { options: Vec<BehaviorOption> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Generate(args) => generate(args).await,
        Commands::Evaluate(args) => evaluate(args),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn report_error(err: &GenerationError) {
    eprintln!("{} {}", "error:".red().bold(), err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
        source = cause.source();
    }
}

async fn generate(args: GenerateArgs) -> Result<ExitCode> {
    let mut config = GeneratorConfig::load(args.config.as_deref())?;
    if let Some(count) = args.items_per_source {
        config = config.with_items_per_source(count);
    }
    if let Some(limit) = args.batch_concurrency {
        config = config.with_batch_concurrency(Some(limit));
    }
    if let Some(limit) = args.cue_concurrency {
        config = config.with_cue_concurrency(limit);
    }
    if let Some(scheme) = args.scheme {
        config = config.with_option_scheme(scheme.into());
    }
    if args.single_item {
        config = config.with_mode(GenerationMode::SingleItem);
    }

    let request = Dataset::load(&args.scale, &args.meta)?.batch_request(&args.traits)?;
    let generator = Arc::new(SjtGenerator::from_config(&config)?);

    let progress: Arc<dyn ProgressReporter> = if std::io::stderr().is_terminal() {
        Arc::new(IndicatifProgress::new())
    } else {
        Arc::new(TracingProgress)
    };
    let results = generator
        .batch_scheduler(&config, progress)
        .run(&request)
        .await?;

    let aggregator = ResultAggregator::new(&config);
    let files = export_results(&args.out, &aggregator, &results)?;
    print_summary(&RunSummary::from_results(&results), aggregator.run_id());
    println!("  results:  {}", files.results.display());
    println!("  detailed: {}", files.detailed.display());
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary, run_id: &str) {
    println!("{} {}", "Run".bold(), run_id.cyan());
    println!(
        "  traits: {}  source items: {}  generated: {}",
        summary.traits, summary.source_items, summary.generated_items
    );
    println!(
        "  passing: {}  failed cues: {}  mean revisions: {:.2}",
        summary.passing_items.green(),
        if summary.failed_cues > 0 {
            summary.failed_cues.red().to_string()
        } else {
            summary.failed_cues.to_string()
        },
        summary.mean_iterations
    );
}

fn evaluate(args: EvaluateArgs) -> Result<ExitCode> {
    let text = std::fs::read_to_string(&args.options)?;
    let options = match serde_json::from_str::<OptionsFile>(&text)? {
        OptionsFile::List(options) | OptionsFile::Wrapped { options } => options,
    };
    let cues: Vec<String> = args
        .cues
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let metrics = QualityGate::new(args.scheme.into()).evaluate(&options, &cues);
    let deficiencies: Vec<&str> = metrics.deficiencies().iter().map(|d| d.as_str()).collect();
    let report = json!({
        "distinct_ratio": metrics.distinct_ratio,
        "level_coverage": metrics.level_coverage,
        "average_cue_hits": metrics.average_cue_hits,
        "pass": metrics.pass,
        "deficiencies": deficiencies,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!("{}", metrics.summary());

    Ok(if metrics.pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_GATE_FAILED)
    })
}
