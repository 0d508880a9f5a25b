use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use consolidator::app::ConsolidateUseCase;
use consolidator::config::Config;
use consolidator::infra::console::print_summary;
use consolidator::infra::{CsvExportSink, SheetDirectorySource, TracingReportSink};
use consolidator::logging;
use consolidator::pipeline::{ErrorHandlingStrategy, PipelineConfig, PipelineOrchestrator};

#[derive(Parser)]
#[command(name = "consolidator")]
#[command(about = "Merge spreadsheet exports, drop duplicates and normalize process numbers")]
#[command(version = "0.1.0")]
struct Cli {
    /// Settings file; defaults to ./config.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct DirArgs {
    /// Directory with the sheets to process
    #[arg(long)]
    input: Option<PathBuf>,
    /// Directory receiving the results
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge, deduplicate against the baseline, sanitize and mask
    Run {
        #[command(flatten)]
        dirs: DirArgs,
        /// Directory with the already-processed baseline sheets
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Abort instead of skipping a stage that cannot run
        #[arg(long)]
        stop_on_error: bool,
        /// Leave process numbers as they are
        #[arg(long)]
        no_mask: bool,
    },
    /// Merge sheets and drop exact duplicates
    Merge {
        #[command(flatten)]
        dirs: DirArgs,
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Keep only rows not already in the baseline
    Compare {
        #[command(flatten)]
        dirs: DirArgs,
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Mask the process-number column of each sheet
    Mask {
        #[command(flatten)]
        dirs: DirArgs,
    },
    /// Strip dashes and dots from the process-number column of each sheet
    Strip {
        #[command(flatten)]
        dirs: DirArgs,
    },
}

fn strategy(stop_on_error: bool, config: &Config) -> ErrorHandlingStrategy {
    if stop_on_error {
        ErrorHandlingStrategy::StopOnFirstError
    } else {
        config.pipeline.error_handling
    }
}

fn build_use_case(config: &Config, pipeline: PipelineConfig, output_dir: &Path) -> Result<ConsolidateUseCase> {
    let orchestrator = PipelineOrchestrator::new(pipeline).context("invalid pipeline configuration")?;
    let source = SheetDirectorySource::new(config.column_policy()).with_csv_options(config.csv.options()?);
    Ok(ConsolidateUseCase::new(
        orchestrator,
        Box::new(source),
        Box::new(CsvExportSink::new(output_dir)),
    ))
}

/// Run the pipeline over the whole input directory and write one output
async fn consolidate(
    config: &Config,
    pipeline: PipelineConfig,
    dirs: &DirArgs,
    baseline: Option<PathBuf>,
    prefix: &str,
) -> Result<()> {
    let input = dirs.input.clone().unwrap_or_else(|| config.paths.input_dir.clone());
    let output = dirs.output.clone().unwrap_or_else(|| config.paths.output_dir.clone());
    let baseline = baseline.unwrap_or_else(|| config.paths.baseline_dir.clone());

    let use_case = build_use_case(config, pipeline, &output)?;
    let outcome = use_case
        .run(&input, Some(&baseline), prefix, &mut TracingReportSink)
        .await
        .with_context(|| format!("pipeline failed for {}", input.display()))?;

    print_summary(&outcome);
    Ok(())
}

/// Run the pipeline on every sheet independently
async fn per_sheet(config: &Config, pipeline: PipelineConfig, dirs: &DirArgs, suffix: &str) -> Result<()> {
    let input = dirs.input.clone().unwrap_or_else(|| config.paths.input_dir.clone());
    let output = dirs.output.clone().unwrap_or_else(|| config.paths.output_dir.clone());

    let use_case = build_use_case(config, pipeline, &output)?;
    let outcomes = use_case
        .run_each(&input, suffix, &mut TracingReportSink)
        .await
        .with_context(|| format!("no sheet processed in {}", input.display()))?;

    for outcome in &outcomes {
        print_summary(outcome);
    }
    println!("\n✅ {} sheet(s) written", outcomes.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path, true),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let result = match &cli.command {
        Commands::Run {
            dirs,
            baseline,
            stop_on_error,
            no_mask,
        } => {
            println!("🚀 Running full pipeline...");
            let mut pipeline = config
                .apply(PipelineConfig::full())
                .with_error_handling(strategy(*stop_on_error, &config));
            if *no_mask {
                pipeline = pipeline.without_identifier();
            }
            consolidate(&config, pipeline, dirs, baseline.clone(), "processed").await
        }
        Commands::Merge { dirs, stop_on_error } => {
            println!("🔄 Merging sheets...");
            let pipeline = config
                .apply(PipelineConfig::merge())
                .with_error_handling(strategy(*stop_on_error, &config));
            consolidate(&config, pipeline, dirs, None, "consolidated").await
        }
        Commands::Compare {
            dirs,
            baseline,
            stop_on_error,
        } => {
            println!("🔍 Comparing against the baseline...");
            let pipeline = config
                .apply(PipelineConfig::compare())
                .with_error_handling(strategy(*stop_on_error, &config));
            consolidate(&config, pipeline, dirs, baseline.clone(), "unique").await
        }
        Commands::Mask { dirs } => {
            println!("🎭 Masking process numbers...");
            per_sheet(&config, config.apply(PipelineConfig::mask()), dirs, "masked").await
        }
        Commands::Strip { dirs } => {
            println!("✂️  Stripping process-number separators...");
            per_sheet(&config, config.apply(PipelineConfig::strip()), dirs, "unmasked").await
        }
    };

    match result {
        Ok(()) => {
            info!("Done");
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            println!("❌ {:#}", e);
            Err(e)
        }
    }
}
