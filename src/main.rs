use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use neuropipe::orchestrator::{resolve_workers, PROTOCOL_PAYLOAD_KEY};
use neuropipe::stages::{
    AnnotateEvents, BadChannelStage, DescribeRecording, InterpolateStage, RereferenceStage,
    SegmentStage,
};
use neuropipe::{
    build_jobs, check_writable, read_results, run_batch, write_results, ExclusionSet, FileSelector,
    JobOutcome, JobResult, JobRunner, JsonRecordingStore, PhaseSegmenter, ProtocolTable,
    ProtocolValidator, ResultFilter, SegmentConfig, SelectionConfig, SelectionFilter,
    StagePipeline, TriggerChannelDecoder, ALL_WORKERS,
};

#[derive(Parser)]
#[command(name = "neuropipe")]
#[command(author, version, about = "EEG recording preprocessing pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and condition raw recordings into the output directory
    Preprocess {
        /// Root of the raw recordings
        input_dir: PathBuf,

        /// Root of the preprocessed recordings (mirrors the input tree)
        output_dir: PathBuf,

        /// Number of parallel workers, -1 for all cores
        #[arg(long = "n_jobs", default_value_t = 1, allow_negative_numbers = true)]
        n_jobs: i64,

        /// Only process this participant
        #[arg(long)]
        participant: Option<u32>,

        /// Only process this session (1 to 15)
        #[arg(long)]
        session: Option<u32>,

        /// Only process this recording file
        #[arg(long)]
        fname: Option<PathBuf>,

        /// Skip recordings whose output already exists
        #[arg(long = "ignore_existing")]
        ignore_existing: bool,

        /// Recordings to skip, one path per line; failed recordings are added to it
        #[arg(long)]
        exclusion_file: Option<PathBuf>,

        /// Manifest file name, written in the output directory with a timestamp
        #[arg(long, default_value = "preprocess.json")]
        manifest_name: String,

        /// Segment neurofeedback recordings into phase windows
        #[arg(long)]
        segment: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check the event protocol of raw recordings without writing anything
    Check {
        /// Root of the raw recordings
        input_dir: PathBuf,

        /// Only check this participant
        #[arg(long)]
        participant: Option<u32>,

        /// Only check this session (1 to 15)
        #[arg(long)]
        session: Option<u32>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Summarize a result manifest
    Results {
        /// Manifest file written by `preprocess`
        manifest: PathBuf,

        /// Only list successful recordings
        #[arg(long, conflicts_with = "failure_only")]
        success_only: bool,

        /// Only list failed recordings
        #[arg(long)]
        failure_only: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Preprocess {
            input_dir,
            output_dir,
            n_jobs,
            participant,
            session,
            fname,
            ignore_existing,
            exclusion_file,
            manifest_name,
            segment,
            verbose,
        } => {
            setup_logging(verbose);
            let filter = SelectionFilter {
                participant,
                session,
                explicit_file: fname,
                ignore_existing,
            };
            preprocess(
                input_dir,
                output_dir,
                n_jobs,
                filter,
                exclusion_file,
                manifest_name,
                segment,
            )
            .await
        }
        Commands::Check {
            input_dir,
            participant,
            session,
            verbose,
        } => {
            setup_logging(verbose);
            let filter = SelectionFilter {
                participant,
                session,
                ..SelectionFilter::default()
            };
            check(input_dir, filter).await
        }
        Commands::Results {
            manifest,
            success_only,
            failure_only,
            verbose,
        } => {
            setup_logging(verbose);
            let filter = if success_only {
                ResultFilter::SuccessOnly
            } else if failure_only {
                ResultFilter::FailureOnly
            } else {
                ResultFilter::All
            };
            show_results(&manifest, filter)
        }
    }
}

fn setup_logging(verbose: bool) {
    let builder = FmtSubscriber::builder();
    let installed = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => {
            let level = if verbose { Level::DEBUG } else { Level::INFO };
            tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
        }
    };
    installed.ok();
}

/// Stages applied to every recording
fn default_pipeline(table: &ProtocolTable) -> StagePipeline {
    StagePipeline::new()
        .with_stage(DescribeRecording)
        .with_stage(AnnotateEvents::new(table.clone()))
        .with_stage(BadChannelStage::default())
        .with_stage(InterpolateStage::default())
        .with_stage(RereferenceStage::default())
}

async fn preprocess(
    input_dir: PathBuf,
    output_dir: PathBuf,
    n_jobs: i64,
    filter: SelectionFilter,
    exclusion_file: Option<PathBuf>,
    manifest_name: String,
    segment: bool,
) -> Result<()> {
    // Fail fast on batch-level problems, before any recording is touched
    resolve_workers(n_jobs)?;
    let manifest_path = output_dir.join(&manifest_name);
    check_writable(&manifest_path).context("Cannot write the result manifest")?;

    let exclusions = match &exclusion_file {
        Some(path) => ExclusionSet::load(path)?,
        None => ExclusionSet::empty(),
    };
    info!("{} recordings excluded", exclusions.len());

    let selector = FileSelector::new(SelectionConfig::default()).with_exclusions(exclusions.clone());
    let selection = selector
        .select(&input_dir, &output_dir, &filter)?
        .require_any(&input_dir)?;

    let table = ProtocolTable::default();
    let mut pipeline = default_pipeline(&table);
    if segment {
        let segmenter = PhaseSegmenter::new(&table, SegmentConfig::default());
        pipeline.push(Box::new(SegmentStage::new(segmenter)));
    }
    info!("Stages: {}", pipeline.names().join(", "));

    let runner = Arc::new(JobRunner::new(
        Arc::new(JsonRecordingStore),
        Arc::new(TriggerChannelDecoder),
        ProtocolValidator::new(table),
        pipeline,
    ));
    let jobs = build_jobs(selection.references, &input_dir, &output_dir);
    let results = run_batch(runner, jobs, n_jobs).await?;

    let written = write_results(&results, &manifest_path)?;

    let failed: Vec<&JobResult> = results.iter().filter(|r| !r.is_success()).collect();
    if let Some(path) = &exclusion_file {
        let mut exclusions = exclusions;
        exclusions.extend(failed.iter().map(|r| r.path.clone()));
        exclusions.save(path)?;
        info!("Exclusion file {:?} now lists {} recordings", path, exclusions.len());
    }

    println!("\n=== Preprocessing Summary ===");
    println!("Recordings: {}", results.len());
    println!("Succeeded: {}", results.len() - failed.len());
    println!("Failed: {}", failed.len());
    for result in &failed {
        println!("  {}", result.path.display());
    }
    println!("Manifest: {}", written.display());

    Ok(())
}

async fn check(input_dir: PathBuf, filter: SelectionFilter) -> Result<()> {
    let selection = FileSelector::default()
        .select(&input_dir, &input_dir, &filter)?
        .require_any(&input_dir)?;

    let runner = Arc::new(
        JobRunner::new(
            Arc::new(JsonRecordingStore),
            Arc::new(TriggerChannelDecoder),
            ProtocolValidator::default(),
            StagePipeline::new(),
        )
        .dry_run(),
    );
    let jobs = build_jobs(selection.references, &input_dir, &input_dir);
    let results = run_batch(runner, jobs, ALL_WORKERS).await?;

    println!("\n=== Protocol Check ===");
    for result in &results {
        let status = match &result.outcome {
            JobOutcome::Success { payload } if payload.contains_key(PROTOCOL_PAYLOAD_KEY) => {
                "HEALED".to_string()
            }
            JobOutcome::Success { .. } => "OK".to_string(),
            JobOutcome::Failure { error_trace } => {
                format!("FAILED ({})", error_trace.lines().next().unwrap_or_default())
            }
        };
        println!("{:<8} {}", status, result.path.display());
    }
    for rejected in &selection.rejected {
        println!("MISNAMED {}", rejected);
    }

    let failures = results.iter().filter(|r| !r.is_success()).count();
    if failures > 0 {
        warn!("{} recordings do not match their protocol", failures);
    }
    Ok(())
}

fn show_results(path: &Path, filter: ResultFilter) -> Result<()> {
    let manifest = read_results(path, filter)?;

    println!("\n=== Manifest ===");
    println!("Created: {}", manifest.created_at);
    println!("Results: {}", manifest.results.len());
    println!("Succeeded: {}", manifest.successes());
    println!("Failed: {}", manifest.failures());

    for result in &manifest.results {
        match &result.outcome {
            JobOutcome::Success { payload } => {
                let stages: Vec<&str> = payload.keys().map(String::as_str).collect();
                println!("  OK     {} [{}]", result.path.display(), stages.join(", "));
            }
            JobOutcome::Failure { error_trace } => {
                println!("  FAILED {}", result.path.display());
                for line in error_trace.lines() {
                    println!("         {}", line);
                }
            }
        }
    }

    Ok(())
}
