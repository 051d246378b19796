///
/// This module implements the CLI interface for imgcomp: command parsing, wiring the
/// comparison pipeline from configuration, and running it on a background worker.
///
/// All comparison logic (decode, diff, write) lives in the library modules.
/// This module is strictly for CLI glue and user-visible output.
///
/// ## Features
/// - Entry struct [`Cli`] with the `compare` and `run` subcommands.
/// - Async entrypoint ([`run`]) for programmatic invocation and integration testing.
/// - Progress printed to stdout in order; logs go to stderr.
/// - Ctrl-C requests cooperative cancellation.
///
/// [`Cli`]: struct.Cli.html
/// [`run`]: fn.run.html
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::config::{JobConfig, LockRetrySection, OutputSection};
use crate::contract::{BackoffResolver, CancellationToken, ProgressEvent};
use crate::differ::PageDiffer;
use crate::label::LabelFont;
use crate::load_config::{apply_env_overrides, load_config};
use crate::pipeline::{DiffPipeline, JobResult};
use crate::raster::PdfiumRasterizer;
use crate::source::PageLoader;
use crate::writer::OutputWriter;

/// CLI for imgcomp: visual diff of multi-page technical drawings.
#[derive(Parser)]
#[clap(
    name = "imgcomp",
    version,
    about = "Compare old and new revisions of multi-page drawings (TIFF or PDF) and write colour-coded diffs"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare the given old and new files pairwise, in order
    Compare {
        /// Old revisions (repeat the flag or separate with commas)
        #[clap(long, num_args = 1.., value_delimiter = ',')]
        old: Vec<PathBuf>,
        /// New revisions, same count and order as --old
        #[clap(long, num_args = 1.., value_delimiter = ',')]
        new: Vec<PathBuf>,
        /// Directory the Output_* files are written to
        #[clap(long)]
        output_dir: PathBuf,
        /// Do not keep the TIFF stack
        #[clap(long)]
        no_tiff: bool,
        /// Also write a PDF derived from the TIFF stack
        #[clap(long)]
        pdf: bool,
        /// TrueType font used for page labels
        #[clap(long)]
        label_font: Option<PathBuf>,
        /// Directory containing the pdfium library
        #[clap(long)]
        pdfium_dir: Option<PathBuf>,
    },
    /// Run a comparison job described by a YAML (or .json) file
    Run {
        /// Path to the job file
        #[clap(long)]
        config: PathBuf,
    },
}

/// How a job that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl Commands {
    fn into_config(self) -> Result<JobConfig> {
        match self {
            Commands::Compare {
                old,
                new,
                output_dir,
                no_tiff,
                pdf,
                label_font,
                pdfium_dir,
            } => {
                let mut config = JobConfig {
                    old,
                    new,
                    output_dir,
                    output: OutputSection {
                        tiff: !no_tiff,
                        pdf,
                    },
                    label_font: None,
                    pdfium_library_dir: None,
                    lock_retry: LockRetrySection::default(),
                    page_limit: crate::source::PDF_PAGE_LIMIT,
                };
                apply_env_overrides(&mut config);
                // Explicit flags beat the environment.
                if label_font.is_some() {
                    config.label_font = label_font;
                }
                if pdfium_dir.is_some() {
                    config.pdfium_library_dir = pdfium_dir;
                }
                config.trace_loaded();
                Ok(config)
            }
            Commands::Run { config } => load_config(config),
        }
    }
}

/// Wires loader, differ and writer from a job configuration.
pub fn pipeline_from_config(config: &JobConfig) -> DiffPipeline<PdfiumRasterizer, BackoffResolver> {
    let loader = PageLoader::new(PdfiumRasterizer::new(config.pdfium_library_dir.clone()))
        .with_page_limit(config.page_limit);
    let differ = PageDiffer::new(LabelFont::discover(config.label_font.as_deref()));
    let writer = OutputWriter::new(config.lock_retry.resolver());
    DiffPipeline::new(loader, differ, writer)
}

/// Runs the job on a blocking worker, printing progress until it finishes.
/// Ctrl-C cancels between pages.
pub async fn execute_job(config: JobConfig) -> Result<JobResult> {
    let request = config.to_request();
    let pipeline = pipeline_from_config(&config);
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let worker_cancel = cancel.clone();
    let worker = tokio::task::spawn_blocking(move || pipeline.execute(&request, &tx, &worker_cancel));

    let signal_cancel = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling after the current page");
            println!("cancelling...");
            signal_cancel.cancel();
        }
    });

    while let Some(event) = rx.recv().await {
        println!("{event}");
    }
    ctrl_c.abort();

    worker.await.context("comparison worker stopped abnormally")
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<RunStatus> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let result = match cli.command.into_config() {
        Ok(config) => match execute_job(config).await {
            Ok(JobResult::Completed(report)) => {
                tracing::info!(?report, "Comparison complete");
                Ok(RunStatus::Completed)
            }
            Ok(JobResult::Cancelled(report)) => {
                tracing::warn!(?report, "Comparison cancelled");
                Ok(RunStatus::Cancelled)
            }
            Ok(JobResult::Failed(e)) => {
                tracing::error!(error = %e, kind = ?e.kind(), "Comparison failed");
                Err(anyhow::Error::new(e))
            }
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    // Emit an 'exit' span for structured tracing.
    let exit_span = tracing::info_span!("exit");
    exit_span.in_scope(|| {
        tracing::info!(ok = result.is_ok(), "imgcomp run finished");
    });

    result
}
