//! High-level pipeline: orchestrates load → diff → save for every file pair.
//!
//! This module drives a whole comparison job:
//!   - Pre-flight validation of the request ([`ComparisonJob::prepare`]); any
//!     failure aborts before a single file is read
//!   - For each file pair, in order: load both page containers, diff every
//!     page pair, persist the diff pages through the [`OutputWriter`]
//!   - Reports progress through a [`ProgressSink`] and finishes with exactly
//!     one terminal event
//!
//! # Major Types
//! - [`JobRequest`]: raw caller input (two path lists, output dir, formats)
//! - [`ComparisonJob`]: validated, zipped file pairs with a resolved format
//! - [`JobResult`]: `Completed`, `Cancelled` or `Failed`
//!
//! # Cancellation
//! The [`CancellationToken`] is polled before each file pair and before each
//! page. Work already started on a page or a write is never interrupted, and
//! files written before cancellation stay on disk.
//!
//! # Error Handling
//! The first per-pair failure (decode, page limit, size mismatch, page count
//! mismatch) stops the whole job. I/O and unexpected failures additionally
//! leave a diagnostic dump in the output directory. A destination that stays
//! locked is treated as the user declining to retry: the job is cancelled.
//!
//! The pipeline is single-threaded and blocking; callers run it on a
//! dedicated worker. Two jobs must not share an output directory.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info, info_span, warn};

use crate::contract::{CancellationToken, LockResolver, PageRasterizer, ProgressEvent, ProgressSink};
use crate::diagnostics;
use crate::differ::PageDiffer;
use crate::error::{JobError, WriteError};
use crate::source::{PageLoader, SourceFormat};
use crate::writer::{OutputFormats, OutputWriter};

/// Raw input for one comparison run, as supplied by a caller.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub old_paths: Vec<PathBuf>,
    pub new_paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub formats: OutputFormats,
}

/// One (old, new) pair under comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
}

/// A validated job. Only obtainable through [`ComparisonJob::prepare`].
#[derive(Debug, Clone)]
pub struct ComparisonJob {
    pairs: Vec<FilePair>,
    format: SourceFormat,
    output_dir: PathBuf,
    formats: OutputFormats,
}

impl ComparisonJob {
    /// Runs every pre-flight check, in order, and zips the path lists.
    pub fn prepare(request: &JobRequest) -> Result<Self, JobError> {
        let (old, new) = (&request.old_paths, &request.new_paths);
        if old.len() != new.len() {
            return Err(JobError::CountMismatch {
                old: old.len(),
                new: new.len(),
            });
        }
        if old.is_empty() {
            return Err(JobError::EmptySelection);
        }

        let format = SourceFormat::from_path(&old[0]).ok_or_else(|| JobError::UnsupportedFormat {
            path: old[0].clone(),
        })?;
        if let Some(path) = old
            .iter()
            .chain(new.iter())
            .find(|p| SourceFormat::from_path(p) != Some(format))
        {
            return Err(JobError::MixedFormat { path: path.clone() });
        }

        if !request.formats.any() {
            return Err(JobError::NoOutputFormatSelected);
        }
        if request.output_dir.as_os_str().is_empty() || !request.output_dir.is_dir() {
            return Err(JobError::MissingOutputDir {
                path: request.output_dir.clone(),
            });
        }
        NamedTempFile::new_in(&request.output_dir).map_err(|source| {
            JobError::OutputDirNotWritable {
                path: request.output_dir.clone(),
                source,
            }
        })?;
        if let Some(path) = old.iter().chain(new.iter()).find(|p| !p.is_file()) {
            return Err(JobError::MissingInputFile { path: path.clone() });
        }

        let pairs = old
            .iter()
            .zip(new.iter())
            .map(|(old_path, new_path)| FilePair {
                old_path: old_path.clone(),
                new_path: new_path.clone(),
            })
            .collect();

        Ok(Self {
            pairs,
            format,
            output_dir: request.output_dir.clone(),
            formats: request.formats,
        })
    }

    pub fn pairs(&self) -> &[FilePair] {
        &self.pairs
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn formats(&self) -> OutputFormats {
        self.formats
    }
}

/// What a job produced before it finished or was stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub pairs_completed: usize,
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug)]
pub enum JobResult {
    Completed(JobReport),
    Cancelled(JobReport),
    Failed(JobError),
}

impl JobResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobResult::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobResult::Cancelled(_))
    }

    pub fn error(&self) -> Option<&JobError> {
        match self {
            JobResult::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn terminal_event(&self) -> ProgressEvent {
        match self {
            JobResult::Completed(_) => ProgressEvent::Completed,
            JobResult::Cancelled(_) => ProgressEvent::Cancelled,
            JobResult::Failed(e) => ProgressEvent::Failed(e.to_string()),
        }
    }
}

enum Outcome {
    Finished,
    Cancelled,
}

/// Strips directory and extension, for labels.
fn base_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The document diff pipeline: loader, differ and writer wired together.
pub struct DiffPipeline<R, L> {
    loader: PageLoader<R>,
    differ: PageDiffer,
    writer: OutputWriter<L>,
}

impl<R: PageRasterizer, L: LockResolver> DiffPipeline<R, L> {
    pub fn new(loader: PageLoader<R>, differ: PageDiffer, writer: OutputWriter<L>) -> Self {
        Self {
            loader,
            differ,
            writer,
        }
    }

    /// Validates `request` and, if it passes, runs it.
    pub fn execute(
        &self,
        request: &JobRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> JobResult {
        match ComparisonJob::prepare(request) {
            Ok(job) => self.run(&job, sink, cancel),
            Err(e) => {
                warn!(error = %e, "[JOB] Pre-flight validation failed");
                let result = JobResult::Failed(e);
                sink.emit(result.terminal_event());
                result
            }
        }
    }

    /// Runs a validated job to completion, cancellation or failure. Always
    /// emits exactly one terminal progress event.
    pub fn run(
        &self,
        job: &ComparisonJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> JobResult {
        let span = info_span!("job", pairs = job.pairs.len(), format = ?job.format);
        let _enter = span.enter();
        info!(output_dir = %job.output_dir.display(), "[JOB] Starting comparison job");

        let mut report = JobReport::default();
        diagnostics::install_panic_hook();
        // Drop a trace left behind by an earlier panic on this thread.
        let _ = diagnostics::take_panic_backtrace();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.process(job, sink, cancel, &mut report)
        }));

        let result = match outcome {
            Ok(Ok(Outcome::Finished)) => JobResult::Completed(report),
            Ok(Ok(Outcome::Cancelled)) => JobResult::Cancelled(report),
            Ok(Err(e)) => JobResult::Failed(e),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic with non-string payload".to_string());
                JobResult::Failed(JobError::Unexpected {
                    message,
                    backtrace: diagnostics::take_panic_backtrace(),
                })
            }
        };

        match &result {
            JobResult::Completed(r) => info!(artifacts = r.artifacts.len(), "[JOB] Completed"),
            JobResult::Cancelled(r) => info!(pairs_completed = r.pairs_completed, "[JOB] Cancelled"),
            JobResult::Failed(e) => {
                error!(error = %e, kind = ?e.kind(), "[JOB] Failed");
                if e.wants_dump() {
                    let _ = diagnostics::write_dump(&job.output_dir, e);
                }
            }
        }
        sink.emit(result.terminal_event());
        result
    }

    fn process(
        &self,
        job: &ComparisonJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        report: &mut JobReport,
    ) -> Result<Outcome, JobError> {
        let files = job.pairs.len();
        for (index, pair) in job.pairs.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(file = index + 1, "[JOB] Cancellation observed before file pair");
                return Ok(Outcome::Cancelled);
            }
            match self.process_pair(job, index + 1, files, pair, sink, cancel)? {
                Some(artifacts) => {
                    report.pairs_completed += 1;
                    report.artifacts.extend(artifacts);
                }
                None => return Ok(Outcome::Cancelled),
            }
        }
        Ok(Outcome::Finished)
    }

    /// Returns `None` when the pair was abandoned because of cancellation.
    fn process_pair(
        &self,
        job: &ComparisonJob,
        file: usize,
        files: usize,
        pair: &FilePair,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<PathBuf>>, JobError> {
        sink.emit(ProgressEvent::Loading);
        let old = self.loader.load_as(&pair.old_path, job.format)?;
        let new = self.loader.load_as(&pair.new_path, job.format)?;
        if old.page_count() != new.page_count() {
            return Err(JobError::PageCountMismatch {
                old_path: pair.old_path.clone(),
                new_path: pair.new_path.clone(),
                old: old.page_count(),
                new: new.page_count(),
            });
        }

        let old_label = base_label(&pair.old_path);
        let new_label = base_label(&pair.new_path);
        let pages = old.page_count();
        let mut diffed = Vec::with_capacity(pages);
        for (index, (old_page, new_page)) in old.pages().iter().zip(new.pages()).enumerate() {
            if cancel.is_cancelled() {
                info!(file, page = index + 1, "[JOB] Cancellation observed before page");
                return Ok(None);
            }
            sink.emit(ProgressEvent::Page {
                file,
                files,
                page: index + 1,
                pages,
            });
            let page = self
                .differ
                .diff_page(old_page, new_page, &old_label, &new_label)
                .map_err(|source| JobError::Diff {
                    page: index + 1,
                    source,
                })?;
            diffed.push(page);
        }
        debug!(file, pages, "[DIFF] All pages compared");

        if cancel.is_cancelled() {
            info!(file, "[JOB] Cancellation observed before save");
            return Ok(None);
        }
        sink.emit(ProgressEvent::Saving);
        let artifacts = match self.writer.persist(
            &job.output_dir,
            &pair.new_path,
            &diffed,
            old.resolution(),
            job.formats,
        ) {
            Ok(artifacts) => artifacts,
            Err(WriteError::DestinationLocked { path }) => {
                warn!(path = %path.display(), "[SAVE] Locked destination declined, cancelling job");
                cancel.cancel();
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        sink.emit(ProgressEvent::Saved);
        Ok(Some(artifacts))
    }
}
