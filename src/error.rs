//! Error taxonomy for the comparison core.
//!
//! Each component returns its own error enum; the pipeline folds them into
//! [`JobError`] so callers only ever see one failure type in
//! [`crate::pipeline::JobResult::Failed`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a path into a [`crate::source::PageContainer`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("{path} has {pages} pages; PDF files are limited to {limit} pages")]
    PageLimitExceeded {
        path: PathBuf,
        pages: usize,
        limit: usize,
    },

    #[error("PDF rasteriser unavailable: {0}")]
    Rasterizer(String),
}

/// Errors raised by the page differ.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error(
        "page sizes differ: old is {}x{}, new is {}x{}; select images of the same size",
        old.0, old.1, new.0, new.1
    )]
    SizeMismatch { old: (u32, u32), new: (u32, u32) },
}

/// Errors raised while persisting output artifacts.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode TIFF stack {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("failed to derive PDF {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },

    #[error("access to {path} was denied; the file may be open in another program")]
    DestinationLocked { path: PathBuf },
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Coarse classification of a [`JobError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Pre-flight failure; nothing was written.
    Validation,
    /// Decode, size or page-limit failure for one file pair. Aborts the job.
    PerPair,
    /// Filesystem failure while writing output.
    Io,
    /// Anything that escaped classification (caught panics).
    Unexpected,
}

/// Every way a comparison job can fail.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no files selected for comparison")]
    EmptySelection,

    #[error("the number of files to compare differs: {old} old, {new} new")]
    CountMismatch { old: usize, new: usize },

    #[error("{path} is not a TIFF or PDF file")]
    UnsupportedFormat { path: PathBuf },

    #[error("{path} does not match the format of the other files; select files of one format")]
    MixedFormat { path: PathBuf },

    #[error("no output format selected; enable TIFF, PDF or both")]
    NoOutputFormatSelected,

    #[error("output directory {path} does not exist")]
    MissingOutputDir { path: PathBuf },

    #[error("output directory {path} is not writable: {source}")]
    OutputDirNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input file {path} does not exist")]
    MissingInputFile { path: PathBuf },

    #[error("page counts differ: {old_path} has {old} pages, {new_path} has {new}")]
    PageCountMismatch {
        old_path: PathBuf,
        new_path: PathBuf,
        old: usize,
        new: usize,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("page {page}: {source}")]
    Diff {
        page: usize,
        #[source]
        source: DiffError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    /// A panic caught at the job boundary. `backtrace` is the stack captured
    /// where the panic was raised, when the panic hook was able to record it.
    #[error("an unexpected error occurred: {message}")]
    Unexpected {
        message: String,
        backtrace: Option<String>,
    },
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::EmptySelection
            | JobError::CountMismatch { .. }
            | JobError::UnsupportedFormat { .. }
            | JobError::MixedFormat { .. }
            | JobError::NoOutputFormatSelected
            | JobError::MissingOutputDir { .. }
            | JobError::OutputDirNotWritable { .. }
            | JobError::MissingInputFile { .. } => ErrorKind::Validation,
            JobError::PageCountMismatch { .. } | JobError::Source(_) | JobError::Diff { .. } => {
                ErrorKind::PerPair
            }
            JobError::Write(_) => ErrorKind::Io,
            JobError::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// Whether the failure warrants a diagnostic dump in the output directory.
    pub fn wants_dump(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::Unexpected)
    }
}
