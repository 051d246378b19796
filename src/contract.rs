#![allow(unused)]

//! # contract: seams between the comparison core and its callers
//!
//! The pipeline never talks to a UI, a PDF engine or a user prompt directly.
//! It goes through the traits below, which are implemented by real
//! components (pdfium, a progress channel, a backoff policy) and by
//! `mockall` mocks in tests.
//!
//! ## Cancellation
//! [`CancellationToken`] is cooperative. The pipeline polls it before each
//! file pair and before each page; rasterising, decoding and writing in
//! flight are never interrupted.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use mockall::{automock, predicate::*};

use crate::error::SourceError;

/// Shared, cloneable cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One human-readable step of a running job, emitted in process order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Loading,
    Page {
        file: usize,
        files: usize,
        page: usize,
        pages: usize,
    },
    Saving,
    Saved,
    Completed,
    Cancelled,
    Failed(String),
}

impl ProgressEvent {
    /// True for the event that closes a job's progress stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed | ProgressEvent::Cancelled | ProgressEvent::Failed(_)
        )
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Loading => write!(f, "loading files..."),
            ProgressEvent::Page {
                file,
                files,
                page,
                pages,
            } => write!(f, "file {file}/{files}, page {page}/{pages} processing"),
            ProgressEvent::Saving => write!(f, "saving output..."),
            ProgressEvent::Saved => write!(f, "saved."),
            ProgressEvent::Completed => write!(f, "completed successfully"),
            ProgressEvent::Cancelled => write!(f, "cancelled midway"),
            ProgressEvent::Failed(message) => write!(f, "{message}"),
        }
    }
}

/// Receiver of progress events. Implementations must preserve call order.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl ProgressSink for tokio::sync::mpsc::UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // A closed receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Sink that drops every event, for callers that only want the result.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Renders the pages of a paged document (PDF) to raster images.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document, without rendering them.
    fn page_count(&self, path: &Path) -> Result<usize, SourceError>;

    /// Render every page, in order, at `dpi` dots per inch.
    fn render(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, SourceError>;
}

/// What to do when a destination file is held by another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    Retry,
    Abort,
}

/// Policy consulted each time a destination is found locked.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait LockResolver: Send + Sync {
    /// `attempt` starts at 1 for the first failed lock check.
    fn on_locked(&self, path: &Path, attempt: u32) -> LockDecision;
}

/// Headless lock policy: bounded retries with exponential backoff, then abort.
#[derive(Debug, Clone)]
pub struct BackoffResolver {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for BackoffResolver {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl LockResolver for BackoffResolver {
    fn on_locked(&self, path: &Path, attempt: u32) -> LockDecision {
        if attempt > self.max_retries {
            tracing::warn!(path = %path.display(), attempt, "[SAVE] Destination still locked, giving up");
            return LockDecision::Abort;
        }
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        tracing::warn!(
            path = %path.display(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "[SAVE] Destination locked, retrying after backoff"
        );
        std::thread::sleep(delay);
        LockDecision::Retry
    }
}
