#![doc = "imgcomp: page-wise visual diff of multi-page technical drawings."]

//! Two revisions of a drawing set (multi-frame TIFF stacks, or PDFs rendered
//! to page images) are compared page by page. Content only in the old
//! revision is painted red, content only in the new revision blue, and
//! everything else stays grayscale. Each file pair produces
//! `Output_<new name>.tif` and/or `.pdf`.
//!
//! # Usage
//! Build a [`pipeline::DiffPipeline`] from a [`source::PageLoader`], a
//! [`differ::PageDiffer`] and a [`writer::OutputWriter`], then call
//! [`pipeline::DiffPipeline::execute`] with a [`pipeline::JobRequest`], a
//! progress sink and a cancellation token. The `imgcomp` binary does this
//! from command-line flags or a job file.

pub mod cli;
pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod differ;
pub mod error;
pub mod label;
pub mod load_config;
pub mod pipeline;
pub mod raster;
pub mod source;
pub mod writer;
