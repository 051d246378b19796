// imgcomp/src/config.rs

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::BackoffResolver;
use crate::pipeline::JobRequest;
use crate::source::PDF_PAGE_LIMIT;
use crate::writer::OutputFormats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default, deserialize_with = "deserialize_path_list")]
    pub old: Vec<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_path_list")]
    pub new: Vec<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub label_font: Option<PathBuf>,
    #[serde(default)]
    pub pdfium_library_dir: Option<PathBuf>,
    #[serde(default)]
    pub lock_retry: LockRetrySection,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

fn default_page_limit() -> usize {
    PDF_PAGE_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_true")]
    pub tiff: bool,
    #[serde(default)]
    pub pdf: bool,
}

fn default_true() -> bool {
    true
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            tiff: true,
            pdf: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRetrySection {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
}

impl Default for LockRetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
        }
    }
}

impl LockRetrySection {
    pub fn resolver(&self) -> BackoffResolver {
        BackoffResolver {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }
}

/// Splits a legacy comma-joined entry (`"a.tif,b.tif"`) into separate paths.
pub fn split_joined_paths(joined: &str) -> Vec<PathBuf> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// A path list is either a sequence, taken verbatim, or one comma-joined
/// string. Commas inside sequence elements belong to the file name.
fn deserialize_path_list<'de, D>(deserializer: D) -> Result<Vec<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PathList {
        Joined(String),
        List(Vec<PathBuf>),
    }

    Ok(match PathList::deserialize(deserializer)? {
        PathList::Joined(joined) => split_joined_paths(&joined),
        PathList::List(paths) => paths,
    })
}

impl JobConfig {
    pub fn trace_loaded(&self) {
        info!(
            output_dir = %self.output_dir.display(),
            old_count = self.old.len(),
            new_count = self.new.len(),
            tiff = self.output.tiff,
            pdf = self.output.pdf,
            "Loaded JobConfig"
        );
        debug!(?self, "JobConfig loaded (full debug)");
    }

    pub fn formats(&self) -> OutputFormats {
        OutputFormats {
            tiff: self.output.tiff,
            pdf: self.output.pdf,
        }
    }

    pub fn to_request(&self) -> JobRequest {
        JobRequest {
            old_paths: self.old.clone(),
            new_paths: self.new.clone(),
            output_dir: self.output_dir.clone(),
            formats: self.formats(),
        }
    }
}
