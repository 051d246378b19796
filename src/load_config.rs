/// `load_config` module: loads a job file (YAML, or JSON by extension) into a [`JobConfig`]
/// and applies environment overrides.
///
/// # Responsibilities
/// - Parse user-supplied job files into the strongly-typed [`JobConfig`]
/// - Apply environment overrides for machine-specific paths:
///   `IMGCOMP_LABEL_FONT` and `IMGCOMP_PDFIUM_DIR`
/// - Produce clear diagnostics: any failure names the file and the cause
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::JobConfig;

pub const LABEL_FONT_ENV: &str = "IMGCOMP_LABEL_FONT";
pub const PDFIUM_DIR_ENV: &str = "IMGCOMP_PDFIUM_DIR";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<JobConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading job configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let is_json = path_ref
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let parsed = if is_json {
        serde_json::from_str::<JobConfig>(&config_content).map_err(anyhow::Error::from)
    } else {
        serde_yaml::from_str::<JobConfig>(&config_content).map_err(anyhow::Error::from)
    };
    let mut config = match parsed {
        Ok(conf) => {
            info!(config_path = ?path_ref, json = is_json, "Parsed job config successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse job config");
            return Err(anyhow::anyhow!("Failed to parse job config {:?}: {e}", path_ref));
        }
    };

    apply_env_overrides(&mut config);
    config.trace_loaded();
    Ok(config)
}

/// Environment variables win over values from the file.
pub fn apply_env_overrides(config: &mut JobConfig) {
    if let Ok(font) = std::env::var(LABEL_FONT_ENV) {
        info!(font = %font, "{LABEL_FONT_ENV} found in env");
        config.label_font = Some(PathBuf::from(font));
    }
    if let Ok(dir) = std::env::var(PDFIUM_DIR_ENV) {
        info!(dir = %dir, "{PDFIUM_DIR_ENV} found in env");
        config.pdfium_library_dir = Some(PathBuf::from(dir));
    }
}
