use crate::config::schema::{PlanConfig, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read patch plan from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse patch plan TOML{}: {source}", located(.path))]
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },

    #[error("invalid patch plan{}: {source}", located(.path))]
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },

    #[error("failed to scan plan directory {}: {source}", .dir.display())]
    Scan {
        dir: PathBuf,
        source: walkdir::Error,
    },
}

fn located(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" ({})", p.display()))
        .unwrap_or_default()
}

impl ConfigError {
    fn at(self, file: &Path) -> Self {
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(file.to_path_buf()),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(file.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

/// Parse and validate a plan from TOML text.
pub fn load_from_str(input: &str) -> Result<PlanConfig, ConfigError> {
    let config: PlanConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PlanConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.at(path))
}

/// Collect `*.toml` plan files from the first candidate directory that has any.
///
/// Only the top level of each directory is scanned. Files come back sorted by
/// path, which is the order plans are meant to run in. Returns an empty list
/// when no candidate holds a plan.
pub fn discover_plan_files<I, P>(candidate_dirs: I) -> Result<Vec<PathBuf>, ConfigError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for dir in candidate_dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).max_depth(1) {
            let entry = entry.map_err(|source| ConfigError::Scan {
                dir: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.into_path());
            }
        }

        if !files.is_empty() {
            files.sort();
            return Ok(files);
        }
    }

    Ok(Vec::new())
}
