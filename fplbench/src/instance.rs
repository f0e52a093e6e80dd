//! Instance materialization
//!
//! Each generated formula is written to its own file,
//! `instance_<id>.<ext>`, inside the experiment output directory. The files
//! are the solver's input and are left on disk after the run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default instance file extension
pub const DEFAULT_EXTENSION: &str = "fpl";

/// Error type for instance materialization
#[derive(Error, Debug)]
pub enum InstanceError {
    /// IO error while writing an instance
    #[error("Failed to write instance {path}: {source}")]
    Write {
        /// Target path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
    /// IO error while preparing the output directory
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

/// Result type for instance operations
pub type InstanceResult<T> = Result<T, InstanceError>;

/// A materialized benchmark instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance id
    pub id: u64,
    /// Path of the written file
    pub path: PathBuf,
    /// Size of the formula text in bytes (without the trailing newline)
    pub formula_len: usize,
}

/// Writer for instance files in one output directory
#[derive(Debug, Clone)]
pub struct InstanceWriter {
    output_dir: PathBuf,
    extension: String,
}

impl InstanceWriter {
    /// Create a writer for the given output directory
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Set the file extension (without the leading dot)
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Output directory
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory if it does not exist
    pub fn ensure_dir(&self) -> InstanceResult<()> {
        fs::create_dir_all(&self.output_dir).map_err(|source| InstanceError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })
    }

    /// Path of the file for instance `id`
    #[must_use]
    pub fn path_for(&self, id: u64) -> PathBuf {
        self.output_dir
            .join(format!("instance_{}.{}", id, self.extension))
    }

    /// Write `formula` followed by a newline to the file for instance `id`
    pub fn write(&self, id: u64, formula: &str) -> InstanceResult<Instance> {
        let path = self.path_for(id);
        let mut content = String::with_capacity(formula.len() + 1);
        content.push_str(formula);
        content.push('\n');

        fs::write(&path, content).map_err(|source| InstanceError::Write {
            path: path.clone(),
            source,
        })?;

        debug!("Wrote instance {} ({} bytes) to {}", id, formula.len(), path.display());

        Ok(Instance {
            id,
            path,
            formula_len: formula.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_path_for() {
        let writer = InstanceWriter::new("/tmp/exp").with_extension(".fpl");
        assert_eq!(writer.path_for(17), PathBuf::from("/tmp/exp/instance_17.fpl"));
    }

    #[test]
    fn test_write_instance() {
        let dir = tempdir().unwrap();
        let writer = InstanceWriter::new(dir.path());

        let instance = writer.write(3, "(P(X1) ∧ P(X2))").unwrap();
        assert_eq!(instance.id, 3);
        assert_eq!(instance.path, dir.path().join("instance_3.fpl"));

        let content = fs::read_to_string(&instance.path).unwrap();
        assert_eq!(content, "(P(X1) ∧ P(X2))\n");
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let writer = InstanceWriter::new(dir.path().join("missing"));
        let err = writer.write(1, "X1").unwrap_err();
        assert!(matches!(err, InstanceError::Write { .. }));

        writer.ensure_dir().unwrap();
        assert!(writer.write(1, "X1").is_ok());
    }
}
