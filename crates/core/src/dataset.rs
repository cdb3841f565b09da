//! Dataset output writer.
//!
//! Conflict/resolution pairs are appended to one file per mined commit or
//! patch, as fenced text blocks:
//!
//! ````text
//! ```conflict:<file-path>
//! <raw lines including conflict markers and margins>
//! ```
//! ```resolution:<file-path>
//! <resolved lines, or the literal text "NOT FOUND">
//! ```
//! ````
//!
//! Each pair is rendered to a single string and appended with one write
//! call, so the dataset never holds a partially-written record.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::DatasetError;
use crate::extract::ConflictSection;
use crate::locate::{ResolutionRecord, NOT_FOUND_SENTINEL};

/// Append-only writer for one mined item's conflict records.
#[derive(Debug)]
pub struct DatasetWriter {
    path: PathBuf,
}

impl DatasetWriter {
    /// Create (truncating any previous run's file) the dataset file
    /// `<file_stem>.conflict` under `output_dir`.
    pub fn create(output_dir: &Path, file_stem: &str) -> Result<Self, DatasetError> {
        std::fs::create_dir_all(output_dir).map_err(|e| DatasetError::OutputDirError {
            path: output_dir.display().to_string(),
            detail: e.to_string(),
        })?;

        let path = output_dir.join(format!("{}.conflict", file_stem));
        std::fs::write(&path, b"")?;
        info!(path = %path.display(), "created dataset file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one conflict/resolution pair.
    pub fn append(
        &self,
        conflict_file: &str,
        section: &ConflictSection,
        record: &ResolutionRecord,
    ) -> Result<(), DatasetError> {
        let block = render_block(conflict_file, section, record);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)?;
        file.write_all(block.as_bytes())?;

        debug!(
            path = %self.path.display(),
            conflict_file,
            found = record.is_found(),
            "appended record"
        );
        Ok(())
    }
}

fn render_block(conflict_file: &str, section: &ConflictSection, record: &ResolutionRecord) -> String {
    let mut block = String::new();

    block.push_str(&format!("```conflict:{}\n", conflict_file));
    for line in &section.lines {
        block.push_str(line);
        block.push('\n');
    }
    block.push_str("```\n");

    block.push_str(&format!("```resolution:{}\n", conflict_file));
    match &record.resolved {
        Some(lines) => {
            for line in lines {
                block.push_str(line);
                block.push('\n');
            }
        }
        None => {
            block.push_str(NOT_FOUND_SENTINEL);
            block.push('\n');
        }
    }
    block.push_str("```\n");

    block
}
