//! Decision journal: JSONL append-only record of every cycle.
//!
//! Each line is an independent JSON object, so a partial write costs at most
//! one record and the file can be streamed.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::JournalError;

pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open for appending, creating the file and its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<(), JournalError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{json}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// Read every record back. Malformed lines are skipped with a warning.
pub fn read_journal<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, JournalError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "skipping malformed journal line"),
        }
    }
    Ok(records)
}
