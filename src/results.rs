//! Append-only behavior log: one JSON line per trial.
//!
//! One file per phase run, named with a timestamp so re-runs never
//! clobber earlier data. Rows are flushed as they are written — a crash
//! mid-phase loses at most the in-flight trial.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::error::Result;
use crate::types::{ParticipantId, Phase, TrialRecord};

/// Append-only writer for one phase run's trial records.
pub struct ResultsLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ResultsLog {
    /// Create the log file for a phase run under `dir`.
    pub fn create(dir: &Path, participant_id: ParticipantId, phase: Phase) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let stem = format!("subject_{participant_id}_{}_{timestamp}", phase.as_str());
        // Same participant, phase, and second: suffix a run counter.
        let (path, file) = (0u32..)
            .find_map(|attempt| {
                let path = if attempt == 0 {
                    dir.join(format!("{stem}.jsonl"))
                } else {
                    dir.join(format!("{stem}_{attempt}.jsonl"))
                };
                match fs::OpenOptions::new().create_new(true).append(true).open(&path) {
                    Ok(file) => Some(Ok((path, file))),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .expect("unbounded counter always terminates")?;
        let writer = BufWriter::new(file);
        info!(participant_id, %phase, path = %path.display(), "opened behavior log");
        Ok(ResultsLog { path, writer })
    }

    /// Append one trial record and flush it to disk.
    pub fn append(&mut self, record: &TrialRecord) -> Result<()> {
        let line = serde_json::to_string(record).expect("trial records serialize infallibly");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
