use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::services::identity::{extract_identity, Identity};

/// One stored submission. The source text never changes after it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) identity: Identity,
    pub(crate) sha256: String,
    pub(crate) size_bytes: u64,
}

impl Submission {
    pub(crate) fn new(id: String, source: String) -> Self {
        let sha256 = hex::encode(Sha256::digest(source.as_bytes()));
        let identity = extract_identity(&source);
        let size_bytes = source.len() as u64;
        Self { id, source, identity, sha256, size_bytes }
    }
}

fn write_batch(dir: &Path, submissions: &[Submission]) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    fs::create_dir_all(dir)?;
    for submission in submissions {
        fs::write(dir.join(&submission.id), submission.source.as_bytes())?;
    }
    Ok(())
}

/// Current batch of one session, mirrored into a scratch directory.
#[derive(Debug)]
pub(crate) struct SubmissionStore {
    dir: PathBuf,
    entries: BTreeMap<String, Submission>,
}

impl SubmissionStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir, entries: BTreeMap::new() }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the new set into a staging directory and swaps it in. If staging fails the
    /// previous batch is left untouched on disk and in memory.
    pub(crate) fn replace(&mut self, submissions: Vec<Submission>) -> io::Result<()> {
        let staging = self.staging_dir();
        if let Err(err) = write_batch(&staging, &submissions) {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        self.clear()?;
        if let Err(err) = fs::rename(&staging, &self.dir) {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }
        self.entries = submissions
            .into_iter()
            .map(|submission| (submission.id.clone(), submission))
            .collect();

        tracing::debug!(dir = %self.dir.display(), count = self.entries.len(), "Stored batch");
        Ok(())
    }

    fn staging_dir(&self) -> PathBuf {
        let name = self.dir.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
        self.dir.with_file_name(format!(".{name}.staging"))
    }

    pub(crate) fn clear(&mut self) -> io::Result<()> {
        self.entries.clear();
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Submission> {
        self.entries.get(id)
    }

    /// Identifiers in sorted-name order.
    pub(crate) fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Reduces an uploaded filename to a safe storage key.
pub(crate) fn sanitized_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let sanitized: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized.to_string()
    }
}
