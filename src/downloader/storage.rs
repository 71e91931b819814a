// Working directory handle and temp-file naming
//
// Every job writes exactly one `file_{job_id}.{ext}` entry into the root.
// Jobs never share a path, so nothing here locks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Extensions treated as temporary artifacts by the startup sweep.
pub const TEMP_EXTENSIONS: [&str; 2] = ["mp4", "mp3"];

const TEMP_PREFIX: &str = "file_";

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory when missing and pin it to an absolute path.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self::new(fs::canonicalize(root)?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name prefix shared by everything a job writes.
    pub fn job_prefix(job_id: &str) -> String {
        format!("{}{}.", TEMP_PREFIX, job_id)
    }

    pub fn artifact_path(&self, job_id: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{}{}", Self::job_prefix(job_id), ext))
    }

    /// yt-dlp output template letting the engine pick the final extension.
    pub fn output_template(&self, job_id: &str) -> PathBuf {
        self.artifact_path(job_id, "%(ext)s")
    }

    /// All entries whose name begins with `file_{job_id}.`, sorted.
    pub fn job_entries(&self, job_id: &str) -> io::Result<Vec<PathBuf>> {
        let prefix = Self::job_prefix(job_id);
        self.entries_where(|name| name.starts_with(&prefix))
    }

    /// Entries matching `file_*.mp4` or `file_*.mp3`, sorted.
    pub fn temp_files(&self) -> io::Result<Vec<PathBuf>> {
        self.entries_where(is_temp_name)
    }

    fn entries_where(&self, keep: impl Fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_str().map_or(false, &keep) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Remove every entry of a job. Returns how many were removed.
    pub fn purge_job(&self, job_id: &str) -> usize {
        match self.job_entries(job_id) {
            Ok(entries) => entries.iter().filter(|p| remove_quietly(p)).count(),
            Err(e) => {
                debug!(job_id, error = %e, "could not list job entries");
                0
            }
        }
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
        && TEMP_EXTENSIONS.iter().any(|ext| {
            name.len() > TEMP_PREFIX.len() + ext.len()
                && name.ends_with(ext)
                && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
        })
}

/// Delete a file, swallowing every error. Returns true when something was
/// actually removed.
pub fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "cleanup failed");
            }
            false
        }
    }
}
