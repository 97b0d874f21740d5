use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::error::LogResult;

/// Segment files are named `raft.log.<version>`.
pub const BASE_FILE_NAME: &str = "raft.log.";

#[derive(Debug, Clone)]
pub struct FileNames {
    dir: PathBuf,
}

impl FileNames {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for_version(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{}{}", BASE_FILE_NAME, version))
    }

    /// Parse the version out of a file name. Only plain decimal suffixes
    /// without leading zeros are accepted.
    pub fn parse_version(file_name: &str) -> Option<u64> {
        let suffix = file_name.strip_prefix(BASE_FILE_NAME)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if suffix.len() > 1 && suffix.starts_with('0') {
            return None;
        }
        suffix.parse().ok()
    }

    /// All segment files in the directory, keyed by version. Anything else is
    /// logged and ignored.
    pub fn list(&self) -> LogResult<BTreeMap<u64, PathBuf>> {
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let version = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Self::parse_version);
            match version {
                Some(version) if path.is_file() => {
                    files.insert(version, path);
                }
                _ => warn!("Ignoring unexpected file in raft log directory: {:?}", path),
            }
        }
        Ok(files)
    }
}
