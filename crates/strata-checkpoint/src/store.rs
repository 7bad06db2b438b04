//! On-disk layout of a restart database and its atomic publish.
//!
//! ```text
//! <root>/restart/       canonical database, one rdb.<rank:08>.dat per rank
//! <root>/restart-tmp/   staging directory, filled by all ranks
//! <root>/restart-old/   previous canonical database while a publish runs
//! ```
//!
//! A database becomes visible only through a directory rename, so readers
//! see either the complete previous checkpoint or the complete new one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use strata_core::Rank;
use tracing::{debug, info, warn};

use crate::error::CheckpointError;

/// Name of the canonical restart directory.
pub const CANONICAL_DIR: &str = "restart";
/// Name of the staging directory.
pub const STAGING_DIR: &str = "restart-tmp";
/// Name of the retired directory used during publish.
pub const RETIRED_DIR: &str = "restart-old";

/// Paths and filesystem operations for one run directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Store rooted at the run directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The run directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical restart directory.
    pub fn canonical_dir(&self) -> PathBuf {
        self.root.join(CANONICAL_DIR)
    }

    /// Staging directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Retired directory.
    pub fn retired_dir(&self) -> PathBuf {
        self.root.join(RETIRED_DIR)
    }

    /// File name of `rank`'s checkpoint, e.g. `rdb.00000003.dat`.
    pub fn file_name(rank: Rank) -> String {
        format!("rdb.{:08}.dat", rank.0)
    }

    /// Whether a database is available, either canonical or left retired
    /// by an interrupted publish. Performs no writes.
    pub fn exists(&self) -> bool {
        self.canonical_dir().is_dir() || self.retired_dir().is_dir()
    }

    /// Restore the retired directory when a publish was interrupted between
    /// its two renames. Returns whether anything was recovered.
    ///
    /// Must be called by a single rank.
    pub fn recover_interrupted_publish(&self) -> Result<bool, CheckpointError> {
        let canonical = self.canonical_dir();
        let retired = self.retired_dir();
        if !retired.is_dir() {
            return Ok(false);
        }
        if canonical.is_dir() {
            // The new database is in place; only the cleanup was lost.
            fs::remove_dir_all(&retired).map_err(CheckpointError::fs("remove", &retired))?;
            debug!(path = %retired.display(), "removed stale retired checkpoint");
            return Ok(false);
        }
        fs::rename(&retired, &canonical).map_err(CheckpointError::fs("rename", &retired))?;
        warn!(
            path = %canonical.display(),
            "recovered checkpoint left retired by an interrupted publish"
        );
        Ok(true)
    }

    /// Remove any stale staging directory and create an empty one.
    ///
    /// Must be called by a single rank before the others write.
    pub fn prepare_staging(&self) -> Result<(), CheckpointError> {
        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(CheckpointError::fs("remove", &staging))?;
            debug!(path = %staging.display(), "removed stale staging directory");
        }
        fs::create_dir_all(&staging).map_err(CheckpointError::fs("create", &staging))?;
        Ok(())
    }

    /// Create `rank`'s file in the staging directory, hand it to `write`,
    /// then flush and fsync it. Returns the staged path.
    pub fn write_staged<F>(&self, rank: Rank, write: F) -> Result<PathBuf, CheckpointError>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<(), CheckpointError>,
    {
        let path = self.staging_dir().join(Self::file_name(rank));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(CheckpointError::fs("create", &path))?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush().map_err(CheckpointError::fs("flush", &path))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(CheckpointError::fs("sync", &path))?;
        Ok(path)
    }

    /// Swap the staging directory in as the canonical database.
    ///
    /// The previous canonical directory is renamed aside first and removed
    /// only after the new one is in place. Must be called by a single rank
    /// once every rank's staged file is durable.
    pub fn publish(&self) -> Result<(), CheckpointError> {
        let canonical = self.canonical_dir();
        let staging = self.staging_dir();
        let retired = self.retired_dir();

        if !staging.is_dir() {
            return Err(CheckpointError::Fs {
                op: "publish",
                path: staging,
                source: std::io::ErrorKind::NotFound.into(),
            });
        }
        if retired.exists() {
            fs::remove_dir_all(&retired).map_err(CheckpointError::fs("remove", &retired))?;
        }
        if canonical.exists() {
            fs::rename(&canonical, &retired).map_err(CheckpointError::fs("rename", &canonical))?;
        }
        fs::rename(&staging, &canonical).map_err(CheckpointError::fs("rename", &staging))?;
        if retired.exists() {
            fs::remove_dir_all(&retired).map_err(CheckpointError::fs("remove", &retired))?;
        }
        sync_dir(&self.root);
        info!(path = %canonical.display(), "published checkpoint");
        Ok(())
    }

    /// Remove the staging directory after a failed collective write.
    pub fn discard_staging(&self) -> Result<(), CheckpointError> {
        let staging = self.staging_dir();
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(CheckpointError::fs("remove", &staging))?;
        }
        Ok(())
    }

    /// Open `rank`'s file in the canonical directory.
    pub fn open(&self, rank: Rank) -> Result<BufReader<File>, CheckpointError> {
        let path = self.canonical_dir().join(Self::file_name(rank));
        let file = File::open(&path).map_err(CheckpointError::fs("open", &path))?;
        Ok(BufReader::new(file))
    }

    /// Write a standalone file through a temporary sibling and a rename.
    pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), CheckpointError>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<(), CheckpointError>,
    {
        let temp = path.with_extension("bin.tmp");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(CheckpointError::fs("create", &temp))?;
        let mut writer = BufWriter::new(file);
        if let Err(e) = write(&mut writer) {
            drop(writer);
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        writer.flush().map_err(CheckpointError::fs("flush", &temp))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(CheckpointError::fs("sync", &temp))?;
        fs::rename(&temp, path).map_err(CheckpointError::fs("rename", &temp))?;
        Ok(())
    }
}

/// Persist directory entries after a rename. Not every platform can open
/// a directory for syncing, so failures are ignored.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
