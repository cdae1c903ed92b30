//! Single-instance guard next to the mapping database.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{io_err, DaemonError};

/// `<database>.lock`, alongside the database file.
pub fn lock_path(database: &Path) -> PathBuf {
    let mut name = database
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "tandem".into());
    name.push(".lock");
    database.with_file_name(name)
}

/// Exclusive advisory lock held for the life of a sync process.
///
/// Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock for `database`, failing fast if another process has it.
    pub fn acquire(database: &Path) -> Result<Self, DaemonError> {
        let path = lock_path(database);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;

        if let Err(err) = file.try_lock_exclusive() {
            let contended = err.kind() == ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            return Err(if contended {
                DaemonError::AlreadyRunning { lock: path }
            } else {
                io_err(&path, err)
            });
        }

        file.set_len(0).map_err(|e| io_err(&path, e))?;
        write!(file, "{}", std::process::id()).map_err(|e| io_err(&path, e))?;
        tracing::debug!(lock = %path.display(), "acquired instance lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
