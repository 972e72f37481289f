//! Exclusive ownership of a data directory.
//!
//! Every manager that may write holds `<data_dir>/harvester.lock` with an
//! advisory `flock` for its whole lifetime. The lock is released when the
//! file is closed, including when the process dies.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

const LOCK_FILE: &str = "harvester.lock";

#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
    _file: File,
}

impl DataDirLock {
    /// Takes the lock without waiting. Fails with [`StoreError::Locked`]
    /// when another manager holds it.
    pub fn acquire(data_directory: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_directory).map_err(|e| StoreError::Io {
            path: data_directory.to_path_buf(),
            source: e,
        })?;

        let path = data_directory.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;

        try_lock(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                StoreError::Locked(data_directory.to_path_buf())
            } else {
                StoreError::Io {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;

        // Owner pid, for humans inspecting the directory
        let written = file
            .set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()));
        if let Err(e) = written {
            log::debug!("Could not record owner in {}: {}", path.display(), e);
        }

        log::debug!("Locked data directory {}", data_directory.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
