//! Singleton lease for endpoint ownership.
//!
//! At most one process may listen on a given endpoint name. Ownership is
//! enforced by an exclusive advisory lock on the endpoint's lock file,
//! taken non-blocking exactly once at startup. The OS releases the lock
//! when the holding process exits, however it exits. The lock itself, not
//! the lock file's existence, is the source of truth for "a server is
//! running".
//!
//! The lock file carries the holder's pid and endpoint name as JSON so
//! status tooling can report who is serving. A file left behind by a
//! crashed server is not an obstacle: its lock is gone, so the next
//! acquisition succeeds and overwrites it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointName;
use crate::error::{Result, ServerError};

/// Metadata written under the lease lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInfo {
    /// Pid of the process holding the lease.
    pub pid: u32,
    /// Endpoint name the lease covers.
    pub endpoint: String,
}

/// Exclusive ownership of an endpoint name for the life of one server
/// process.
///
/// Acquired once via [`SingletonLease::try_acquire`]; released exactly once
/// when dropped, on every exit path. Never retried: contention means
/// another server owns the endpoint, and any other lock failure is fatal.
#[derive(Debug)]
pub struct SingletonLease {
    /// Path to the lock file.
    path: PathBuf,
    /// File handle (kept open to maintain the lock).
    file: File,
    /// Metadata written under the lock.
    info: LeaseInfo,
}

impl SingletonLease {
    /// Try to acquire the lease for an endpoint.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyHeld`] if another process holds the lock;
    /// [`ServerError::Io`] for any other failure manipulating the lock
    /// file (these are fatal to startup and must not be retried).
    pub fn try_acquire(endpoint: &EndpointName) -> Result<Self> {
        let path = endpoint.lock_path();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                // Lock acquired: either a fresh file or a stale one from a
                // crashed server. Overwrite with our own metadata.
                let info = LeaseInfo {
                    pid: std::process::id(),
                    endpoint: endpoint.as_str().to_string(),
                };
                write_info(&mut file, &info)?;
                tracing::debug!(endpoint = %endpoint, pid = info.pid, "lease acquired");

                Ok(Self { path, file, info })
            }
            Err(e) if is_contended(&e) => {
                tracing::debug!(endpoint = %endpoint, "lease already held");
                Err(ServerError::AlreadyHeld(endpoint.as_str().to_string()))
            }
            Err(e) => Err(ServerError::Io(e)),
        }
    }

    /// Metadata written under this lease.
    pub fn info(&self) -> &LeaseInfo {
        &self.info
    }

    /// Path to the lock file backing this lease.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read the current holder's metadata without acquiring the lease.
    ///
    /// Returns `None` when no process holds the lease: the lock file is
    /// missing, or it exists but its lock is free (stale leftover from a
    /// crash).
    pub fn read_info(endpoint: &EndpointName) -> Result<Option<LeaseInfo>> {
        let path = endpoint.lock_path();

        let mut file = match OpenOptions::new().read(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ServerError::Io(e)),
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                // Lock was free: stale file, nobody is serving.
                file.unlock()?;
                Ok(None)
            }
            Err(e) if is_contended(&e) => Ok(read_info_from(&mut file)),
            Err(e) => Err(ServerError::Io(e)),
        }
    }

    /// Whether some other process currently holds the lease.
    pub fn is_held_elsewhere(endpoint: &EndpointName) -> Result<bool> {
        Ok(Self::read_info(endpoint)?.is_some())
    }
}

impl Drop for SingletonLease {
    fn drop(&mut self) {
        // Release the lock before removing the file so a competing starter
        // never sees a locked-but-doomed file.
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to unlock lease file");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            // Removal can fail on Windows while another handle is open;
            // the free lock already marks the file as stale.
            tracing::debug!(path = %self.path.display(), error = %e, "failed to remove lease file");
        }
        tracing::debug!(endpoint = %self.info.endpoint, "lease released");
    }
}

/// Whether a lock error means "held by someone else" as opposed to a real
/// I/O failure.
fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Rewrite the lock file's contents in place: seek to start, write, then
/// truncate to the new length. Never truncate-on-open, which would blank
/// the file before the new contents land.
fn write_info(file: &mut File, info: &LeaseInfo) -> Result<()> {
    let json = serde_json::to_string(info)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.set_len(json.len() as u64)?;
    file.flush()?;
    Ok(())
}

fn read_info_from(file: &mut File) -> Option<LeaseInfo> {
    let mut contents = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut contents).ok()?;
    serde_json::from_str(&contents).ok()
}
