//! Transaction-Scoped Write Locking
//!
//! Short-lived exclusive advisory locks over a filesystem rendezvous, so
//! writers from multiple processes never mutate the embedded stores
//! simultaneously. Locks auto-expire: a holder that died or stalled past the
//! stale threshold is reclaimed before the next acquire attempt.
//!
//! Reads never take the lock.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Poll interval while waiting for the lock
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// LOCK MANAGER
// ============================================================================

/// Manages the write-lock file for one data directory.
#[derive(Debug, Clone)]
pub struct WriteLockManager {
    lock_path: PathBuf,
    /// Max time to wait for acquisition
    acquire_timeout: Duration,
    /// Locks older than this are stale
    stale_threshold: Duration,
}

/// A held write lock. Released explicitly or on drop.
#[derive(Debug)]
pub struct WriteLock {
    file: Option<File>,
    path: PathBuf,
}

/// Parsed holder info from a lock file (`<pid>|<utc-iso>`)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Observable lock state for status reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<LockHolder>,
    pub stale: bool,
}

impl WriteLockManager {
    pub fn new(lock_path: impl Into<PathBuf>, acquire_timeout: Duration, stale_threshold: Duration) -> Self {
        Self {
            lock_path: lock_path.into(),
            acquire_timeout,
            stale_threshold,
        }
    }

    /// Acquire the exclusive write lock, polling until the timeout elapses.
    ///
    /// Stale locks (dead holder PID or timestamp past the threshold) are
    /// cleared before each attempt.
    pub fn acquire_write(&self) -> Result<WriteLock> {
        self.acquire_write_with_timeout(self.acquire_timeout)
    }

    /// Acquire with an explicit timeout (refinery and migrations use a
    /// longer window).
    pub fn acquire_write_with_timeout(&self, timeout: Duration) -> Result<WriteLock> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        loop {
            if self.is_stale()? {
                self.clear_stale();
            }

            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&self.lock_path)?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    let mut file = file;
                    file.set_len(0)?;
                    writeln!(file, "{}|{}", std::process::id(), Utc::now().to_rfc3339())?;
                    file.flush()?;
                    debug!(path = %self.lock_path.display(), "write lock acquired");
                    return Ok(WriteLock {
                        file: Some(file),
                        path: self.lock_path.clone(),
                    });
                }
                Err(_) => {
                    if started.elapsed() >= timeout {
                        warn!(
                            path = %self.lock_path.display(),
                            waited_ms = started.elapsed().as_millis() as u64,
                            "write lock busy"
                        );
                        return Err(EngineError::Busy(timeout));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// Whether the current lock file is stale: held by a dead process, or
    /// older than the stale threshold, or unreadable.
    pub fn is_stale(&self) -> Result<bool> {
        if !self.lock_path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&self.lock_path)?;
        let content = content.trim();
        if content.is_empty() {
            // Released locks are truncated, not unlinked
            return Ok(false);
        }

        let Some(holder) = parse_holder(content) else {
            return Ok(true);
        };

        if !pid_alive(holder.pid) {
            info!(pid = holder.pid, "lock holder is dead, lock is stale");
            return Ok(true);
        }

        let age = Utc::now() - holder.acquired_at;
        if age.num_seconds() >= 0 && age.to_std().unwrap_or_default() > self.stale_threshold {
            info!(
                pid = holder.pid,
                age_secs = age.num_seconds(),
                "lock exceeded stale threshold"
            );
            return Ok(true);
        }

        Ok(false)
    }

    fn clear_stale(&self) {
        // Truncate rather than unlink so a concurrent acquire never races a
        // create/delete cycle.
        if let Ok(file) = OpenOptions::new().write(true).open(&self.lock_path) {
            if file.try_lock_exclusive().is_ok() {
                let _ = file.set_len(0);
                let _ = fs2::FileExt::unlock(&file);
                info!(path = %self.lock_path.display(), "cleared stale lock");
            }
        }
    }

    /// Observable lock state for the status tool.
    pub fn status(&self) -> LockStatus {
        let holder = std::fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|c| parse_holder(c.trim()));
        let stale = self.is_stale().unwrap_or(false);
        LockStatus {
            locked: holder.is_some() && !stale,
            holder,
            stale,
        }
    }
}

impl WriteLock {
    /// Release the lock: truncate the file (do not unlink) and unlock.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.set_len(0);
            let _ = fs2::FileExt::unlock(&file);
            debug!(path = %self.path.display(), "write lock released");
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn parse_holder(content: &str) -> Option<LockHolder> {
    let mut parts = content.splitn(2, '|');
    let pid: u32 = parts.next()?.trim().parse().ok()?;
    let acquired_at = DateTime::parse_from_rfc3339(parts.next()?.trim())
        .ok()?
        .with_timezone(&Utc);
    Some(LockHolder { pid, acquired_at })
}

/// Whether a PID is alive on this host.
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // Signal 0 probes existence; EPERM still means the process exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    // No cheap probe; the age check still reclaims stalled locks.
    true
}

// ============================================================================
// TESTS
// ============================================================================
