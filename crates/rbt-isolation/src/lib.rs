//! Single-instance run lock.
//!
//! Only one orchestrator process may hold the trading loop at a time; a
//! second launch must refuse to start rather than double-submit orders
//! against the same account. The lock file holds the owning PID and its own
//! mtime doubles as a liveness clock: a lock older than `stale_minutes` is
//! assumed to belong to a process that crashed without releasing it and is
//! removed before the next acquire attempt.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration as StdDuration, SystemTime};

use anyhow::{bail, Context, Result};
use chrono::Duration;

const DEFAULT_STALE_MINUTES: i64 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const RETRY_INTERVAL: StdDuration = StdDuration::from_secs(1);

pub struct RunLock {
    path: PathBuf,
    stale_minutes: i64,
}

pub struct RunLockGuard {
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), stale_minutes: DEFAULT_STALE_MINUTES }
    }

    pub fn with_stale_minutes(mut self, minutes: i64) -> Self {
        self.stale_minutes = minutes;
        self
    }

    /// Blocks up to `timeout`, retrying once a second. Returns the guard
    /// once the lock file is created; the file is removed when the guard
    /// drops.
    pub fn acquire(&self, timeout: StdDuration) -> Result<RunLockGuard> {
        let deadline = SystemTime::now() + timeout;
        loop {
            match self.try_create() {
                Ok(()) => return Ok(RunLockGuard { path: self.path.clone() }),
                Err(_) if self.is_stale()? => {
                    self.remove_stale()?;
                    continue;
                }
                Err(_) => {
                    if SystemTime::now() >= deadline {
                        bail!("timed out waiting for run lock at {}", self.path.display());
                    }
                    sleep(RETRY_INTERVAL);
                }
            }
        }
    }

    pub fn acquire_default(&self) -> Result<RunLockGuard> {
        self.acquire(StdDuration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    fn try_create(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let mut file = OpenOptions::new().write(true).create_new(true).open(&self.path)?;
        write!(file, "{}", std::process::id())
    }

    fn is_stale(&self) -> Result<bool> {
        is_lock_stale(&self.path, self.stale_minutes)
    }

    fn remove_stale(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("removing stale run lock"),
        }
    }
}

fn is_lock_stale(path: &Path, stale_minutes: i64) -> Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).context("reading run lock metadata"),
    };
    let modified = metadata.modified().context("run lock has no mtime")?;
    let age = SystemTime::now().duration_since(modified).unwrap_or(StdDuration::ZERO);
    let age = Duration::from_std(age).unwrap_or(Duration::zero());
    Ok(age > Duration::minutes(stale_minutes))
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_fast_while_first_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        let lock = RunLock::new(&path);
        let guard = lock.acquire(StdDuration::from_secs(1)).unwrap();

        let contender = RunLock::new(&path);
        let result = contender.acquire(StdDuration::from_secs(1));
        assert!(result.is_err());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn releasing_the_guard_lets_a_new_acquire_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        let lock = RunLock::new(&path);

        {
            let _guard = lock.acquire(StdDuration::from_secs(1)).unwrap();
        }

        let second = RunLock::new(&path).acquire(StdDuration::from_secs(1));
        assert!(second.is_ok());
    }

    #[test]
    fn a_stale_lock_is_reclaimed_instead_of_blocking_forever() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        fs::write(&path, "99999").unwrap();

        let ancient = SystemTime::now() - StdDuration::from_secs(20 * 60);
        let file = fs::File::open(&path).unwrap();
        file.set_modified(ancient).unwrap();

        let lock = RunLock::new(&path).with_stale_minutes(10);
        let result = lock.acquire(StdDuration::from_secs(2));
        assert!(result.is_ok());
    }

    #[test]
    fn a_fresh_lock_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        fs::write(&path, "123").unwrap();
        assert!(!is_lock_stale(&path, 10).unwrap());
    }
}
