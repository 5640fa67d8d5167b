use std::path::Path;

use pidlock::Pidlock;
use thiserror::Error;

/// Errors raised while taking the run lock
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock file could not be created or inspected
    #[error("Failed to acquire run lock: {0}")]
    Acquire(String),
}

/// RAII guard over a PID lock file that keeps overlapping passes apart.
///
/// Locks left behind by dead processes are reclaimed.
pub struct RunLock(Pidlock);

impl RunLock {
    /// Try to take the lock at `path`.
    ///
    /// Returns `Ok(None)` without waiting when a live process holds it.
    pub fn acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let path = path
            .to_str()
            .ok_or_else(|| LockError::Acquire("Lock path is not valid UTF-8".to_string()))?;

        let mut lock = Pidlock::new(path);

        loop {
            match lock.acquire() {
                Ok(()) => return Ok(Some(Self(lock))),
                Err(pidlock::PidlockError::LockExists) => match lock.get_owner() {
                    Some(pid) => {
                        tracing::info!(pid, path, "run lock is held");
                        return Ok(None);
                    }
                    // get_owner() clears locks of dead processes
                    None => {}
                },
                Err(error) => return Err(LockError::Acquire(format!("{error:?}"))),
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.0.release();
    }
}
