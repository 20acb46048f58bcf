//! Process-lifetime wake lock.
//!
//! A [`WakeGuard`] acquires on construction and releases exactly once when
//! dropped, so the lock is held for as long as the guard lives.

use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{GeotrailError, Result};

/// Keeps the host from sleeping while held
pub trait WakeLock: Send {
    /// Takes the lock; fails if it is already held
    fn acquire(&mut self) -> Result<()>;

    /// Drops the lock; a no-op when not held
    fn release(&mut self);

    fn is_held(&self) -> bool;
}

/// Wake lock backed by a `systemd-inhibit` child process
///
/// The inhibitor lives as long as the child does.
pub struct InhibitorLock {
    who: String,
    why: String,
    child: Option<Child>,
}

impl InhibitorLock {
    pub fn new(who: impl Into<String>, why: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            why: why.into(),
            child: None,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new("systemd-inhibit");
        command
            .arg("--what=sleep:idle")
            .arg(format!("--who={}", self.who))
            .arg(format!("--why={}", self.why))
            .arg("--mode=block")
            .args(["sleep", "infinity"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl WakeLock for InhibitorLock {
    fn acquire(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(GeotrailError::WakeLock("wake lock already held".to_string()));
        }

        let child = self
            .command()
            .spawn()
            .map_err(|e| GeotrailError::WakeLock(format!("systemd-inhibit: {}", e)))?;
        info!("Wake lock acquired (pid {})", child.id());
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.kill() {
            warn!("Failed to stop inhibitor: {}", e);
        }
        // Reap so no zombie is left behind
        let _ = child.wait();
        info!("Wake lock released");
    }

    fn is_held(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for InhibitorLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Wake lock that does nothing, for hosts without an inhibitor
#[derive(Debug, Default)]
pub struct NoopWakeLock {
    held: bool,
}

impl WakeLock for NoopWakeLock {
    fn acquire(&mut self) -> Result<()> {
        if self.held {
            return Err(GeotrailError::WakeLock("wake lock already held".to_string()));
        }
        debug!("Wake lock disabled; not inhibiting sleep");
        self.held = true;
        Ok(())
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// Holds a wake lock until dropped
pub struct WakeGuard {
    lock: Box<dyn WakeLock>,
}

impl WakeGuard {
    /// Acquires `lock` and wraps it
    ///
    /// # Errors
    ///
    /// Returns the lock's acquisition error.
    pub fn acquire(mut lock: Box<dyn WakeLock>) -> Result<Self> {
        lock.acquire()?;
        Ok(Self { lock })
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_held()
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        if self.lock.is_held() {
            self.lock.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts releases so tests can check the guard releases once
    struct CountingLock {
        held: bool,
        releases: Arc<AtomicUsize>,
    }

    impl WakeLock for CountingLock {
        fn acquire(&mut self) -> Result<()> {
            if self.held {
                return Err(GeotrailError::WakeLock("already held".to_string()));
            }
            self.held = true;
            Ok(())
        }

        fn release(&mut self) {
            if self.held {
                self.held = false;
                self.releases.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn is_held(&self) -> bool {
            self.held
        }
    }

    #[test]
    fn test_guard_releases_once_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        let lock = CountingLock {
            held: false,
            releases: Arc::clone(&releases),
        };

        let guard = WakeGuard::acquire(Box::new(lock)).unwrap();
        assert!(guard.is_held());
        assert_eq!(releases.load(Ordering::SeqCst), 0);

        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_propagates_acquire_failure() {
        let lock = CountingLock {
            held: true,
            releases: Arc::new(AtomicUsize::new(0)),
        };

        let result = WakeGuard::acquire(Box::new(lock));
        assert!(matches!(result, Err(GeotrailError::WakeLock(_))));
    }

    #[test]
    fn test_noop_lock_rejects_double_acquire() {
        let mut lock = NoopWakeLock::default();
        lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(lock.acquire().is_err());

        lock.release();
        assert!(!lock.is_held());
        lock.acquire().unwrap();
    }

    #[test]
    fn test_inhibitor_command_line() {
        let lock = InhibitorLock::new("geotrail", "Recording position");
        let command = lock.command();
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(command.get_program(), "systemd-inhibit");
        assert!(args.contains(&"--who=geotrail".to_string()));
        assert!(args.contains(&"--why=Recording position".to_string()));
        assert_eq!(&args[args.len() - 2..], ["sleep", "infinity"]);
        assert!(!lock.is_held());
    }
}
