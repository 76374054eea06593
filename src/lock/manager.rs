use anyhow::{Context, Error, Result};
use libc::{EWOULDBLOCK, LOCK_EX, LOCK_NB, LOCK_UN, flock};
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{self, ErrorKind, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CRON_LOCK_FILE: &str = ".cron.lock";

#[derive(Debug, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The body ran while holding the lock
    Completed(T),

    /// Another process holds the lock; the body did not run
    AlreadyRunning,

    /// The lock file could not be created or opened
    PermissionDenied(PathBuf),
}

enum Acquire {
    Held(LockGuard),
    Busy,
    Denied,
}

/// Advisory lock, released when dropped.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        unsafe { flock(fd, LOCK_UN) };
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

/// Host-wide gate for the scheduled maintenance sweep.
///
/// Built on `flock`, so the kernel also drops the lock when the process
/// dies, whatever the reason.
pub struct MaintenanceLock {
    path: PathBuf,
    open: fn(&Path) -> io::Result<File>,
}

impl MaintenanceLock {
    pub fn new(lock_directory: &Path) -> Self {
        Self {
            path: lock_directory.join(CRON_LOCK_FILE),
            open: open_lock_file,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_acquire(&self) -> Result<Acquire, Error> {
        let file = match (self.open)(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return Ok(Acquire::Denied),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to open lock file: {}", self.path.display())
                });
            }
        };

        let result = unsafe { flock(file.as_raw_fd(), LOCK_EX | LOCK_NB) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(EWOULDBLOCK) {
                return Ok(Acquire::Busy);
            }
            return Err(err)
                .with_context(|| format!("Failed to lock file: {}", self.path.display()));
        }

        let mut guard = LockGuard { file };
        guard.file.set_len(0).context("Failed to truncate lock file")?;
        writeln!(guard.file, "{}", std::process::id()).context("Failed to write lock file")?;
        Ok(Acquire::Held(guard))
    }

    /// Runs `body` while holding the lock. Never waits for it.
    pub fn run_exclusive<T, F>(&self, body: F) -> Result<LockOutcome<T>, Error>
    where
        F: FnOnce() -> T,
    {
        match self.try_acquire()? {
            Acquire::Held(_guard) => {
                debug!("acquired {}", self.path.display());
                Ok(LockOutcome::Completed(body()))
            }
            Acquire::Busy => Ok(LockOutcome::AlreadyRunning),
            Acquire::Denied => Ok(LockOutcome::PermissionDenied(self.path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, mpsc};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_completed() {
        let temp_dir = TempDir::new().unwrap();
        let lock = MaintenanceLock::new(&temp_dir.path().join("locks"));

        let outcome = lock.run_exclusive(|| 42).unwrap();

        assert_eq!(outcome, LockOutcome::Completed(42));
        assert!(lock.path().is_file());
    }

    #[test]
    fn test_second_holder_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = thread::spawn(move || {
            MaintenanceLock::new(&dir)
                .run_exclusive(|| {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .unwrap()
        });
        entered_rx.recv().unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let outcome = MaintenanceLock::new(temp_dir.path())
            .run_exclusive(move || flag.store(true, Ordering::SeqCst))
            .unwrap();

        assert_eq!(outcome, LockOutcome::AlreadyRunning);
        assert!(!ran.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        assert_eq!(holder.join().unwrap(), LockOutcome::Completed(()));

        let again = MaintenanceLock::new(temp_dir.path()).run_exclusive(|| "free").unwrap();
        assert_eq!(again, LockOutcome::Completed("free"));
    }

    #[test]
    fn test_released_after_panic() {
        let temp_dir = TempDir::new().unwrap();
        let lock = MaintenanceLock::new(temp_dir.path());

        let result = catch_unwind(AssertUnwindSafe(|| {
            lock.run_exclusive(|| -> () { panic!("sweep failed") }).unwrap();
        }));
        assert!(result.is_err());

        assert_eq!(lock.run_exclusive(|| 1).unwrap(), LockOutcome::Completed(1));
    }

    fn denied(_: &Path) -> io::Result<File> {
        Err(io::Error::from(ErrorKind::PermissionDenied))
    }

    fn vanished(_: &Path) -> io::Result<File> {
        Err(io::Error::from(ErrorKind::NotFound))
    }

    #[test]
    fn test_denied_open_skips_body() {
        let temp_dir = TempDir::new().unwrap();
        let lock = MaintenanceLock {
            open: denied,
            ..MaintenanceLock::new(temp_dir.path())
        };
        let mut ran = false;

        let outcome = lock.run_exclusive(|| ran = true).unwrap();

        assert_eq!(outcome, LockOutcome::PermissionDenied(temp_dir.path().join(CRON_LOCK_FILE)));
        assert!(!ran);
    }

    #[test]
    fn test_other_open_failure_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let lock = MaintenanceLock {
            open: vanished,
            ..MaintenanceLock::new(temp_dir.path())
        };

        let err = lock.run_exclusive(|| ()).unwrap_err();

        assert!(err.to_string().starts_with("Failed to open lock file"));
    }

    #[test]
    fn test_unwritable_directory() {
        use std::os::unix::fs::PermissionsExt;

        // root ignores directory permissions; covered by test_denied_open_skips_body
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        let lock = MaintenanceLock::new(&locked);
        let outcome = lock.run_exclusive(|| ()).unwrap();

        assert_eq!(outcome, LockOutcome::PermissionDenied(locked.join(CRON_LOCK_FILE)));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
    }
}
