use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

/// A lock older than this is considered abandoned.
pub const LOCK_STALE_SECS: i64 = 60;

/// Write content atomically: write to a sibling temp file, fsync, rename.
pub fn atomic_write(path: &str, content: &[u8]) -> Result<()> {
    let target = Path::new(path);
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp_path = dir.join(format!(".{}.tmp", temp_suffix()));

    let mut file = std::fs::File::create(&temp_path)
        .with_context(|| format!("cannot create temp file for {path}"))?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, target).with_context(|| format!("cannot rename temp to {path}"))?;
    Ok(())
}

/// Advisory lock on a session file: one writer per session.
///
/// The `.lock` file sits next to the session and holds the owner's PID and
/// the acquisition timestamp, one per line.
#[derive(Debug)]
pub struct AdvisoryLock {
    lock_path: String,
}

impl AdvisoryLock {
    /// Acquire the lock, clearing it first if it is stale.
    pub fn acquire(state_path: &str) -> Result<Self> {
        let lock_path = format!("{state_path}.lock");

        if let Some(age) = lock_age(&lock_path) {
            if age > LOCK_STALE_SECS {
                tracing::warn!(lock = %lock_path, age, "removing stale session lock");
                let _ = std::fs::remove_file(&lock_path);
            }
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                bail!("session is locked by another writer (lock: {lock_path})")
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot acquire lock {lock_path}"));
            }
        };
        let pid = std::process::id();
        let ts = chrono::Utc::now().timestamp();
        write!(file, "{pid}\n{ts}\n").with_context(|| format!("cannot write lock {lock_path}"))?;

        Ok(Self { lock_path })
    }

    /// Release the lock explicitly; dropping it has the same effect.
    pub fn release(self) -> Result<()> {
        if Path::new(&self.lock_path).exists() {
            std::fs::remove_file(&self.lock_path)
                .with_context(|| format!("cannot release lock {}", self.lock_path))?;
        }
        Ok(())
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

/// Seconds since the lock at `lock_path` was taken, if it exists.
///
/// A lock whose timestamp line is missing or garbled (its writer died before
/// finishing it) is aged by the file's mtime instead.
fn lock_age(lock_path: &str) -> Option<i64> {
    let content = std::fs::read_to_string(lock_path).ok()?;
    let recorded = content
        .lines()
        .nth(1)
        .and_then(|line| line.trim().parse::<i64>().ok());
    let ts = match recorded {
        Some(ts) => ts,
        None => {
            let modified = std::fs::metadata(lock_path).ok()?.modified().ok()?;
            chrono::DateTime::<chrono::Utc>::from(modified).timestamp()
        }
    };
    Some(chrono::Utc::now().timestamp() - ts)
}

fn temp_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{nanos:x}", std::process::id())
}
