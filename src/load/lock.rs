use crate::error::{EtlError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// A lock file without a readable pid is only taken over once it is this old,
/// so a run that has just created the file is not mistaken for a crashed one.
const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(60);

/// Lock file held while a run writes its outputs. Created with create-new
/// semantics, removed on drop. A file left behind by a process that no longer
/// exists is taken over.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = match create_new(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(&path)? {
                    return Err(EtlError::RunLocked(path.display().to_string()));
                }
                warn!("Removing stale run lock {}", path.display());
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                // Another run may have taken it over first.
                create_new(&path).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => EtlError::RunLocked(path.display().to_string()),
                    _ => e.into(),
                })?
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "pid={}", std::process::id())?;
        debug!("Acquired run lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove run lock {}: {}", self.path.display(), e);
        }
    }
}

fn create_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Reads the `pid=` line of a lock file.
fn holder_pid(contents: &str) -> Option<u32> {
    contents
        .lines()
        .find_map(|line| line.trim().strip_prefix("pid="))
        .and_then(|pid| pid.trim().parse().ok())
}

fn is_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

fn is_stale(path: &Path) -> Result<bool> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        // Released between our create attempt and this read.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    match holder_pid(&contents) {
        Some(pid) => {
            let running = is_running(pid);
            debug!("Run lock {} held by pid {} (running: {})", path.display(), pid, running);
            Ok(!running)
        }
        None => {
            let age = fs::metadata(path)?
                .modified()?
                .elapsed()
                .unwrap_or_default();
            Ok(age >= UNREADABLE_LOCK_GRACE)
        }
    }
}
