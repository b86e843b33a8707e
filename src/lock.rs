//! Process singleton lock and lifecycle context

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::SysebaError;
use crate::logging::*;

/// Check if a process with given PID is currently alive
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
	Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn is_process_alive(pid: u32) -> bool {
	use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

	let pid = Pid::from_u32(pid);
	let mut system = System::new();
	system.refresh_processes_specifics(
		ProcessesToUpdate::Some(&[pid]),
		true,
		ProcessRefreshKind::nothing(),
	);
	system.process(pid).is_some()
}

/// RAII guard for the singleton lock file
///
/// The file holds the pid of the owning process. It is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
	path: PathBuf,
	pid: u32,
}

impl InstanceLock {
	/// Acquire the lock or fail with [`SysebaError::AlreadyRunning`]
	///
	/// A lock file that is unreadable, unparsable or names a dead process is
	/// treated as stale and overwritten.
	pub fn acquire(path: &Path) -> Result<Self, SysebaError> {
		if let Ok(contents) = fs::read_to_string(path) {
			match contents.trim().parse::<u32>() {
				Ok(pid) if pid != std::process::id() && is_process_alive(pid) => {
					return Err(SysebaError::AlreadyRunning { pid });
				}
				Ok(pid) => debug!("Replacing stale lock file {} (pid {})", path.display(), pid),
				Err(_) => warn!("Ignoring unparsable lock file {}", path.display()),
			}
		}

		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent).map_err(|e| SysebaError::LockFailed {
					message: format!("cannot create {}: {}", parent.display(), e),
				})?;
			}
		}

		let pid = std::process::id();
		fs::write(path, pid.to_string()).map_err(|e| SysebaError::LockFailed {
			message: format!("cannot write {}: {}", path.display(), e),
		})?;

		Ok(InstanceLock { path: path.to_path_buf(), pid })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn pid(&self) -> u32 {
		self.pid
	}
}

impl Drop for InstanceLock {
	fn drop(&mut self) {
		let _ = fs::remove_file(&self.path);
	}
}

/// Explicit process-lifecycle state handed to the engine at construction
#[derive(Debug)]
pub struct ProcessContext {
	started: Instant,
	lock: Option<InstanceLock>,
}

impl ProcessContext {
	/// Context owning the singleton lock
	pub fn locked(lock: InstanceLock) -> Self {
		ProcessContext { started: Instant::now(), lock: Some(lock) }
	}

	/// Context without singleton enforcement (embedding, tests)
	pub fn unlocked() -> Self {
		ProcessContext { started: Instant::now(), lock: None }
	}

	pub fn uptime(&self) -> Duration {
		self.started.elapsed()
	}

	pub fn lock(&self) -> Option<&InstanceLock> {
		self.lock.as_ref()
	}
}


// vim: ts=4
