//! One-shot reconciliation of `backup` against `source`
//!
//! Runs once at start-up, concurrently with live event handling. Directories
//! are mirrored, files missing from `backup` are copied. What happens to a
//! file that already has a backup copy depends on [`VerifyPolicy`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditLog, AuditOperation};
use crate::config::VerifyPolicy;
use crate::error::SysebaError;
use crate::logging::*;
use crate::message_log::MessageLog;
use crate::types::Trees;
use crate::util;

pub const COMPLETED_MESSAGE: &str = "Initial sync completed.";
pub const CANCELLED_MESSAGE: &str = "Initial sync cancelled.";

/// Counters from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
	/// Regular files counted before the walk (best-effort estimate)
	pub discovered: u64,
	pub copied: u64,
	pub skipped: u64,
	pub failed: u64,
	pub cancelled: bool,
}

pub struct Reconciler {
	trees: Trees,
	audit: Arc<AuditLog>,
	log: MessageLog,
	policy: VerifyPolicy,
}

impl Reconciler {
	pub fn new(trees: Trees, audit: Arc<AuditLog>, log: MessageLog, policy: VerifyPolicy) -> Self {
		Reconciler { trees, audit, log, policy }
	}

	/// Walk the whole source tree once
	///
	/// Blocking; run it on a blocking thread. Checks `cancel` between entries.
	pub fn run(&self, cancel: &CancellationToken) -> ReconcileReport {
		let mut report = ReconcileReport { discovered: count_files(&self.trees.source), ..Default::default() };
		info!(
			"Initial sync of {} into {} ({} files)",
			self.trees.source.display(),
			self.trees.backup.display(),
			report.discovered
		);

		self.walk_dir(&self.trees.source, cancel, &mut report);

		let message = if report.cancelled { CANCELLED_MESSAGE } else { COMPLETED_MESSAGE };
		self.log.send(message);
		if let Err(e) = self.audit.record(AuditOperation::Info, message, None, None) {
			error!("Cannot audit reconciliation end: {}", e);
		}
		info!(
			"{} copied={} skipped={} failed={}",
			message, report.copied, report.skipped, report.failed
		);
		report
	}

	fn walk_dir(&self, dir: &Path, cancel: &CancellationToken, report: &mut ReconcileReport) {
		if cancel.is_cancelled() {
			report.cancelled = true;
			return;
		}

		let backup_dir = match self.trees.backup_path(dir) {
			Ok(path) => path,
			Err(e) => {
				self.fail(dir, &e, report);
				return;
			}
		};
		if !backup_dir.is_dir() {
			if let Err(e) = fs::create_dir_all(&backup_dir) {
				self.fail(dir, &SysebaError::path_io(&backup_dir, e), report);
				return;
			}
		}

		let listing = match fs::read_dir(dir) {
			Ok(listing) => listing,
			Err(e) => {
				self.fail(dir, &SysebaError::path_io(dir, e), report);
				return;
			}
		};
		let mut entries = Vec::new();
		for entry in listing {
			match entry {
				Ok(entry) => entries.push(entry.path()),
				Err(e) => self.fail(dir, &SysebaError::path_io(dir, e), report),
			}
		}
		entries.sort();

		for path in entries {
			if cancel.is_cancelled() {
				report.cancelled = true;
				return;
			}

			let metadata = match fs::symlink_metadata(&path) {
				Ok(m) => m,
				Err(e) => {
					// Vanished between listing and stat
					debug!("Cannot stat {}: {}", path.display(), e);
					continue;
				}
			};

			if metadata.is_dir() {
				self.walk_dir(&path, cancel, report);
			} else if metadata.is_file() {
				self.sync_file(&path, report);
			}
		}
	}

	fn sync_file(&self, src: &Path, report: &mut ReconcileReport) {
		let dst = match self.trees.backup_path(src) {
			Ok(path) => path,
			Err(e) => {
				self.fail(src, &e, report);
				return;
			}
		};

		let drift = match self.needs_copy(src, &dst) {
			Ok(None) => {
				report.skipped += 1;
				return;
			}
			Ok(Some(drift)) => drift,
			Err(e) => {
				self.fail(src, &e, report);
				return;
			}
		};

		if let Err(e) = util::copy_preserving(src, &dst) {
			self.fail(src, &SysebaError::path_io(src, e), report);
			return;
		}

		report.copied += 1;
		self.log.send(format!(
			"Copied: {} -> {} ({}/{})",
			src.display(),
			dst.display(),
			report.copied,
			report.discovered
		));
		let info = if drift { Some("content drift") } else { None };
		if let Err(e) = self.audit.record_paths(AuditOperation::Copy, src, Some(&dst), info) {
			error!("Cannot audit copy of {}: {}", src.display(), e);
		}
	}

	/// `None` when the backup copy is acceptable, `Some(drift)` when a copy is
	/// needed (`drift` is true if an existing copy is being replaced)
	fn needs_copy(&self, src: &Path, dst: &Path) -> Result<Option<bool>, SysebaError> {
		if !dst.exists() {
			return Ok(Some(false));
		}
		match self.policy {
			VerifyPolicy::Existence => Ok(None),
			VerifyPolicy::Checksum => {
				if !dst.is_file() {
					return Err(SysebaError::Other {
						message: format!("{} exists and is not a regular file", dst.display()),
					});
				}
				let src_digest = util::file_digest(src).map_err(|e| SysebaError::path_io(src, e))?;
				let dst_digest = util::file_digest(dst).map_err(|e| SysebaError::path_io(dst, e))?;
				Ok(if src_digest == dst_digest { None } else { Some(true) })
			}
		}
	}

	fn fail(&self, path: &Path, err: &SysebaError, report: &mut ReconcileReport) {
		report.failed += 1;
		let detail = err.to_string();
		warn!("Initial sync error for {}: {}", path.display(), detail);
		self.log.send(format!("Error copying {}: {}", path.display(), detail));
		if let Err(e) = self.audit.record_paths(AuditOperation::Error, path, None, Some(&detail)) {
			error!("Cannot audit failure for {}: {}", path.display(), e);
		}
	}
}

/// Count regular files under `root`, skipping unreadable directories
pub fn count_files(root: &Path) -> u64 {
	util::regular_files(root).len() as u64
}


// vim: ts=4
