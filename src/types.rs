//! Core value types shared by the engine components

use std::fmt;
use std::path::{Path, PathBuf};

use crate::audit::AuditOperation;
use crate::error::SysebaError;

/// Logical operation derived from a filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
	Create,
	Modify,
	Delete,
}

impl OperationKind {
	pub fn audit_operation(&self) -> AuditOperation {
		match self {
			OperationKind::Create => AuditOperation::Create,
			OperationKind::Modify => AuditOperation::Modify,
			OperationKind::Delete => AuditOperation::Delete,
		}
	}

	/// Past-tense label used in message log lines
	pub fn past_tense(&self) -> &'static str {
		match self {
			OperationKind::Create => "Created",
			OperationKind::Modify => "Modified",
			OperationKind::Delete => "Deleted",
		}
	}
}

impl fmt::Display for OperationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OperationKind::Create => f.write_str("create"),
			OperationKind::Modify => f.write_str("modify"),
			OperationKind::Delete => f.write_str("delete"),
		}
	}
}

/// Queued unit of work: consumed exactly once by one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperation {
	pub kind: OperationKind,
	pub source_path: PathBuf,
}

impl SyncOperation {
	pub fn new(kind: OperationKind, source_path: impl Into<PathBuf>) -> Self {
		SyncOperation { kind, source_path: source_path.into() }
	}

	pub fn create(source_path: impl Into<PathBuf>) -> Self {
		Self::new(OperationKind::Create, source_path)
	}

	pub fn modify(source_path: impl Into<PathBuf>) -> Self {
		Self::new(OperationKind::Modify, source_path)
	}

	pub fn delete(source_path: impl Into<PathBuf>) -> Self {
		Self::new(OperationKind::Delete, source_path)
	}
}

/// The three directory trees the engine works on
///
/// `source` is only ever read. `backup` and `restore` share the relative
/// layout of `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trees {
	pub source: PathBuf,
	pub backup: PathBuf,
	pub restore: PathBuf,
}

impl Trees {
	pub fn new(
		source: impl Into<PathBuf>,
		backup: impl Into<PathBuf>,
		restore: impl Into<PathBuf>,
	) -> Self {
		Trees { source: source.into(), backup: backup.into(), restore: restore.into() }
	}

	/// Canonicalize all three roots and make sure `backup` and `restore` exist
	///
	/// Filesystem notifications carry paths under the canonical root, so the
	/// prefix stripping in [`Trees::relative`] must use the same form. The
	/// overlap checks also run on resolved paths, before anything is created:
	/// `backup` or `restore` inside `source` would feed our own writes back to
	/// the watcher.
	pub fn prepare(&self) -> Result<Self, SysebaError> {
		let source = self
			.source
			.canonicalize()
			.map_err(|e| SysebaError::path_io(&self.source, e))?;
		if !source.is_dir() {
			return Err(SysebaError::InvalidConfig {
				message: format!("source {} is not a directory", source.display()),
			});
		}

		for dir in [&self.backup, &self.restore] {
			let resolved = resolve(dir).map_err(|e| SysebaError::path_io(dir, e))?;
			if resolved.starts_with(&source) || source.starts_with(&resolved) {
				return Err(SysebaError::InvalidConfig {
					message: format!(
						"{} overlaps source {}",
						resolved.display(),
						source.display()
					),
				});
			}
		}

		let ensure = |dir: &Path| -> Result<PathBuf, SysebaError> {
			std::fs::create_dir_all(dir).map_err(|e| SysebaError::path_io(dir, e))?;
			dir.canonicalize().map_err(|e| SysebaError::path_io(dir, e))
		};
		Ok(Trees { source, backup: ensure(&self.backup)?, restore: ensure(&self.restore)? })
	}

	/// Path relative to the source root
	pub fn relative<'a>(&self, source_path: &'a Path) -> Result<&'a Path, SysebaError> {
		source_path.strip_prefix(&self.source).map_err(|_| SysebaError::OutsideTree {
			path: source_path.to_path_buf(),
			root: self.source.clone(),
		})
	}

	/// Mirrored path of `source_path` under the backup root
	pub fn backup_path(&self, source_path: &Path) -> Result<PathBuf, SysebaError> {
		Ok(mirror(self.relative(source_path)?, &self.backup))
	}

	/// Mirrored path of `source_path` under the restore root
	pub fn restore_path(&self, source_path: &Path) -> Result<PathBuf, SysebaError> {
		Ok(mirror(self.relative(source_path)?, &self.restore))
	}
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the missing tail appended
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
	let absolute = if path.is_absolute() {
		path.to_path_buf()
	} else {
		std::env::current_dir()?.join(path)
	};
	let mut tail = Vec::new();
	let mut current = absolute.as_path();
	loop {
		match current.canonicalize() {
			Ok(base) => return Ok(tail.iter().rev().fold(base, |acc, part| acc.join(part))),
			Err(e) => match (current.parent(), current.file_name()) {
				(Some(parent), Some(name)) => {
					tail.push(name.to_os_string());
					current = parent;
				}
				_ => return Err(e),
			},
		}
	}
}

fn mirror(relative: &Path, root: &Path) -> PathBuf {
	if relative.as_os_str().is_empty() {
		root.to_path_buf()
	} else {
		root.join(relative)
	}
}


// vim: ts=4
