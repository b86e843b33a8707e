//! Live filesystem subscription on the source tree
//!
//! Raw `notify` events are reduced to [`SyncOperation`]s and pushed onto the
//! work queue from the notifier's own thread. Nothing is coalesced: a burst
//! of writes to one file yields one operation per event.
//!
//! A directory that appears (created, or moved in) is expanded into one
//! create per regular file below it, since its content may predate the
//! recursive watch. A directory that is moved away is expanded into one
//! delete per file of its backup mirror.

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SysebaError;
use crate::logging::*;
use crate::types::{SyncOperation, Trees};
use crate::util;
use crate::worker::WorkQueue;

/// Active recursive subscription; dropping it detaches from the source tree
pub struct SourceWatcher {
	root: PathBuf,
	_watcher: RecommendedWatcher,
}

impl SourceWatcher {
	/// Subscribe to `trees.source` and forward normalized operations to `queue`
	pub fn start(trees: &Trees, queue: WorkQueue) -> Result<Self, SysebaError> {
		let root = trees.source.clone();
		let log_root = root.clone();
		let trees = trees.clone();

		let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
			Ok(event) => {
				for op in normalize(&event, &trees) {
					if !queue.push(op) {
						debug!("Work queue closed, dropping event under {}", log_root.display());
						return;
					}
				}
			}
			Err(e) => warn!("Watch error on {}: {}", log_root.display(), e),
		})?;

		watcher.watch(&root, RecursiveMode::Recursive).map_err(|e| SysebaError::Watch {
			message: format!("cannot watch {}: {}", root.display(), e),
		})?;

		info!("Watching {}", root.display());
		Ok(SourceWatcher { root, _watcher: watcher })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}
}

impl Drop for SourceWatcher {
	fn drop(&mut self) {
		debug!("Stopped watching {}", self.root.display());
	}
}

/// Map one raw event to zero or more logical operations
///
/// The event kind is trusted when the backend reports it. Only `Any` and
/// `Other` kinds fall back to looking at the path, which may already be gone.
pub fn normalize(event: &Event, trees: &Trees) -> Vec<SyncOperation> {
	let paths = &event.paths;
	match &event.kind {
		EventKind::Create(CreateKind::File) => paths.iter().map(SyncOperation::create).collect(),
		EventKind::Create(CreateKind::Folder) => paths.iter().flat_map(|p| appeared_dir(p)).collect(),
		EventKind::Create(_) => paths.iter().flat_map(|p| appeared(p)).collect(),
		EventKind::Modify(ModifyKind::Name(mode)) => normalize_rename(mode, paths, trees),
		EventKind::Modify(ModifyKind::Data(_)) => paths.iter().map(SyncOperation::modify).collect(),
		EventKind::Modify(_) => paths
			.iter()
			.filter(|p| fs::symlink_metadata(p).map(|m| !m.is_dir()).unwrap_or(false))
			.map(SyncOperation::modify)
			.collect(),
		// Contents of a removed directory are reported file by file
		EventKind::Remove(RemoveKind::Folder) => Vec::new(),
		EventKind::Remove(RemoveKind::File) => paths.iter().map(SyncOperation::delete).collect(),
		EventKind::Remove(_) => paths
			.iter()
			.filter(|p| mirrored_dir(p, trees).is_none())
			.map(SyncOperation::delete)
			.collect(),
		EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
	}
}

fn normalize_rename(mode: &RenameMode, paths: &[PathBuf], trees: &Trees) -> Vec<SyncOperation> {
	match mode {
		RenameMode::From => paths.iter().flat_map(|p| vanished(p, trees)).collect(),
		RenameMode::To => paths.iter().flat_map(|p| appeared(p)).collect(),
		RenameMode::Both => match paths {
			[from, to] => {
				let mut ops = vanished(from, trees);
				ops.extend(appeared(to));
				ops
			}
			_ => Vec::new(),
		},
		// Backend could not tell which side this is
		RenameMode::Any | RenameMode::Other => paths
			.iter()
			.flat_map(|p| {
				if fs::symlink_metadata(p).is_ok() {
					appeared(p)
				} else {
					vanished(p, trees)
				}
			})
			.collect(),
	}
}

/// Path now present under source: a file, or a directory to expand
fn appeared(path: &Path) -> Vec<SyncOperation> {
	match fs::symlink_metadata(path) {
		Ok(meta) if meta.is_dir() => appeared_dir(path),
		Ok(_) => vec![SyncOperation::create(path)],
		// Already gone again; its removal event follows
		Err(_) => Vec::new(),
	}
}

fn appeared_dir(dir: &Path) -> Vec<SyncOperation> {
	util::regular_files(dir).into_iter().map(SyncOperation::create).collect()
}

/// Path no longer present under source: a file, or a directory whose
/// backup mirror lists the files to retire
fn vanished(path: &Path, trees: &Trees) -> Vec<SyncOperation> {
	match mirrored_dir(path, trees) {
		Some(backup_dir) => util::regular_files(&backup_dir)
			.into_iter()
			.filter_map(|f| f.strip_prefix(&backup_dir).ok().map(|rel| path.join(rel)))
			.map(SyncOperation::delete)
			.collect(),
		None => vec![SyncOperation::delete(path)],
	}
}

fn mirrored_dir(path: &Path, trees: &Trees) -> Option<PathBuf> {
	trees.backup_path(path).ok().filter(|backup| backup.is_dir())
}


// vim: ts=4
