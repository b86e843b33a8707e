//! Worker pool applying queued operations to the backup and restore trees
//!
//! Each worker owns one FIFO lane. [`WorkQueue::push`] picks the lane from a
//! hash of the source path, so every operation on a given path is applied by
//! the same worker in arrival order, while distinct paths spread across the
//! pool. The initial reconciler writes to `backup` directly and can still
//! race a worker on the same path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditLog, AuditOperation};
use crate::error::SysebaError;
use crate::logging::*;
use crate::message_log::MessageLog;
use crate::types::{OperationKind, SyncOperation, Trees};
use crate::util;

/// Bound on waiting for workers to finish their current item after cancel
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Everything a worker needs to apply an operation
pub struct WorkerContext {
	pub trees: Trees,
	pub audit: Arc<AuditLog>,
	pub log: MessageLog,
}

/// Result of applying one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// Filesystem mutated and audited
	Applied,
	/// Delete without a backup copy: nothing to protect
	Skipped,
	/// Error recorded, worker carries on
	Failed,
}

/// Per-worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
	pub applied: u64,
	pub skipped: u64,
	pub failed: u64,
}

impl WorkerStats {
	fn count(&mut self, outcome: Outcome) {
		match outcome {
			Outcome::Applied => self.applied += 1,
			Outcome::Skipped => self.skipped += 1,
			Outcome::Failed => self.failed += 1,
		}
	}

	fn merge(&mut self, other: WorkerStats) {
		self.applied += other.applied;
		self.skipped += other.skipped;
		self.failed += other.failed;
	}

	pub fn total(&self) -> u64 {
		self.applied + self.skipped + self.failed
	}
}

/// Aggregate outcome of a pool shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
	pub stats: WorkerStats,
	/// Workers that had to be cancelled because draining took too long
	pub cancelled: bool,
	/// Workers that did not exit within the grace period and were aborted
	pub aborted: usize,
}

/// Multi-producer handle routing operations to worker lanes
#[derive(Debug, Clone)]
pub struct WorkQueue {
	lanes: Vec<mpsc::UnboundedSender<SyncOperation>>,
}

impl WorkQueue {
	/// Enqueue without blocking; returns false once the pool is gone
	pub fn push(&self, op: SyncOperation) -> bool {
		let lane = lane_for(&op.source_path, self.lanes.len());
		self.lanes[lane].send(op).is_ok()
	}

	pub fn lanes(&self) -> usize {
		self.lanes.len()
	}
}

fn lane_for(path: &Path, lanes: usize) -> usize {
	let mut hasher = DefaultHasher::new();
	path.hash(&mut hasher);
	(hasher.finish() % lanes as u64) as usize
}

/// Fixed-size set of workers
pub struct WorkerPool {
	handles: Vec<JoinHandle<WorkerStats>>,
	closing: CancellationToken,
	cancel: CancellationToken,
}

impl WorkerPool {
	/// Start `threads` workers and return the queue feeding them
	pub fn spawn(ctx: Arc<WorkerContext>, threads: usize) -> (WorkQueue, WorkerPool) {
		let threads = threads.max(1);
		let closing = CancellationToken::new();
		let cancel = CancellationToken::new();

		let mut lanes = Vec::with_capacity(threads);
		let mut handles = Vec::with_capacity(threads);
		for id in 0..threads {
			let (tx, rx) = mpsc::unbounded_channel();
			lanes.push(tx);
			handles.push(tokio::spawn(run_worker(
				id,
				Arc::clone(&ctx),
				rx,
				closing.clone(),
				cancel.clone(),
			)));
		}

		debug!("Started {} workers", threads);
		(WorkQueue { lanes }, WorkerPool { handles, closing, cancel })
	}

	/// Drain queued operations for at most `drain`, then cancel
	///
	/// Producers must be stopped first; anything pushed after this call
	/// starts may be dropped.
	pub async fn shutdown(self, drain: Duration) -> PoolReport {
		let WorkerPool { mut handles, closing, cancel } = self;
		let mut report = PoolReport::default();

		closing.cancel();
		let drained = tokio::time::timeout(drain, join_all(&mut handles, &mut report.stats)).await;
		if drained.is_ok() {
			return report;
		}

		warn!("Workers still busy after {:?}, cancelling", drain);
		report.cancelled = true;
		cancel.cancel();
		if tokio::time::timeout(CANCEL_GRACE, join_all(&mut handles, &mut report.stats))
			.await
			.is_err()
		{
			for handle in handles.drain(..) {
				handle.abort();
				report.aborted += 1;
			}
			warn!("Aborted {} stuck workers", report.aborted);
		}
		report
	}
}

/// Join workers in order, removing each finished handle
async fn join_all(handles: &mut Vec<JoinHandle<WorkerStats>>, stats: &mut WorkerStats) {
	while let Some(handle) = handles.first_mut() {
		match handle.await {
			Ok(worker_stats) => stats.merge(worker_stats),
			Err(e) => error!("Worker task failed: {}", e),
		}
		handles.remove(0);
	}
}

async fn run_worker(
	id: usize,
	ctx: Arc<WorkerContext>,
	mut rx: mpsc::UnboundedReceiver<SyncOperation>,
	closing: CancellationToken,
	cancel: CancellationToken,
) -> WorkerStats {
	let mut stats = WorkerStats::default();

	loop {
		let op = tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			op = rx.recv() => match op {
				Some(op) => op,
				None => break,
			},
			// Only reached once the lane is empty
			_ = closing.cancelled() => break,
		};

		let task_ctx = Arc::clone(&ctx);
		let outcome = match tokio::task::spawn_blocking(move || apply_operation(&task_ctx, &op)).await
		{
			Ok(outcome) => outcome,
			Err(e) => {
				error!("[worker {}] operation panicked: {}", id, e);
				Outcome::Failed
			}
		};
		stats.count(outcome);
	}

	debug!("[worker {}] exiting: {:?}", id, stats);
	stats
}

/// Apply one operation, recording the outcome
///
/// Never fails: errors become an `ERROR` audit record and a message log
/// line, and the caller moves on to the next item.
pub fn apply_operation(ctx: &WorkerContext, op: &SyncOperation) -> Outcome {
	match try_apply(ctx, op) {
		Ok(outcome) => outcome,
		Err(e) => {
			let detail = e.to_string();
			warn!("Error processing {} for {}: {}", op.kind, op.source_path.display(), detail);
			ctx.log.send(format!(
				"Error processing {} for {}: {}",
				op.kind,
				op.source_path.display(),
				detail
			));
			if let Err(audit_err) =
				ctx.audit.record_paths(AuditOperation::Error, &op.source_path, None, Some(&detail))
			{
				error!("Cannot audit failure for {}: {}", op.source_path.display(), audit_err);
			}
			Outcome::Failed
		}
	}
}

fn try_apply(ctx: &WorkerContext, op: &SyncOperation) -> Result<Outcome, SysebaError> {
	let backup_path = ctx.trees.backup_path(&op.source_path)?;

	match op.kind {
		OperationKind::Create | OperationKind::Modify => {
			util::ensure_parent(&backup_path).map_err(|e| SysebaError::path_io(&backup_path, e))?;
			util::copy_preserving(&op.source_path, &backup_path)
				.map_err(|e| SysebaError::path_io(&op.source_path, e))?;

			debug!("{} {}", op.kind.past_tense(), backup_path.display());
			ctx.log.send(format!(
				"{}: {} -> {}",
				op.kind.past_tense(),
				op.source_path.display(),
				backup_path.display()
			));
			audit_success(ctx, op.kind.audit_operation(), &op.source_path, &backup_path, None);
			Ok(Outcome::Applied)
		}
		OperationKind::Delete => {
			if !backup_path.is_file() {
				debug!("No backup copy for {}, nothing to restore", op.source_path.display());
				return Ok(Outcome::Skipped);
			}

			let restore_path = ctx.trees.restore_path(&op.source_path)?;
			util::ensure_parent(&restore_path)
				.map_err(|e| SysebaError::path_io(&restore_path, e))?;
			util::move_file(&backup_path, &restore_path)
				.map_err(|e| SysebaError::path_io(&backup_path, e))?;

			ctx.log.send(format!(
				"Deleted: {}, Moved to restore: {}",
				backup_path.display(),
				restore_path.display()
			));
			audit_success(
				ctx,
				AuditOperation::Delete,
				&backup_path,
				&restore_path,
				Some("Moved to restore"),
			);
			Ok(Outcome::Applied)
		}
	}
}

fn audit_success(
	ctx: &WorkerContext,
	operation: AuditOperation,
	source: &Path,
	target: &Path,
	info: Option<&str>,
) {
	if let Err(e) = ctx.audit.record_paths(operation, source, Some(target), info) {
		error!("Cannot audit {} of {}: {}", operation, source.display(), e);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message_log::LogMessage;
	use std::fs;
	use tempfile::TempDir;

	struct Fixture {
		_tmp: TempDir,
		ctx: Arc<WorkerContext>,
		rx: mpsc::UnboundedReceiver<LogMessage>,
	}

	fn fixture() -> Fixture {
		let tmp = TempDir::new().unwrap();
		let trees = Trees::new(tmp.path().join("src"), tmp.path().join("bk"), tmp.path().join("rs"));
		for dir in [&trees.source, &trees.backup, &trees.restore] {
			fs::create_dir_all(dir).unwrap();
		}
		let audit = Arc::new(AuditLog::open(&tmp.path().join("audit.db")).unwrap());
		let (log, rx) = MessageLog::channel();
		Fixture { _tmp: tmp, ctx: Arc::new(WorkerContext { trees, audit, log }), rx }
	}

	fn lines(rx: &mut mpsc::UnboundedReceiver<LogMessage>) -> Vec<String> {
		let mut out = Vec::new();
		while let Ok(LogMessage::Line(line)) = rx.try_recv() {
			out.push(line);
		}
		out
	}

	#[test]
	fn test_create_copies_into_nested_backup() {
		let mut fx = fixture();
		let src = fx.ctx.trees.source.join("a/b.txt");
		fs::create_dir_all(src.parent().unwrap()).unwrap();
		fs::write(&src, "X").unwrap();

		assert_eq!(apply_operation(&fx.ctx, &SyncOperation::create(&src)), Outcome::Applied);

		let backup = fx.ctx.trees.backup.join("a/b.txt");
		assert_eq!(fs::read_to_string(&backup).unwrap(), "X");
		let logged = lines(&mut fx.rx);
		assert_eq!(logged.len(), 1);
		assert!(logged[0].starts_with("Created: "));

		let record = &fx.ctx.audit.recent(1).unwrap()[0];
		assert_eq!(record.operation, "CREATE");
		assert_eq!(record.target_path.as_deref(), Some(backup.to_string_lossy().as_ref()));
	}

	#[test]
	fn test_modify_overwrites_backup() {
		let fx = fixture();
		let src = fx.ctx.trees.source.join("f.txt");
		fs::write(&src, "new content").unwrap();
		fs::write(fx.ctx.trees.backup.join("f.txt"), "stale").unwrap();

		assert_eq!(apply_operation(&fx.ctx, &SyncOperation::modify(&src)), Outcome::Applied);
		assert_eq!(fs::read_to_string(fx.ctx.trees.backup.join("f.txt")).unwrap(), "new content");
		assert_eq!(fx.ctx.audit.recent(1).unwrap()[0].operation, "MODIFY");
	}

	#[test]
	fn test_delete_moves_backup_to_restore() {
		let fx = fixture();
		let src = fx.ctx.trees.source.join("a/b.txt");
		fs::create_dir_all(fx.ctx.trees.backup.join("a")).unwrap();
		fs::write(fx.ctx.trees.backup.join("a/b.txt"), "Y").unwrap();

		assert_eq!(apply_operation(&fx.ctx, &SyncOperation::delete(&src)), Outcome::Applied);

		assert!(!fx.ctx.trees.backup.join("a/b.txt").exists());
		assert_eq!(fs::read_to_string(fx.ctx.trees.restore.join("a/b.txt")).unwrap(), "Y");

		let record = &fx.ctx.audit.recent(1).unwrap()[0];
		assert_eq!(record.operation, "DELETE");
		assert_eq!(record.additional_info.as_deref(), Some("Moved to restore"));
	}

	#[test]
	fn test_delete_without_backup_is_noop() {
		let mut fx = fixture();
		let src = fx.ctx.trees.source.join("never-backed-up.txt");

		assert_eq!(apply_operation(&fx.ctx, &SyncOperation::delete(&src)), Outcome::Skipped);
		assert_eq!(fs::read_dir(&fx.ctx.trees.restore).unwrap().count(), 0);
		assert!(lines(&mut fx.rx).is_empty());
		assert_eq!(fx.ctx.audit.count().unwrap(), 0);
	}

	#[test]
	fn test_failure_is_recorded_not_propagated() {
		let mut fx = fixture();
		let missing = fx.ctx.trees.source.join("vanished.txt");

		assert_eq!(apply_operation(&fx.ctx, &SyncOperation::create(&missing)), Outcome::Failed);

		let record = &fx.ctx.audit.recent(1).unwrap()[0];
		assert_eq!(record.operation, "ERROR");
		assert_eq!(record.source_path, missing.to_string_lossy());
		assert!(record.additional_info.is_some());
		assert!(lines(&mut fx.rx)[0].starts_with("Error processing create for "));
	}

	#[test]
	fn test_path_outside_source_fails() {
		let fx = fixture();
		let outcome = apply_operation(&fx.ctx, &SyncOperation::modify("/somewhere/else.txt"));
		assert_eq!(outcome, Outcome::Failed);
		assert_eq!(fx.ctx.audit.recent(1).unwrap()[0].operation, "ERROR");
	}

	#[test]
	fn test_same_path_always_same_lane() {
		let path = Path::new("/dati/a/b.txt");
		let lane = lane_for(path, 8);
		for _ in 0..10 {
			assert_eq!(lane_for(path, 8), lane);
		}
		assert!(lane < 8);
		assert_eq!(lane_for(path, 1), 0);
	}

	#[tokio::test]
	async fn test_pool_drains_queue_on_shutdown() {
		let fx = fixture();
		let (queue, pool) = WorkerPool::spawn(Arc::clone(&fx.ctx), 3);
		assert_eq!(queue.lanes(), 3);

		for i in 0..20 {
			let src = fx.ctx.trees.source.join(format!("f{}.txt", i));
			fs::write(&src, format!("{}", i)).unwrap();
			assert!(queue.push(SyncOperation::create(&src)));
		}
		// One failure in the middle does not stop the rest
		assert!(queue.push(SyncOperation::create(fx.ctx.trees.source.join("missing"))));

		let report = pool.shutdown(Duration::from_secs(30)).await;
		assert!(!report.cancelled);
		assert_eq!(report.stats.applied, 20);
		assert_eq!(report.stats.failed, 1);
		for i in 0..20 {
			assert!(fx.ctx.trees.backup.join(format!("f{}.txt", i)).is_file());
		}
		assert_eq!(fx.ctx.audit.count().unwrap(), 21);
	}

	#[tokio::test]
	async fn test_same_path_operations_apply_in_order() {
		let fx = fixture();
		let (queue, pool) = WorkerPool::spawn(Arc::clone(&fx.ctx), 4);
		let src = fx.ctx.trees.source.join("doc.txt");
		fs::write(&src, "final").unwrap();

		queue.push(SyncOperation::create(&src));
		queue.push(SyncOperation::modify(&src));
		queue.push(SyncOperation::delete(&src));
		pool.shutdown(Duration::from_secs(30)).await;

		assert!(!fx.ctx.trees.backup.join("doc.txt").exists());
		assert_eq!(fs::read_to_string(fx.ctx.trees.restore.join("doc.txt")).unwrap(), "final");
	}
}

// vim: ts=4
