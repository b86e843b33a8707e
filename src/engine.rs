//! Synchronization engine: wiring and shutdown ordering
//!
//! Start order: message log writer, worker pool, filesystem subscription,
//! then the initial reconciliation as an independent blocking task.
//!
//! Stop order: detach the subscription, cancel and await the reconciler,
//! drain the workers (bounded, then cancel), and finally stop the message
//! log writer once nobody can produce lines any more.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit::AuditLog;
use crate::config::Settings;
use crate::error::SysebaError;
use crate::lock::ProcessContext;
use crate::logging::*;
use crate::message_log::{MessageLog, MessageLogWriter};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::types::Trees;
use crate::watcher::SourceWatcher;
use crate::worker::{PoolReport, WorkQueue, WorkerContext, WorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Starting,
	Running,
}

/// Summary returned by [`RunningEngine::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
	/// `None` when the reconciliation task itself failed
	pub reconcile: Option<ReconcileReport>,
	pub workers: PoolReport,
	pub log_lines: u64,
}

/// Not-yet-started engine
pub struct Engine {
	settings: Settings,
	context: ProcessContext,
	state: EngineState,
}

impl Engine {
	pub fn new(settings: Settings, context: ProcessContext) -> Self {
		Engine { settings, context, state: EngineState::Starting }
	}

	pub fn state(&self) -> EngineState {
		self.state
	}

	/// Bring every component up
	///
	/// Errors here are start-up errors and should end the process.
	pub async fn start(self) -> Result<RunningEngine, SysebaError> {
		let Engine { settings, context, .. } = self;
		settings.validate()?;

		let trees =
			Trees::new(&settings.source, &settings.backup, &settings.restore).prepare()?;
		let audit = Arc::new(AuditLog::open(&settings.database)?);

		let (log, log_rx) = MessageLog::channel();
		let writer = MessageLogWriter::spawn(&settings.log, log_rx).await?;

		let worker_ctx = Arc::new(WorkerContext {
			trees: trees.clone(),
			audit: Arc::clone(&audit),
			log: log.clone(),
		});
		let (queue, pool) = WorkerPool::spawn(worker_ctx, settings.threads);

		let watcher = match SourceWatcher::start(&trees, queue.clone()) {
			Ok(w) => w,
			Err(e) => {
				pool.shutdown(settings.drain_timeout()).await;
				log.stop();
				writer.finish().await;
				return Err(e);
			}
		};

		let reconcile_cancel = CancellationToken::new();
		let reconciler =
			Reconciler::new(trees.clone(), Arc::clone(&audit), log.clone(), settings.verify);
		let token = reconcile_cancel.clone();
		let reconcile = tokio::task::spawn_blocking(move || reconciler.run(&token));

		info!(
			"SySeBa running: {} -> {} (restore {}), {} workers",
			trees.source.display(),
			trees.backup.display(),
			trees.restore.display(),
			settings.threads
		);

		Ok(RunningEngine {
			state: EngineState::Running,
			settings,
			context,
			trees,
			audit,
			log,
			writer,
			queue,
			pool,
			watcher: Some(watcher),
			reconcile: Some(reconcile),
			reconcile_cancel,
			reconcile_report: None,
		})
	}

	/// Start, run until `shutdown` resolves, then stop in order
	pub async fn run_until<F>(self, shutdown: F) -> Result<EngineReport, SysebaError>
	where
		F: Future<Output = ()>,
	{
		let running = self.start().await?;
		shutdown.await;
		info!("Shutdown requested after {:?}", running.context().uptime());
		Ok(running.shutdown().await)
	}
}

/// Engine with all components up
pub struct RunningEngine {
	state: EngineState,
	settings: Settings,
	context: ProcessContext,
	trees: Trees,
	audit: Arc<AuditLog>,
	log: MessageLog,
	writer: MessageLogWriter,
	queue: WorkQueue,
	pool: WorkerPool,
	watcher: Option<SourceWatcher>,
	reconcile: Option<JoinHandle<ReconcileReport>>,
	reconcile_cancel: CancellationToken,
	reconcile_report: Option<ReconcileReport>,
}

impl RunningEngine {
	pub fn state(&self) -> EngineState {
		self.state
	}

	pub fn context(&self) -> &ProcessContext {
		&self.context
	}

	/// Trees as resolved at start-up (canonical source root)
	pub fn trees(&self) -> &Trees {
		&self.trees
	}

	pub fn audit(&self) -> &Arc<AuditLog> {
		&self.audit
	}

	/// Producer handle on the shared work queue
	pub fn queue(&self) -> &WorkQueue {
		&self.queue
	}

	/// Wait for the initial reconciliation to finish
	pub async fn wait_for_reconcile(&mut self) -> Option<ReconcileReport> {
		if let Some(handle) = self.reconcile.take() {
			self.reconcile_report = join_reconcile(handle).await;
		}
		self.reconcile_report
	}

	/// Stop everything in order and report
	pub async fn shutdown(mut self) -> EngineReport {
		// No new events from here on
		self.watcher.take();

		self.reconcile_cancel.cancel();
		let reconcile = self.wait_for_reconcile().await;

		let RunningEngine { settings, log, writer, queue, pool, .. } = self;
		drop(queue);
		let workers = pool.shutdown(settings.drain_timeout()).await;

		log.stop();
		let log_lines = writer.finish().await;

		info!(
			"SySeBa stopped: applied={} skipped={} failed={} log_lines={}",
			workers.stats.applied, workers.stats.skipped, workers.stats.failed, log_lines
		);
		EngineReport { reconcile, workers, log_lines }
	}
}

async fn join_reconcile(handle: JoinHandle<ReconcileReport>) -> Option<ReconcileReport> {
	match handle.await {
		Ok(report) => Some(report),
		Err(e) => {
			error!("Initial sync task failed: {}", e);
			None
		}
	}
}


// vim: ts=4
