//! Single-writer drain for the human-readable message log
//!
//! Workers, the reconciler and the engine all produce lines concurrently;
//! one task owns the file and appends them in channel order, flushing after
//! every line.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs as afs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SysebaError;
use crate::logging::*;

/// How long the writer waits for a message before polling again
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Entry on the message channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMessage {
	Line(String),
	/// Sentinel: write everything queued before it, then exit
	Stop,
}

/// Producer handle for the message log (cheap to clone)
#[derive(Debug, Clone)]
pub struct MessageLog {
	tx: mpsc::UnboundedSender<LogMessage>,
}

impl MessageLog {
	/// Create a producer and the matching receiving end
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<LogMessage>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(MessageLog { tx }, rx)
	}

	/// Queue one line; dropped silently once the writer is gone
	pub fn send(&self, line: impl Into<String>) {
		let _ = self.tx.send(LogMessage::Line(line.into()));
	}

	/// Queue the stop sentinel
	pub fn stop(&self) {
		let _ = self.tx.send(LogMessage::Stop);
	}
}

/// Handle on the running writer task
pub struct MessageLogWriter {
	path: PathBuf,
	handle: JoinHandle<u64>,
}

impl MessageLogWriter {
	/// Open `path` for appending and start draining `rx` into it
	///
	/// Opening happens before the task starts, so an unwritable log file is
	/// reported to the caller as a start-up error.
	pub async fn spawn(
		path: &Path,
		rx: mpsc::UnboundedReceiver<LogMessage>,
	) -> Result<Self, SysebaError> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				afs::create_dir_all(parent).await.map_err(|e| SysebaError::path_io(parent, e))?;
			}
		}

		let file = afs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.await
			.map_err(|e| SysebaError::path_io(path, e))?;

		let handle = tokio::spawn(drain(file, rx, path.to_path_buf()));
		Ok(MessageLogWriter { path: path.to_path_buf(), handle })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Wait for the writer to exit, returning the number of lines written
	///
	/// The caller is expected to have sent [`LogMessage::Stop`] (or dropped
	/// every producer) first.
	pub async fn finish(self) -> u64 {
		match self.handle.await {
			Ok(written) => written,
			Err(e) => {
				error!("Message log writer for {} failed: {}", self.path.display(), e);
				0
			}
		}
	}
}

async fn drain(mut file: afs::File, mut rx: mpsc::UnboundedReceiver<LogMessage>, path: PathBuf) -> u64 {
	let mut written = 0u64;

	loop {
		let message = match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
			Ok(Some(message)) => message,
			// Every producer is gone: nothing more can arrive
			Ok(None) => break,
			Err(_elapsed) => continue,
		};

		let line = match message {
			LogMessage::Line(line) => line,
			LogMessage::Stop => break,
		};

		let mut buf = line.into_bytes();
		buf.push(b'\n');
		let result = async {
			file.write_all(&buf).await?;
			file.flush().await
		}
		.await;

		match result {
			Ok(()) => written += 1,
			Err(e) => warn!("Cannot append to message log {}: {}", path.display(), e),
		}
	}

	debug!("Message log writer for {} stopped after {} lines", path.display(), written);
	written
}


// vim: ts=4
