//! Process-level stop signals

use tracing::{debug, warn};

/// Resolves on the first SIGINT or SIGTERM (ctrl-c elsewhere)
///
/// If a handler cannot be installed the future falls back to the remaining
/// one instead of resolving immediately.
#[cfg(unix)]
pub async fn shutdown_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => Some(stream),
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Only SIGINT will stop the service.", e);
			None
		}
	};

	let sigterm_recv = async {
		match sigterm.as_mut() {
			Some(stream) => {
				stream.recv().await;
			}
			None => std::future::pending::<()>().await,
		}
	};

	tokio::select! {
		_ = sigterm_recv => debug!("Received SIGTERM, shutting down..."),
		res = tokio::signal::ctrl_c() => match res {
			Ok(()) => debug!("Received SIGINT, shutting down..."),
			Err(e) => {
				warn!("Failed to listen for SIGINT: {}", e);
				std::future::pending::<()>().await;
			}
		},
	}
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!("Failed to listen for ctrl-c: {}", e);
		std::future::pending::<()>().await;
	}
	debug!("Received ctrl-c, shutting down...");
}

// vim: ts=4
