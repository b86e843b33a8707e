//! Logging prelude module for convenient access to tracing macros.
//!
//! Diagnostics go through `tracing` to stderr. The operator-facing message
//! log file is a separate channel, see [`crate::message_log`].
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Watching {}", source.display());
//! warn!("Audit write failed: {}", err);
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `default_level` is used:
///
/// ```bash
/// RUST_LOG=debug syseba --silent
/// RUST_LOG=syseba::worker=trace syseba
/// ```
pub fn init_tracing(default_level: &str) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
