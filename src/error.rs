//! Error types for SySeBa

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for the backup service
///
/// Only the configuration and start-up variants ever terminate the process.
/// Everything raised while applying a single operation is recorded in the
/// audit store and swallowed by the worker that hit it.
#[derive(Debug)]
pub enum SysebaError {
	/// I/O error
	Io(io::Error),

	/// I/O error tied to a specific path
	PathIo { path: PathBuf, source: io::Error },

	/// No configuration file in any of the searched locations
	ConfigNotFound { searched: Vec<PathBuf> },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// Another instance holds the lock file
	AlreadyRunning { pid: u32 },

	/// Lock acquisition failed
	LockFailed { message: String },

	/// Audit store failure
	Audit { message: String },

	/// Filesystem subscription failure
	Watch { message: String },

	/// Path does not belong to the tree it was resolved against
	OutsideTree { path: PathBuf, root: PathBuf },

	/// Generic error message
	Other { message: String },
}

impl SysebaError {
	pub fn path_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		SysebaError::PathIo { path: path.into(), source }
	}
}

impl fmt::Display for SysebaError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SysebaError::Io(e) => write!(f, "I/O error: {}", e),
			SysebaError::PathIo { path, source } => {
				write!(f, "{}: {}", path.display(), source)
			}
			SysebaError::ConfigNotFound { searched } => {
				let list: Vec<String> = searched.iter().map(|p| p.display().to_string()).collect();
				write!(f, "Config file not found (searched: {})", list.join(", "))
			}
			SysebaError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SysebaError::AlreadyRunning { pid } => {
				write!(f, "SySeBa is already running (pid {})", pid)
			}
			SysebaError::LockFailed { message } => {
				write!(f, "Lock acquisition failed: {}", message)
			}
			SysebaError::Audit { message } => write!(f, "Audit store error: {}", message),
			SysebaError::Watch { message } => write!(f, "Watch error: {}", message),
			SysebaError::OutsideTree { path, root } => {
				write!(f, "{} is not under {}", path.display(), root.display())
			}
			SysebaError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SysebaError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SysebaError::Io(e) => Some(e),
			SysebaError::PathIo { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<io::Error> for SysebaError {
	fn from(e: io::Error) -> Self {
		SysebaError::Io(e)
	}
}

impl From<redb::Error> for SysebaError {
	fn from(e: redb::Error) -> Self {
		SysebaError::Audit { message: e.to_string() }
	}
}

impl From<redb::DatabaseError> for SysebaError {
	fn from(e: redb::DatabaseError) -> Self {
		SysebaError::Audit { message: e.to_string() }
	}
}

impl From<serde_json::Error> for SysebaError {
	fn from(e: serde_json::Error) -> Self {
		SysebaError::Audit { message: format!("record encoding: {}", e) }
	}
}

impl From<notify::Error> for SysebaError {
	fn from(e: notify::Error) -> Self {
		SysebaError::Watch { message: e.to_string() }
	}
}

impl From<toml::de::Error> for SysebaError {
	fn from(e: toml::de::Error) -> Self {
		SysebaError::InvalidConfig { message: e.to_string() }
	}
}

impl From<String> for SysebaError {
	fn from(e: String) -> Self {
		SysebaError::Other { message: e }
	}
}


// vim: ts=4
