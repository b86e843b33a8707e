//! Service configuration
//!
//! The configuration file is TOML with a single `[SETTINGS]` table:
//!
//! ```toml
//! [SETTINGS]
//! source = "/dati"
//! backup = "/backup"
//! restore = "/restore"
//! log = "/var/log/syseba.log"
//! threads = 4
//! ```
//!
//! Every key is optional and falls back to its default, but the table
//! itself must be present. Lookup order for the file is the explicit
//! `--config` path (if it exists), then [`CONFIG_SEARCH_PATHS`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SysebaError;

/// Locations probed when no explicit config path is given (or it is missing)
pub const CONFIG_SEARCH_PATHS: &[&str] =
	&["syseba.conf", "/etc/syseba/syseba.conf", "/opt/syseba/syseba.conf"];

/// How the initial reconciliation treats a file that already has a backup copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyPolicy {
	/// Any existing backup file counts as up to date
	#[default]
	Existence,
	/// Compare BLAKE3 digests and recopy on mismatch
	Checksum,
}

/// Runtime settings of the backup service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Tree being protected (read-only from our side)
	pub source: PathBuf,

	/// Live mirror of `source`
	pub backup: PathBuf,

	/// Graveyard for files removed from `source`
	pub restore: PathBuf,

	/// Human-readable message log
	pub log: PathBuf,

	/// Number of workers applying operations
	pub threads: usize,

	/// Audit store
	pub database: PathBuf,

	/// Singleton lock file holding the owning pid
	pub lockfile: PathBuf,

	/// Initial reconciliation policy for existing backup files
	pub verify: VerifyPolicy,

	/// How long shutdown waits for queued operations before cancelling workers
	pub drain_timeout_secs: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Settings {
			source: PathBuf::from("/dati"),
			backup: PathBuf::from("/backup"),
			restore: PathBuf::from("/restore"),
			log: PathBuf::from("/var/log/syseba.log"),
			threads: 4,
			database: PathBuf::from("/opt/syseba/syseba_logs.db"),
			lockfile: PathBuf::from("/opt/syseba/syseba.lock"),
			verify: VerifyPolicy::Existence,
			drain_timeout_secs: 5,
		}
	}
}

impl Settings {
	/// Parse settings from the text of a configuration file
	pub fn from_toml(text: &str) -> Result<Self, SysebaError> {
		let file: ConfigFile = toml::from_str(text)?;
		let settings = file.settings.ok_or_else(|| SysebaError::InvalidConfig {
			message: "Invalid or missing config file! ([SETTINGS] section not found)".to_string(),
		})?;
		settings.validate()?;
		Ok(settings)
	}

	/// Locate and load the configuration file
	pub fn load(explicit: Option<&Path>) -> Result<Self, SysebaError> {
		let path = find_config_file(explicit)?;
		let text = fs::read_to_string(&path).map_err(|e| SysebaError::path_io(&path, e))?;
		Self::from_toml(&text)
	}

	pub fn validate(&self) -> Result<(), SysebaError> {
		if self.threads == 0 {
			return Err(SysebaError::InvalidConfig {
				message: "threads must be at least 1".to_string(),
			});
		}
		if self.source == self.backup || self.source == self.restore {
			return Err(SysebaError::InvalidConfig {
				message: format!(
					"source {} must differ from backup and restore",
					self.source.display()
				),
			});
		}
		if self.backup.starts_with(&self.source) || self.restore.starts_with(&self.source) {
			return Err(SysebaError::InvalidConfig {
				message: "backup and restore must not live inside source".to_string(),
			});
		}
		Ok(())
	}

	pub fn drain_timeout(&self) -> Duration {
		Duration::from_secs(self.drain_timeout_secs)
	}
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
	#[serde(rename = "SETTINGS")]
	settings: Option<Settings>,
}

/// Resolve the configuration file path
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf, SysebaError> {
	if let Some(path) = explicit {
		if path.exists() {
			return Ok(path.to_path_buf());
		}
	}

	let candidates: Vec<PathBuf> = CONFIG_SEARCH_PATHS.iter().map(PathBuf::from).collect();
	if let Some(found) = candidates.iter().find(|p| p.exists()) {
		return Ok(found.clone());
	}

	let mut searched: Vec<PathBuf> = explicit.map(|p| vec![p.to_path_buf()]).unwrap_or_default();
	searched.extend(candidates);
	Err(SysebaError::ConfigNotFound { searched })
}


// vim: ts=4
