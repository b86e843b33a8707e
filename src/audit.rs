//! Durable, append-only audit trail
//!
//! Every operation the engine attempts ends up as exactly one row in the
//! `logs` table, successes and failures alike. Rows are never updated or
//! removed by the service; retention is somebody else's job.

use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::SysebaError;

/// Table definition for audit rows
/// Key: auto-increment id, starting at 1
/// Value: JSON-serialized AuditRecord
const LOGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("logs");

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
	/// File copied by the initial reconciliation
	Copy,
	Create,
	Modify,
	/// Backup copy moved to the restore tree
	Delete,
	Info,
	Error,
}

impl AuditOperation {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditOperation::Copy => "COPY",
			AuditOperation::Create => "CREATE",
			AuditOperation::Modify => "MODIFY",
			AuditOperation::Delete => "DELETE",
			AuditOperation::Info => "INFO",
			AuditOperation::Error => "ERROR",
		}
	}
}

impl fmt::Display for AuditOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One row of the `logs` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
	pub id: u64,
	pub timestamp: String,
	pub operation: String,
	pub source_path: String,
	pub target_path: Option<String>,
	pub additional_info: Option<String>,
}

/// Audit store backed by a redb database
///
/// The handle is meant to be shared behind an `Arc`. Each [`AuditLog::record`]
/// call runs in its own write transaction, so concurrent callers never share
/// transaction state; redb serializes the writers.
pub struct AuditLog {
	db: redb::Database,
	path: PathBuf,
}

impl AuditLog {
	/// Open or create the audit store
	pub fn open(path: &Path) -> Result<Self, SysebaError> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent).map_err(|e| SysebaError::path_io(parent, e))?;
			}
		}

		let db = redb::Database::create(path)?;
		Self::ensure_table(&db)?;
		Ok(AuditLog { db, path: path.to_path_buf() })
	}

	fn ensure_table(db: &redb::Database) -> Result<(), redb::Error> {
		let write_txn = db.begin_write()?;
		let _ = write_txn.open_table(LOGS_TABLE)?;
		write_txn.commit()?;
		Ok(())
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Append one record with a generated timestamp, returning its id
	pub fn record(
		&self,
		operation: AuditOperation,
		source_path: &str,
		target_path: Option<&str>,
		info: Option<&str>,
	) -> Result<u64, SysebaError> {
		let mut record = AuditRecord {
			id: 0,
			timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
			operation: operation.as_str().to_string(),
			source_path: source_path.to_string(),
			target_path: target_path.map(str::to_string),
			additional_info: info.map(str::to_string),
		};
		self.append(&mut record)
	}

	/// Convenience wrapper taking filesystem paths
	pub fn record_paths(
		&self,
		operation: AuditOperation,
		source_path: &Path,
		target_path: Option<&Path>,
		info: Option<&str>,
	) -> Result<u64, SysebaError> {
		let target = target_path.map(|p| p.to_string_lossy());
		self.record(operation, &source_path.to_string_lossy(), target.as_deref(), info)
	}

	fn append(&self, record: &mut AuditRecord) -> Result<u64, SysebaError> {
		let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
		{
			let mut table = write_txn.open_table(LOGS_TABLE).map_err(redb::Error::from)?;
			let last = table.last().map_err(redb::Error::from)?.map(|(k, _)| k.value());
			record.id = last.unwrap_or(0) + 1;

			let bytes = serde_json::to_vec(&*record)?;
			table.insert(record.id, bytes.as_slice()).map_err(redb::Error::from)?;
		}
		write_txn.commit().map_err(redb::Error::from)?;
		Ok(record.id)
	}

	/// Newest records first, at most `limit` of them
	pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, SysebaError> {
		let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
		let table = read_txn.open_table(LOGS_TABLE).map_err(redb::Error::from)?;

		let mut records = Vec::new();
		for entry in table.iter().map_err(redb::Error::from)?.rev().take(limit) {
			let (_, value) = entry.map_err(redb::Error::from)?;
			records.push(serde_json::from_slice(value.value())?);
		}
		Ok(records)
	}

	/// Number of stored records
	pub fn count(&self) -> Result<u64, SysebaError> {
		let read_txn = self.db.begin_read().map_err(redb::Error::from)?;
		let table = read_txn.open_table(LOGS_TABLE).map_err(redb::Error::from)?;
		Ok(table.len().map_err(redb::Error::from)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use tempfile::TempDir;

	#[test]
	fn test_record_assigns_increasing_ids() {
		let tmp = TempDir::new().unwrap();
		let audit = AuditLog::open(&tmp.path().join("audit.db")).unwrap();

		let first = audit.record(AuditOperation::Copy, "/dati/a", Some("/backup/a"), None).unwrap();
		let second = audit
			.record(AuditOperation::Error, "/dati/b", None, Some("permission denied"))
			.unwrap();

		assert_eq!(first, 1);
		assert_eq!(second, 2);
		assert_eq!(audit.count().unwrap(), 2);
	}

	#[test]
	fn test_recent_returns_newest_first() {
		let tmp = TempDir::new().unwrap();
		let audit = AuditLog::open(&tmp.path().join("audit.db")).unwrap();

		for name in ["a", "b", "c"] {
			audit.record(AuditOperation::Create, name, None, None).unwrap();
		}

		let recent = audit.recent(2).unwrap();
		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].source_path, "c");
		assert_eq!(recent[0].id, 3);
		assert_eq!(recent[1].source_path, "b");
		assert_eq!(recent[0].operation, "CREATE");
		assert_eq!(recent[0].timestamp.len(), "2024-01-01 00:00:00".len());
	}

	#[test]
	fn test_optional_fields_round_trip() {
		let tmp = TempDir::new().unwrap();
		let audit = AuditLog::open(&tmp.path().join("audit.db")).unwrap();

		audit
			.record(AuditOperation::Delete, "/backup/x", Some("/restore/x"), Some("Moved to restore"))
			.unwrap();
		audit.record(AuditOperation::Info, "Initial sync completed.", None, None).unwrap();

		let recent = audit.recent(10).unwrap();
		assert_eq!(recent[0].target_path, None);
		assert_eq!(recent[0].additional_info, None);
		assert_eq!(recent[1].target_path.as_deref(), Some("/restore/x"));
		assert_eq!(recent[1].additional_info.as_deref(), Some("Moved to restore"));
	}

	#[test]
	fn test_reopen_continues_id_sequence() {
		let tmp = TempDir::new().unwrap();
		let db_path = tmp.path().join("audit.db");
		{
			let audit = AuditLog::open(&db_path).unwrap();
			audit.record(AuditOperation::Info, "first", None, None).unwrap();
		}
		let audit = AuditLog::open(&db_path).unwrap();
		assert_eq!(audit.record(AuditOperation::Info, "second", None, None).unwrap(), 2);
	}

	#[test]
	fn test_concurrent_writers_produce_unique_ids() {
		let tmp = TempDir::new().unwrap();
		let audit = Arc::new(AuditLog::open(&tmp.path().join("audit.db")).unwrap());

		let handles: Vec<_> = (0..4)
			.map(|t| {
				let audit = Arc::clone(&audit);
				std::thread::spawn(move || {
					for i in 0..10 {
						audit
							.record(AuditOperation::Modify, &format!("t{}-{}", t, i), None, None)
							.unwrap();
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}

		let mut ids: Vec<u64> = audit.recent(100).unwrap().iter().map(|r| r.id).collect();
		ids.sort_unstable();
		assert_eq!(ids, (1..=40).collect::<Vec<u64>>());
	}
}

// vim: ts=4
