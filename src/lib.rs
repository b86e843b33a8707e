//! # SySeBa - The Syncro Service Backup
//!
//! SySeBa keeps a backup tree continuously mirrored from a source tree. Files
//! removed from the source are not lost: their backup copy is moved into a
//! restore tree with the same relative layout.
//!
//! The engine is made of:
//! - an initial reconciliation pass ([`reconcile`]),
//! - a recursive filesystem subscription ([`watcher`]) normalizing changes
//!   into create / modify / delete operations,
//! - a fixed-size worker pool ([`worker`]) applying them,
//! - an append-only audit store ([`audit`]) and a single-writer message log
//!   ([`message_log`]).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syseba::{Engine, ProcessContext, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(None)?;
//!     let report = Engine::new(settings, ProcessContext::unlocked())
//!         .run_until(syseba::utils::shutdown_signal())
//!         .await?;
//!     println!("Applied {} operations", report.workers.stats.applied);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod logging;
pub mod message_log;
pub mod reconcile;
pub mod service;
pub mod status;
pub mod types;
pub mod util;
pub mod utils;
pub mod watcher;
pub mod worker;

// Re-export commonly used types and functions
pub use audit::{AuditLog, AuditOperation, AuditRecord};
pub use config::{Settings, VerifyPolicy};
pub use engine::{Engine, EngineReport, EngineState, RunningEngine};
pub use error::SysebaError;
pub use lock::{InstanceLock, ProcessContext};
pub use types::{OperationKind, SyncOperation, Trees};

// vim: ts=4
