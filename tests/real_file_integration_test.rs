/// Real file integration tests - run the whole engine against temp trees
///
/// These tests start the engine with a live filesystem subscription, touch
/// files under the source tree and wait for the backup and restore trees to
/// reflect the change.
///
/// Tests verify:
/// 1. Files added or modified while running show up in backup
/// 2. Deleted files move from backup to restore
/// 3. The start-up reconciliation and live watching cooperate
/// 4. Every action lands in the audit store and the message log
/// 5. Directories created, moved in or renamed carry their files along
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use syseba::{Engine, ProcessContext, RunningEngine, Settings, SyncOperation};

const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Helper building settings rooted in a temp dir
fn settings_in(root: &Path) -> Settings {
	Settings {
		source: root.join("dati"),
		backup: root.join("backup"),
		restore: root.join("restore"),
		log: root.join("log/syseba.log"),
		threads: 4,
		database: root.join("syseba_logs.db"),
		lockfile: root.join("syseba.lock"),
		drain_timeout_secs: 10,
		..Settings::default()
	}
}

/// Helper to create a file (and its parents) with specific content
fn create_file(dir: &Path, name: &str, content: &str) -> PathBuf {
	let path = dir.join(name);
	fs::create_dir_all(path.parent().unwrap()).unwrap();
	fs::write(&path, content).unwrap();
	path
}

/// Helper to read file content (returns None if file doesn't exist)
fn read_file(dir: &Path, name: &str) -> Option<String> {
	fs::read_to_string(dir.join(name)).ok()
}

/// Poll `check` until it holds or the timeout expires
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
	let deadline = tokio::time::Instant::now() + CONVERGENCE_TIMEOUT;
	while tokio::time::Instant::now() < deadline {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	check()
}

async fn start(settings: &Settings) -> RunningEngine {
	let mut running = Engine::new(settings.clone(), ProcessContext::unlocked())
		.start()
		.await
		.expect("engine should start");
	running.wait_for_reconcile().await.expect("reconciliation should finish");
	running
}

// ===================================================================
// END-TO-END SCENARIO
// ===================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_modify_delete_scenario() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	create_file(&settings.source, "a/b.txt", "X");

	let running = start(&settings).await;

	// First reconciliation pass copies the file
	assert_eq!(read_file(&settings.backup, "a/b.txt"), Some("X".to_string()));

	// Modify while watching
	create_file(&settings.source, "a/b.txt", "Y");
	assert!(
		eventually(|| read_file(&settings.backup, "a/b.txt").as_deref() == Some("Y")).await,
		"backup should converge to the modified content"
	);

	// Delete while watching
	fs::remove_file(settings.source.join("a/b.txt")).unwrap();
	assert!(
		eventually(|| read_file(&settings.restore, "a/b.txt").as_deref() == Some("Y")).await,
		"deleted file should land in restore"
	);
	assert!(!settings.backup.join("a/b.txt").exists(), "backup copy should be gone");

	let operations: Vec<String> =
		running.audit().recent(100).unwrap().into_iter().map(|r| r.operation).collect();
	assert!(operations.contains(&"COPY".to_string()));
	assert!(operations.contains(&"MODIFY".to_string()));
	assert!(operations.contains(&"DELETE".to_string()));

	let report = running.shutdown().await;
	assert!(report.workers.stats.applied >= 2);

	let log = fs::read_to_string(&settings.log).unwrap();
	assert!(log.contains("Copied: "));
	assert!(log.contains("Initial sync completed."));
	assert!(log.contains("Moved to restore: "));
}

// ===================================================================
// CONVERGENCE
// ===================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_files_converge() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	fs::create_dir_all(settings.source.join("docs")).unwrap();

	let running = start(&settings).await;

	for i in 0..10 {
		create_file(&settings.source, &format!("docs/file{}.txt", i), &format!("content {}", i));
	}

	for i in 0..10 {
		let name = format!("docs/file{}.txt", i);
		let expected = format!("content {}", i);
		assert!(
			eventually(|| read_file(&settings.backup, &name).as_deref() == Some(expected.as_str()))
				.await,
			"{} should be mirrored",
			name
		);
	}

	running.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_without_backup_leaves_restore_empty() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	fs::create_dir_all(&settings.source).unwrap();

	let running = start(&settings).await;

	// Never mirrored, so there is nothing to move into restore
	let ghost = running.trees().source.join("ghost.txt");
	assert!(running.queue().push(SyncOperation::delete(&ghost)));

	let report = running.shutdown().await;
	assert_eq!(report.workers.stats.skipped, 1);
	assert_eq!(fs::read_dir(&settings.restore).unwrap().count(), 0);
}

// ===================================================================
// DIRECTORIES
// ===================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_moved_into_source_is_mirrored() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	fs::create_dir_all(&settings.source).unwrap();
	let outside = tmp.path().join("elsewhere/proj");
	create_file(&outside, "f.txt", "moved in");
	create_file(&outside, "deep/g.txt", "nested");

	let running = start(&settings).await;

	fs::rename(&outside, settings.source.join("proj")).unwrap();
	assert!(
		eventually(|| read_file(&settings.backup, "proj/f.txt").as_deref() == Some("moved in")).await,
		"files of a moved-in directory should be mirrored"
	);
	assert!(
		eventually(|| read_file(&settings.backup, "proj/deep/g.txt").as_deref() == Some("nested"))
			.await
	);

	running.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_directory_rename_inside_source() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	create_file(&settings.source, "old/a.txt", "A");
	create_file(&settings.source, "old/sub/b.txt", "B");

	let running = start(&settings).await;
	assert_eq!(read_file(&settings.backup, "old/a.txt"), Some("A".to_string()));

	fs::rename(settings.source.join("old"), settings.source.join("new")).unwrap();

	assert!(
		eventually(|| {
			read_file(&settings.backup, "new/a.txt").as_deref() == Some("A")
				&& read_file(&settings.backup, "new/sub/b.txt").as_deref() == Some("B")
		})
		.await,
		"renamed directory should be mirrored under its new name"
	);
	assert!(
		eventually(|| {
			read_file(&settings.restore, "old/a.txt").as_deref() == Some("A")
				&& read_file(&settings.restore, "old/sub/b.txt").as_deref() == Some("B")
		})
		.await,
		"old backup copies should move to restore"
	);
	assert!(!settings.backup.join("old/a.txt").exists());

	running.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_files_written_right_after_mkdir_are_mirrored() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	fs::create_dir_all(&settings.source).unwrap();

	let running = start(&settings).await;

	let dir = settings.source.join("fresh");
	fs::create_dir(&dir).unwrap();
	for i in 0..5 {
		fs::write(dir.join(format!("{}.txt", i)), format!("n{}", i)).unwrap();
	}

	for i in 0..5 {
		let name = format!("fresh/{}.txt", i);
		let expected = format!("n{}", i);
		assert!(
			eventually(|| read_file(&settings.backup, &name).as_deref() == Some(expected.as_str()))
				.await,
			"{} should be mirrored",
			name
		);
	}

	running.shutdown().await;
}

// ===================================================================
// RESTART
// ===================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_does_not_recopy() {
	let tmp = TempDir::new().unwrap();
	let settings = settings_in(tmp.path());
	create_file(&settings.source, "one.txt", "1");
	create_file(&settings.source, "nested/two.txt", "2");

	let mut first = Engine::new(settings.clone(), ProcessContext::unlocked()).start().await.unwrap();
	assert_eq!(first.wait_for_reconcile().await.unwrap().copied, 2);
	first.shutdown().await;

	let mut second = Engine::new(settings.clone(), ProcessContext::unlocked()).start().await.unwrap();
	let report = second.wait_for_reconcile().await.unwrap();
	assert_eq!(report.copied, 0);
	assert_eq!(report.skipped, 2);
	second.shutdown().await;
}

// vim: ts=4
