//! Filesystem helpers used by the reconciler and the workers

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Create the parent directory of `path` if it is missing
pub fn ensure_parent(path: &Path) -> io::Result<()> {
	match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
			fs::create_dir_all(parent)
		}
		_ => Ok(()),
	}
}

/// Copy `src` over `dst`, keeping permissions and access/modification times
pub fn copy_preserving(src: &Path, dst: &Path) -> io::Result<u64> {
	let bytes = fs::copy(src, dst)?;
	let meta = fs::metadata(src)?;
	filetime::set_file_times(
		dst,
		FileTime::from_last_access_time(&meta),
		FileTime::from_last_modification_time(&meta),
	)?;
	Ok(bytes)
}

/// Move a file, falling back to copy + remove across filesystems
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
	match fs::rename(src, dst) {
		Ok(()) => Ok(()),
		Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
			copy_preserving(src, dst)?;
			fs::remove_file(src)
		}
		Err(e) => Err(e),
	}
}

/// BLAKE3 digest of a file's content
pub fn file_digest(path: &Path) -> io::Result<blake3::Hash> {
	let mut file = fs::File::open(path)?;
	let mut hasher = blake3::Hasher::new();
	io::copy(&mut file, &mut hasher)?;
	Ok(hasher.finalize())
}

/// Regular files under `root` in sorted walk order
///
/// Symbolic links are neither followed nor returned. Unreadable directories
/// and entries that vanish mid-walk are skipped.
pub fn regular_files(root: &Path) -> Vec<PathBuf> {
	let mut files = Vec::new();
	collect_regular_files(root, &mut files);
	files
}

fn collect_regular_files(dir: &Path, files: &mut Vec<PathBuf>) {
	let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
		Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
		Err(_) => return,
	};
	entries.sort();

	for path in entries {
		match fs::symlink_metadata(&path) {
			Ok(meta) if meta.is_dir() => collect_regular_files(&path, files),
			Ok(meta) if meta.is_file() => files.push(path),
			_ => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_copy_preserves_mtime() {
		let tmp = TempDir::new().unwrap();
		let src = tmp.path().join("src.txt");
		let dst = tmp.path().join("dst.txt");
		fs::write(&src, "payload").unwrap();
		let mtime = FileTime::from_unix_time(1_600_000_000, 0);
		filetime::set_file_mtime(&src, mtime).unwrap();

		assert_eq!(copy_preserving(&src, &dst).unwrap(), 7);

		let meta = fs::metadata(&dst).unwrap();
		assert_eq!(FileTime::from_last_modification_time(&meta), mtime);
		assert_eq!(fs::read_to_string(&dst).unwrap(), "payload");
	}

	#[test]
	fn test_copy_overwrites_existing() {
		let tmp = TempDir::new().unwrap();
		let src = tmp.path().join("src.txt");
		let dst = tmp.path().join("dst.txt");
		fs::write(&src, "new").unwrap();
		fs::write(&dst, "old and longer").unwrap();

		copy_preserving(&src, &dst).unwrap();
		assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
	}

	#[test]
	fn test_move_file_relocates() {
		let tmp = TempDir::new().unwrap();
		let src = tmp.path().join("a.txt");
		let dst = tmp.path().join("deep/dir/a.txt");
		fs::write(&src, "keep me").unwrap();

		ensure_parent(&dst).unwrap();
		move_file(&src, &dst).unwrap();

		assert!(!src.exists());
		assert_eq!(fs::read_to_string(&dst).unwrap(), "keep me");
	}

	#[test]
	fn test_regular_files_walks_sorted() {
		let tmp = TempDir::new().unwrap();
		fs::create_dir_all(tmp.path().join("b/c")).unwrap();
		fs::create_dir_all(tmp.path().join("empty")).unwrap();
		fs::write(tmp.path().join("b/c/z.txt"), "").unwrap();
		fs::write(tmp.path().join("b/a.txt"), "").unwrap();
		fs::write(tmp.path().join("a.txt"), "").unwrap();

		let files: Vec<PathBuf> = regular_files(tmp.path())
			.into_iter()
			.map(|p| p.strip_prefix(tmp.path()).unwrap().to_path_buf())
			.collect();
		assert_eq!(
			files,
			vec![PathBuf::from("a.txt"), PathBuf::from("b/a.txt"), PathBuf::from("b/c/z.txt")]
		);
		assert!(regular_files(&tmp.path().join("missing")).is_empty());
	}

	#[test]
	fn test_file_digest_tracks_content() {
		let tmp = TempDir::new().unwrap();
		let a = tmp.path().join("a");
		let b = tmp.path().join("b");
		fs::write(&a, "same").unwrap();
		fs::write(&b, "same").unwrap();
		assert_eq!(file_digest(&a).unwrap(), file_digest(&b).unwrap());

		fs::write(&b, "different").unwrap();
		assert_ne!(file_digest(&a).unwrap(), file_digest(&b).unwrap());
	}
}

// vim: ts=4
