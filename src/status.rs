//! Terminal status display for interactive (non-silent) runs
//!
//! Redraws every few seconds: disk usage of the source and backup trees,
//! process CPU and memory, the message log location, uptime and clock.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(3);
const BAR_LENGTH: usize = 50;

const GREEN: &str = "\x1B[92m";
const YELLOW: &str = "\x1B[93m";
const RED: &str = "\x1B[91m";
const RESET: &str = "\x1B[0m";

/// Display language for status labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
	#[default]
	It,
	En,
}

impl Lang {
	pub fn parse(code: &str) -> Option<Self> {
		match code {
			"it" => Some(Lang::It),
			"en" => Some(Lang::En),
			_ => None,
		}
	}

	fn space_used(&self) -> &'static str {
		match self {
			Lang::It => "Spazio usato",
			Lang::En => "Space used",
		}
	}

	fn log(&self) -> &'static str {
		match self {
			Lang::It => "File di log",
			Lang::En => "Log file",
		}
	}

	fn clock(&self) -> &'static str {
		match self {
			Lang::It => "Ora",
			Lang::En => "Clock",
		}
	}

	pub fn already_running(&self) -> &'static str {
		match self {
			Lang::It => "SySeBa è già in esecuzione!",
			Lang::En => "SySeBa is running!",
		}
	}
}

/// ANSI color for a usage percentage
pub fn bar_color(percentage: f64) -> &'static str {
	if percentage <= 60.0 {
		GREEN
	} else if percentage <= 85.0 {
		YELLOW
	} else {
		RED
	}
}

/// Fixed-width colored usage bar
pub fn usage_bar(percentage: f64) -> String {
	let clamped = percentage.clamp(0.0, 100.0);
	let filled = ((clamped / 100.0) * BAR_LENGTH as f64) as usize;
	format!(
		"{}{}{}{}",
		bar_color(clamped),
		"#".repeat(filled),
		"-".repeat(BAR_LENGTH - filled),
		RESET
	)
}

/// Used space of the filesystem holding `path`, in percent
fn disk_usage(disks: &Disks, path: &Path) -> Option<f64> {
	let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
	disks
		.list()
		.iter()
		.filter(|d| path.starts_with(d.mount_point()))
		.max_by_key(|d| d.mount_point().as_os_str().len())
		.filter(|d| d.total_space() > 0)
		.map(|d| {
			let used = d.total_space().saturating_sub(d.available_space());
			used as f64 * 100.0 / d.total_space() as f64
		})
}

pub struct StatusDisplay {
	source: PathBuf,
	backup: PathBuf,
	log_file: PathBuf,
	lang: Lang,
	started: Instant,
	system: System,
	pid: Option<Pid>,
}

impl StatusDisplay {
	pub fn new(source: &Path, backup: &Path, log_file: &Path, lang: Lang) -> Self {
		StatusDisplay {
			source: source.to_path_buf(),
			backup: backup.to_path_buf(),
			log_file: log_file.to_path_buf(),
			lang,
			started: Instant::now(),
			system: System::new(),
			pid: sysinfo::get_current_pid().ok(),
		}
	}

	/// Render one frame
	pub fn render(&mut self) -> String {
		let disks = Disks::new_with_refreshed_list();
		let (cpu, memory_mb) = self.process_usage();
		let mut out = String::new();

		out.push_str(RED);
		out.push_str("\n       SySeBa\nThe Syncro Service Backup\n       by okno\n");
		out.push_str(RESET);
		out.push('\n');

		for path in [&self.source, &self.backup] {
			let usage = disk_usage(&disks, path).unwrap_or(0.0);
			out.push_str(&format!("{} {}: {:.2}%\n", self.lang.space_used(), path.display(), usage));
			out.push_str(&usage_bar(usage));
			out.push('\n');
		}

		out.push_str(&format!("CPU Usage: {:.2}%\n{}\n", cpu, usage_bar(cpu)));
		out.push_str(&format!("{}{}: {}{}\n", GREEN, self.lang.log(), self.log_file.display(), RESET));
		out.push_str(&format!("Elapsed Time: {:.2} seconds\n", self.started.elapsed().as_secs_f64()));
		out.push_str(&format!("Memory Usage: {:.2} MB\n", memory_mb));
		out.push_str(&format!(
			"{}: {}\n",
			self.lang.clock(),
			chrono::Local::now().format("%H:%M:%S")
		));
		out
	}

	fn process_usage(&mut self) -> (f64, f64) {
		let Some(pid) = self.pid else {
			return (0.0, 0.0);
		};
		self.system.refresh_processes_specifics(
			ProcessesToUpdate::Some(&[pid]),
			true,
			ProcessRefreshKind::nothing().with_cpu().with_memory(),
		);
		match self.system.process(pid) {
			Some(p) => (p.cpu_usage() as f64, p.memory() as f64 / (1024.0 * 1024.0)),
			None => (0.0, 0.0),
		}
	}

	/// Redraw until `cancel` fires
	pub async fn run(mut self, cancel: CancellationToken) {
		let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
		loop {
			tokio::select! {
				_ = cancel.cancelled() => break,
				_ = ticker.tick() => {}
			}
			let frame = self.render();
			let mut stdout = std::io::stdout().lock();
			// Clear screen, cursor home
			let _ = write!(stdout, "\x1B[2J\x1B[H{}", frame);
			let _ = stdout.flush();
		}
	}
}


// vim: ts=4
