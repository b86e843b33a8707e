use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use syseba::logging::*;
use syseba::status::{Lang, StatusDisplay};
use syseba::{service, utils, AuditLog, Engine, InstanceLock, ProcessContext, Settings, SysebaError};

const DEFAULT_AUDIT_LIMIT: usize = 20;

fn cli() -> Command {
	Command::new("SySeBa")
		.version(env!("CARGO_PKG_VERSION"))
		.author("okno")
		.about("SySeBa - The Syncro Service Backup")
		.arg(
			Arg::new("config")
				.long("config")
				.value_name("PATH")
				.value_parser(value_parser!(PathBuf))
				.global(true)
				.help("Specify custom config file path"),
		)
		.arg(
			Arg::new("silent")
				.long("silent")
				.action(ArgAction::SetTrue)
				.help("Run in silent mode (log only)"),
		)
		.arg(
			Arg::new("lang")
				.long("lang")
				.value_parser(["it", "en"])
				.default_value("it")
				.help("Select language (it or en)"),
		)
		.arg(
			Arg::new("create-daemon")
				.long("create-daemon")
				.action(ArgAction::SetTrue)
				.help("Create and enable SySeBa as a systemd service"),
		)
		.subcommand(
			Command::new("audit").about("Show the most recent audit records").arg(
				Arg::new("limit")
					.long("limit")
					.short('n')
					.value_parser(value_parser!(usize))
					.help("Number of records to show"),
			),
		)
}

#[tokio::main]
async fn main() -> ExitCode {
	let matches = cli().get_matches();
	let silent = matches.get_flag("silent");
	init_tracing(if silent { "warn" } else { "info" });

	match run(&matches, silent).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			if silent {
				error!("{}", e);
			} else {
				eprintln!("{}", e);
			}
			ExitCode::FAILURE
		}
	}
}

async fn run(matches: &ArgMatches, silent: bool) -> Result<(), SysebaError> {
	let lang = matches.get_one::<String>("lang").and_then(|l| Lang::parse(l)).unwrap_or_default();
	let config_path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);

	if matches.get_flag("create-daemon") {
		let exe = std::env::current_exe()?;
		let working_dir = exe.parent().unwrap_or(Path::new("/")).to_path_buf();
		service::install(Path::new(service::UNIT_PATH), &exe, &working_dir)?;
		println!("Systemd service created and enabled.");
		return Ok(());
	}

	let settings = Settings::load(config_path)?;

	if let Some(sub) = matches.subcommand_matches("audit") {
		let limit = sub.get_one::<usize>("limit").copied().unwrap_or(DEFAULT_AUDIT_LIMIT);
		return print_audit(&settings, limit);
	}

	let lock = match InstanceLock::acquire(&settings.lockfile) {
		Ok(lock) => lock,
		Err(SysebaError::AlreadyRunning { pid }) => {
			return Err(SysebaError::Other {
				message: format!("{} (pid {})", lang.already_running(), pid),
			});
		}
		Err(e) => return Err(e),
	};

	let engine = Engine::new(settings.clone(), ProcessContext::locked(lock));

	if silent {
		engine.run_until(utils::shutdown_signal()).await?;
		return Ok(());
	}

	let display_cancel = CancellationToken::new();
	let display = StatusDisplay::new(&settings.source, &settings.backup, &settings.log, lang);
	let display_task = tokio::spawn(display.run(display_cancel.clone()));

	let result = engine.run_until(utils::shutdown_signal()).await;
	display_cancel.cancel();
	let _ = display_task.await;
	result.map(|_| ())
}

fn print_audit(settings: &Settings, limit: usize) -> Result<(), SysebaError> {
	let audit = AuditLog::open(&settings.database)?;
	for record in audit.recent(limit)?.iter().rev() {
		println!(
			"{:>6}  {}  {:<6}  {}{}{}",
			record.id,
			record.timestamp,
			record.operation,
			record.source_path,
			record.target_path.as_deref().map(|t| format!(" -> {}", t)).unwrap_or_default(),
			record.additional_info.as_deref().map(|i| format!("  ({})", i)).unwrap_or_default(),
		);
	}
	Ok(())
}

// vim: ts=4
