//! systemd unit installation (`--create-daemon`)

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::error::SysebaError;
use crate::logging::*;

pub const UNIT_PATH: &str = "/etc/systemd/system/syseba.service";
pub const UNIT_NAME: &str = "syseba.service";

/// Unit file running `exe --silent` as root, restarted on exit
pub fn unit_file(exe: &Path, working_dir: &Path) -> String {
	format!(
		"[Unit]\n\
		 Description=SySeBa - The Syncro Service Backup\n\
		 After=network.target\n\
		 \n\
		 [Service]\n\
		 ExecStart={} --silent\n\
		 WorkingDirectory={}\n\
		 Restart=always\n\
		 User=root\n\
		 Group=root\n\
		 \n\
		 [Install]\n\
		 WantedBy=multi-user.target\n",
		exe.display(),
		working_dir.display()
	)
}

/// Write the unit file, reload systemd and enable the service
pub fn install(unit_path: &Path, exe: &Path, working_dir: &Path) -> Result<(), SysebaError> {
	fs::write(unit_path, unit_file(exe, working_dir))
		.map_err(|e| SysebaError::path_io(unit_path, e))?;
	info!("Wrote {}", unit_path.display());

	systemctl(&["daemon-reload"])?;
	systemctl(&["enable", UNIT_NAME])?;
	Ok(())
}

fn systemctl(args: &[&str]) -> Result<(), SysebaError> {
	let status = Command::new("systemctl").args(args).status()?;
	if !status.success() {
		return Err(SysebaError::Other {
			message: format!("systemctl {} failed: {}", args.join(" "), status),
		});
	}
	Ok(())
}


// vim: ts=4
