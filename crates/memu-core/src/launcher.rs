use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use tracing::debug;

use crate::error::LaunchFailure;

/// Runs one external command to completion and hands back its stdout.
///
/// Implementations block until the process exits. A non-zero exit status is
/// not a failure here: memuc reports its own status on stdout, and the
/// response framer decides what it means.
pub trait Launcher: Send + Sync {
    fn run(&self, program: &Path, args: &[String]) -> Result<Vec<u8>, LaunchFailure>;
}

/// Spawns real processes through `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn run(&self, program: &Path, args: &[String]) -> Result<Vec<u8>, LaunchFailure> {
        debug!(program = %program.display(), ?args, "spawning");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| launch_failure(program, err))?;

        debug!(
            status = output.status.code().unwrap_or(-1),
            stdout_bytes = output.stdout.len(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "process exited"
        );
        Ok(output.stdout)
    }
}

fn launch_failure(program: &Path, err: io::Error) -> LaunchFailure {
    if err.kind() == io::ErrorKind::NotFound {
        LaunchFailure::NotFound(program.display().to_string())
    } else {
        LaunchFailure::Io(err)
    }
}

/// Program plus argument vector for one memuc call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn run(&self, launcher: &dyn Launcher) -> Result<Vec<u8>, LaunchFailure> {
        launcher.run(&self.program, &self.args)
    }
}
