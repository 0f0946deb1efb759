use std::process::Command;
use crate::rewrite::FinalCommand;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Replace the current process image; returns only on failure.
    Replace,
    /// Run the command as a child and report its exit code.
    SpawnAndWait,
}

impl LaunchMode {
    /// What the current platform supports.
    pub fn native() -> Self {
        if cfg!(unix) {
            LaunchMode::Replace
        } else {
            LaunchMode::SpawnAndWait
        }
    }
}

/// Hands the process over to `command`. On success with [`LaunchMode::Replace`]
/// this never returns; otherwise the child's exit code is returned.
pub fn launch(command: &FinalCommand, mode: LaunchMode) -> Result<i32> {
    log::info!("Starting {}", command.program.display());
    log::logger().flush();

    match mode {
        LaunchMode::Replace => replace_process(command),
        LaunchMode::SpawnAndWait => spawn_and_wait(command),
    }
}

#[cfg(unix)]
fn replace_process(command: &FinalCommand) -> Result<i32> {
    use std::os::unix::process::CommandExt;

    let err = Command::new(&command.program).args(&command.args).exec();
    Err(Error::Launch(format!("cannot exec {}: {}", command.program.display(), err)))
}

#[cfg(not(unix))]
fn replace_process(command: &FinalCommand) -> Result<i32> {
    spawn_and_wait(command)
}

pub fn spawn_and_wait(command: &FinalCommand) -> Result<i32> {
    let status = Command::new(&command.program)
        .args(&command.args)
        .status()
        .map_err(|e| Error::Launch(format!("cannot start {}: {}", command.program.display(), e)))?;

    Ok(exit_code(status))
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
