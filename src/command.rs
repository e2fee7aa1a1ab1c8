//! Blocking execution of external programs.

use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

use crate::GatewayError;

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn check_status(command: String, output: Output) -> Result<String, GatewayError> {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!("Command `{command}` failed with {}: {stderr}", output.status);
        Err(GatewayError::CommandExecutionError {
            command,
            stdout,
            stderr,
        })
    }
}

/// Run `program` with `args`, wait for it, and return its trimmed standard output.
///
/// A non-zero exit status is reported as [`GatewayError::CommandExecutionError`].
pub(crate) fn run(program: &str, args: &[&str]) -> Result<String, GatewayError> {
    let command = command_line(program, args);
    debug!("Executing command: {command}");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| GatewayError::CommandExecutionFailed {
            command: command.clone(),
            source,
        })?;
    check_status(command, output)
}

/// Same as [`run`], but pipes `input` to the standard input of the program.
pub(crate) fn run_with_stdin(
    program: &str,
    args: &[&str],
    input: &str,
) -> Result<String, GatewayError> {
    let command = command_line(program, args);
    debug!("Executing command with piped input: {command}");
    let spawn_error = |source| GatewayError::CommandExecutionFailed {
        command: command.clone(),
        source,
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;
    if let Some(mut stdin) = child.stdin.take() {
        writeln!(stdin, "{input}").map_err(spawn_error)?;
    }
    let output = child.wait_with_output().map_err(spawn_error)?;
    check_status(command, output)
}
