use std::process::Command;

use crate::error::GatewayError;

/// Commands the provisioning flow shells out to, with an argument that makes them exit
/// quickly.
pub const COMMANDS: [(&str, &str); 4] = [
    ("wg", "--version"),
    ("wg-quick", "-h"),
    ("systemctl", "--version"),
    ("curl", "--version"),
];

/// Check if the given commands are available.
///
/// Only the ability to spawn matters; exit status is ignored since some tools (`wg-quick -h`)
/// exit non-zero when printing usage.
pub fn check_external_dependencies(commands: &[(&str, &str)]) -> Result<(), GatewayError> {
    for (cmd, arg) in commands {
        debug!("Checking if command `{cmd}` is available by running: {cmd} {arg}");
        Command::new(cmd).arg(arg).output().map_err(|err| {
            GatewayError::MissingDependency(format!(
                "Command `{cmd}` required by wg-gateway couldn't be found, details: {err}"
            ))
        })?;
        debug!("Command `{cmd}` is available");
    }

    Ok(())
}

/// Fail unless the effective user is root.
#[cfg(unix)]
pub fn ensure_root() -> Result<(), GatewayError> {
    if nix::unistd::geteuid().is_root() {
        Ok(())
    } else {
        Err(GatewayError::Privilege)
    }
}

#[cfg(not(unix))]
pub fn ensure_root() -> Result<(), GatewayError> {
    Err(GatewayError::Privilege)
}
