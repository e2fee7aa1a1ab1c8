use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("This tool must be run as root")]
    Privilege,
    #[error("Declared client list {} not found", .0.display())]
    MissingInput(PathBuf),
    #[error("Provided port `{0}` does not seem to be a valid port number")]
    InvalidPort(String),
    #[error("Command `{command}` returned error status: {stderr}")]
    CommandExecutionError {
        command: String,
        stdout: String,
        stderr: String,
    },
    #[error("Failed to execute `{command}`: {source}")]
    CommandExecutionFailed {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} executable not found in system PATH")]
    MissingDependency(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WireGuard key error")]
    KeyDecode(#[from] base64::DecodeError),
    #[error("IP address/mask error")]
    IpAddrMask(#[from] crate::net::IpAddrParseError),
    #[error("Client list error: {0}")]
    ClientList(#[from] serde_yaml::Error),
    #[error("Invalid client record: {0}")]
    InvalidClient(String),
    #[error("Malformed configuration {}: {reason}", .path.display())]
    MalformedConfig { path: PathBuf, reason: String },
    #[error("Network discovery error: {0}")]
    NetworkInfo(String),
    #[error("Netlink error: {0}")]
    NetlinkError(String),
    #[error("WireGuard is already configured at {}", .0.display())]
    AlreadyConfigured(PathBuf),
    #[error("WireGuard is not configured")]
    NotConfigured,
    #[error("Prompt error: {0}")]
    Prompt(String),
}
