//! Key pair generation capability.
//!
//! The cryptography itself is never implemented here: key pairs come either
//! from the system `wg` tool or from `x25519-dalek`.

use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    command::{run, run_with_stdin},
    key::{Key, KeyPair},
    GatewayError,
};

/// Source of fresh WireGuard key pairs.
pub trait KeyPairProvider {
    /// Generates a new private key and derives its public key.
    fn generate_key_pair(&self) -> Result<KeyPair, GatewayError>;
}

/// Generates keys with `wg genkey` and `wg pubkey`.
#[derive(Clone, Debug)]
pub struct WgTool {
    program: String,
}

impl WgTool {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn parse_output(command: &str, output: &str) -> Result<Key, GatewayError> {
        output.parse().map_err(|err| {
            error!("`{command}` produced an invalid key: {err}");
            GatewayError::CommandExecutionError {
                command: command.to_string(),
                stdout: String::new(),
                stderr: format!("invalid key: {err}"),
            }
        })
    }
}

impl Default for WgTool {
    fn default() -> Self {
        Self::new("wg")
    }
}

impl KeyPairProvider for WgTool {
    fn generate_key_pair(&self) -> Result<KeyPair, GatewayError> {
        let private = run(&self.program, &["genkey"])?;
        let private = Self::parse_output(&format!("{} genkey", self.program), &private)?;
        let public = run_with_stdin(&self.program, &["pubkey"], &private.to_string())?;
        let public = Self::parse_output(&format!("{} pubkey", self.program), &public)?;
        debug!("Generated key pair with public key {public}");
        Ok(KeyPair::new(private, public))
    }
}

/// Generates keys in-process, for hosts without WireGuard tools installed.
#[derive(Clone, Copy, Debug, Default)]
pub struct X25519;

impl KeyPairProvider for X25519 {
    fn generate_key_pair(&self) -> Result<KeyPair, GatewayError> {
        let private = Key::new(StaticSecret::random().to_bytes());
        let public = derive_public_key(&private);
        Ok(KeyPair::new(private, public))
    }
}

/// Public key belonging to a WireGuard private key, as `wg pubkey` computes it.
#[must_use]
pub fn derive_public_key(private: &Key) -> Key {
    let secret = StaticSecret::from(private.as_array());
    Key::new(PublicKey::from(&secret).to_bytes())
}
