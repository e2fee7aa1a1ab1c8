//! WireGuard key utilities

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use base64::{prelude::BASE64_STANDARD, DecodeError, Engine};

const KEY_LENGTH: usize = 32;

/// WireGuard key representation in binary form.
///
/// Text form is standard base64, as printed by `wg genkey` and expected in
/// configuration files.
#[derive(Clone, Default)]
pub struct Key([u8; KEY_LENGTH]);

impl Key {
    /// Create a new key from buffer.
    #[must_use]
    pub fn new(buf: [u8; KEY_LENGTH]) -> Self {
        Self(buf)
    }

    #[must_use]
    pub fn as_array(&self) -> [u8; KEY_LENGTH] {
        self.0
    }
}

impl TryFrom<&str> for Key {
    type Error = DecodeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let v = BASE64_STANDARD.decode(value.trim())?;
        Self::try_from(v.as_slice())
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = DecodeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let buf = <[u8; KEY_LENGTH]>::try_from(value)
            .map_err(|_| DecodeError::InvalidLength(value.len()))?;
        Ok(Self::new(buf))
    }
}

impl FromStr for Key {
    type Err = DecodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(value)
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", BASE64_STANDARD.encode(self.0))
    }
}

/// Private key together with the public key derived from it.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: Key,
    pub public: Key,
}

impl KeyPair {
    #[must_use]
    pub fn new(private: Key, public: Key) -> Self {
        Self { private, public }
    }
}

// implement manually to avoid exposing private keys
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
