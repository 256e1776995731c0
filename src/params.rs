//! Argon2 cost parameters and variant tags

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::b64;
use crate::error::{ErrorCategory, ErrorKind, HostError};

/// Version number passed to the primitive (Argon2 revision 1.3).
pub const ARGON2_VERSION: u32 = 0x13;

/// Length of salts produced by [`HashParameters::with_random_salt`].
pub const RANDOM_SALT_LEN: usize = 16;

/// Largest digest the host will allocate for, in bytes. Longer requests fail
/// with the primitive's output-too-long code.
pub const MAX_HASH_LENGTH: u32 = 1024;

/// Argon2 algorithm mode. The discriminants are the numeric tags of the
/// engine calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Argon2d = 0,
    Argon2i = 1,
    Argon2id = 2,
}

impl Variant {
    /// Numeric tag passed across the primitive boundary.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Identifier used in encoded hashes.
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Argon2d => "argon2d",
            Variant::Argon2i => "argon2i",
            Variant::Argon2id => "argon2id",
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Variant::Argon2d),
            1 => Some(Variant::Argon2i),
            2 => Some(Variant::Argon2id),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "argon2d" => Ok(Variant::Argon2d),
            "argon2i" => Ok(Variant::Argon2i),
            "argon2id" => Ok(Variant::Argon2id),
            other => Err(HostError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidHash,
                format!("unknown argon2 variant {:?}", other),
            )),
        }
    }
}

/// Caller-facing hash request parameters.
///
/// Costs must satisfy `memory_cost_kib, iterations, parallelism >= 1` and
/// `hash_length > 0`. These bounds (and the primitive's own, stricter ones)
/// are enforced by the primitive, which reports violations as primitive
/// error codes.
///
/// `secret` and `associated_data` are accepted for forward compatibility
/// only. They are currently always passed to the primitive as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParameters {
    pub memory_cost_kib: u32,
    pub parallelism: u32,
    pub iterations: u32,
    pub hash_length: u32,
    /// Salt as padded or unpadded standard Base64.
    pub salt_b64: String,
    pub variant: Variant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_data: Option<String>,
}

impl HashParameters {
    pub fn new(
        variant: Variant,
        memory_cost_kib: u32,
        iterations: u32,
        parallelism: u32,
        hash_length: u32,
        salt_b64: impl Into<String>,
    ) -> Self {
        Self {
            memory_cost_kib,
            parallelism,
            iterations,
            hash_length,
            salt_b64: salt_b64.into(),
            variant,
            secret: None,
            associated_data: None,
        }
    }

    /// Same as [`HashParameters::new`], with a fresh random salt from the OS RNG.
    pub fn with_random_salt(
        variant: Variant,
        memory_cost_kib: u32,
        iterations: u32,
        parallelism: u32,
        hash_length: u32,
    ) -> Self {
        let mut salt = [0u8; RANDOM_SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::new(
            variant,
            memory_cost_kib,
            iterations,
            parallelism,
            hash_length,
            b64::encode(&salt),
        )
    }
}
