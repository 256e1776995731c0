//! Self-describing encoded Argon2 hashes
//!
//! Format: `$<variant>$v=<version>$m=<m>,t=<t>,p=<p>$<salt>$<digest>` where
//! salt and digest are standard Base64 without padding.

use std::fmt;
use std::str::FromStr;

use crate::b64;
use crate::error::{ErrorCategory, ErrorKind, HostError, Result};
use crate::params::Variant;

/// An immutable encoded hash string together with its parsed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHash {
    encoded: String,
    variant: Variant,
    version: u32,
    memory_cost_kib: u32,
    iterations: u32,
    parallelism: u32,
    salt_range: (usize, usize),
    digest_range: (usize, usize),
}

impl EncodedHash {
    /// Parse and validate an encoded hash string.
    pub fn parse(encoded: &str) -> Result<Self> {
        let mut fields = encoded.split('$');
        if fields.next() != Some("") {
            return Err(invalid("encoded hash must start with '$'"));
        }

        let variant: Variant = next_field(&mut fields, "variant")?.parse()?;

        let version = next_field(&mut fields, "version")?
            .strip_prefix("v=")
            .ok_or_else(|| invalid("missing version field"))
            .and_then(|v| parse_number(v, "version"))?;

        let costs = next_field(&mut fields, "parameters")?;
        let mut costs = costs.split(',');
        let memory_cost_kib = cost(costs.next(), "m=")?;
        let iterations = cost(costs.next(), "t=")?;
        let parallelism = cost(costs.next(), "p=")?;
        if costs.next().is_some() {
            return Err(invalid("unexpected trailing parameter"));
        }

        let salt = next_field(&mut fields, "salt")?;
        let digest = next_field(&mut fields, "digest")?;
        if fields.next().is_some() {
            return Err(invalid("unexpected trailing field"));
        }
        for (name, value) in [("salt", salt), ("digest", digest)] {
            if value.is_empty() || value.contains(b64::PAD as char) {
                return Err(invalid(format!("{} must be non-empty unpadded base64", name)));
            }
            b64::decode(value).map_err(|e| e.with_context(format!("invalid {} encoding", name)))?;
        }

        let digest_start = encoded.len() - digest.len();
        let salt_start = digest_start - 1 - salt.len();

        Ok(Self {
            encoded: encoded.to_string(),
            variant,
            version,
            memory_cost_kib,
            iterations,
            parallelism,
            salt_range: (salt_start, salt_start + salt.len()),
            digest_range: (digest_start, encoded.len()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn memory_cost_kib(&self) -> u32 {
        self.memory_cost_kib
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    /// Salt field, unpadded Base64.
    pub fn salt_b64(&self) -> &str {
        &self.encoded[self.salt_range.0..self.salt_range.1]
    }

    /// Digest field, unpadded Base64.
    pub fn digest_b64(&self) -> &str {
        &self.encoded[self.digest_range.0..self.digest_range.1]
    }

    pub fn digest(&self) -> Result<Vec<u8>> {
        b64::decode(self.digest_b64())
    }
}

impl fmt::Display for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for EncodedHash {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for EncodedHash {
    fn as_ref(&self) -> &str {
        &self.encoded
    }
}

fn invalid(msg: impl Into<String>) -> HostError {
    HostError::with_kind(ErrorCategory::User, ErrorKind::InvalidHash, msg)
}

fn next_field<'a>(fields: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<&'a str> {
    fields
        .next()
        .ok_or_else(|| invalid(format!("encoded hash truncated before {} field", name)))
}

fn cost(field: Option<&str>, prefix: &str) -> Result<u32> {
    let field = field.ok_or_else(|| invalid(format!("missing {} parameter", prefix)))?;
    let value = field
        .strip_prefix(prefix)
        .ok_or_else(|| invalid(format!("expected {} parameter, found {:?}", prefix, field)))?;
    parse_number(value, prefix)
}

fn parse_number(value: &str, name: &str) -> Result<u32> {
    // Reject signs and leading zeros so that the textual form is canonical.
    if value.is_empty()
        || !value.bytes().all(|b| b.is_ascii_digit())
        || (value.len() > 1 && value.starts_with('0'))
    {
        return Err(invalid(format!("malformed {} value {:?}", name, value)));
    }
    value.parse::<u32>().map_err(|e| {
        HostError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidHash,
            format!("{} value out of range", name),
            e,
        )
    })
}
