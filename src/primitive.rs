//! The narrow call contract between the host and an Argon2 engine
//!
//! An engine exposes three entry points, mirroring the reference C API:
//! sizing of the encoded output (`encoded_len`), the flat hash call
//! (`hash_ext`) and a lookup of human-readable error messages.
//!
//! # Reentrancy
//!
//! Hosts may invoke `hash_ext` concurrently from several threads on the same
//! engine. A primitive that cannot tolerate this MUST return `false` from
//! [`Argon2Primitive::is_reentrant`], in which case the engine serializes
//! every invocation behind a mutex.

use argon2::{Algorithm, Argon2, AssociatedData, ParamsBuilder, Version};

use crate::b64;
use crate::params::Variant;

pub const ARGON2_OK: i32 = 0;
pub const ARGON2_OUTPUT_TOO_SHORT: i32 = -2;
pub const ARGON2_OUTPUT_TOO_LONG: i32 = -3;
pub const ARGON2_PWD_TOO_LONG: i32 = -5;
pub const ARGON2_SALT_TOO_SHORT: i32 = -6;
pub const ARGON2_SALT_TOO_LONG: i32 = -7;
pub const ARGON2_AD_TOO_LONG: i32 = -9;
pub const ARGON2_SECRET_TOO_LONG: i32 = -11;
pub const ARGON2_TIME_TOO_SMALL: i32 = -12;
pub const ARGON2_MEMORY_TOO_LITTLE: i32 = -14;
pub const ARGON2_MEMORY_TOO_MUCH: i32 = -15;
pub const ARGON2_LANES_TOO_FEW: i32 = -16;
pub const ARGON2_LANES_TOO_MANY: i32 = -17;
pub const ARGON2_INCORRECT_PARAMETER: i32 = -25;
pub const ARGON2_INCORRECT_TYPE: i32 = -26;
pub const ARGON2_ENCODING_FAIL: i32 = -31;

/// Arguments of one flat `hash_ext` invocation.
///
/// All byte buffers are owned by the caller for the duration of the call.
/// `encoded` receives a NUL-terminated encoded hash and must be at least
/// `encoded_len(..)` bytes long.
#[derive(Debug)]
pub struct HashCall<'a> {
    pub t_cost: u32,
    pub m_cost: u32,
    pub parallelism: u32,
    pub pwd: &'a [u8],
    pub salt: &'a [u8],
    pub hash: &'a mut [u8],
    pub encoded: &'a mut [u8],
    pub variant_tag: u32,
    pub secret: &'a [u8],
    pub ad: &'a [u8],
    pub version: u32,
}

pub trait Argon2Primitive: Send + Sync {
    /// Size in bytes, including the terminating NUL, of the encoded hash
    /// produced for these parameters. Returns 0 for an unknown variant tag.
    fn encoded_len(
        &self,
        t_cost: u32,
        m_cost: u32,
        parallelism: u32,
        salt_len: u32,
        hash_len: u32,
        variant_tag: u32,
    ) -> usize;

    /// Compute the raw digest into `call.hash` and the encoded hash into
    /// `call.encoded`. Returns [`ARGON2_OK`] or a negative error code.
    fn hash_ext(&self, call: HashCall<'_>) -> i32;

    /// Human-readable description of a return code, if the primitive has one.
    fn error_message(&self, _code: i32) -> Option<String> {
        None
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

/// In-process Argon2 implementation backed by the `argon2` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeArgon2;

impl NativeArgon2 {
    pub fn new() -> Self {
        Self
    }

    fn compute(&self, call: &mut HashCall<'_>) -> Result<(), i32> {
        let variant = Variant::from_tag(call.variant_tag).ok_or(ARGON2_INCORRECT_TYPE)?;
        let algorithm = match variant {
            Variant::Argon2d => Algorithm::Argon2d,
            Variant::Argon2i => Algorithm::Argon2i,
            Variant::Argon2id => Algorithm::Argon2id,
        };
        let version = Version::try_from(call.version).map_err(|_| ARGON2_INCORRECT_PARAMETER)?;

        let mut builder = ParamsBuilder::new();
        builder
            .m_cost(call.m_cost)
            .t_cost(call.t_cost)
            .p_cost(call.parallelism)
            .output_len(call.hash.len());
        if !call.ad.is_empty() {
            builder.data(AssociatedData::new(call.ad).map_err(error_code)?);
        }
        let params = builder.build().map_err(error_code)?;

        let hasher = if call.secret.is_empty() {
            Argon2::new(algorithm, version, params)
        } else {
            Argon2::new_with_secret(call.secret, algorithm, version, params).map_err(error_code)?
        };
        hasher
            .hash_password_into(call.pwd, call.salt, call.hash)
            .map_err(error_code)?;

        let encoded = format!(
            "${}$v={}$m={},t={},p={}${}${}",
            variant,
            call.version,
            call.m_cost,
            call.t_cost,
            call.parallelism,
            b64::encode_unpadded(call.salt),
            b64::encode_unpadded(call.hash),
        );
        // Room for the terminating NUL is required.
        if encoded.len() >= call.encoded.len() {
            return Err(ARGON2_ENCODING_FAIL);
        }
        call.encoded[..encoded.len()].copy_from_slice(encoded.as_bytes());
        call.encoded[encoded.len()] = 0;
        Ok(())
    }
}

impl Argon2Primitive for NativeArgon2 {
    fn encoded_len(
        &self,
        t_cost: u32,
        m_cost: u32,
        parallelism: u32,
        salt_len: u32,
        hash_len: u32,
        variant_tag: u32,
    ) -> usize {
        let Some(variant) = Variant::from_tag(variant_tag) else {
            return 0;
        };
        "$$v=$m=,t=,p=$$".len()
            + variant.as_str().len()
            + decimal_len(t_cost)
            + decimal_len(m_cost)
            + decimal_len(parallelism)
            + unpadded_b64_len(salt_len)
            + unpadded_b64_len(hash_len)
            + decimal_len(crate::params::ARGON2_VERSION)
            + 1
    }

    fn hash_ext(&self, mut call: HashCall<'_>) -> i32 {
        match self.compute(&mut call) {
            Ok(()) => ARGON2_OK,
            Err(code) => code,
        }
    }

    fn error_message(&self, code: i32) -> Option<String> {
        let msg = match code {
            ARGON2_OK => "OK",
            ARGON2_OUTPUT_TOO_SHORT => "Output is too short",
            ARGON2_OUTPUT_TOO_LONG => "Output is too long",
            ARGON2_PWD_TOO_LONG => "Password is too long",
            ARGON2_SALT_TOO_SHORT => "Salt is too short",
            ARGON2_SALT_TOO_LONG => "Salt is too long",
            ARGON2_AD_TOO_LONG => "Associated data is too long",
            ARGON2_SECRET_TOO_LONG => "Secret is too long",
            ARGON2_TIME_TOO_SMALL => "Time cost is too small",
            ARGON2_MEMORY_TOO_LITTLE => "Memory cost is too small",
            ARGON2_MEMORY_TOO_MUCH => "Memory cost is too large",
            ARGON2_LANES_TOO_FEW => "Too few lanes",
            ARGON2_LANES_TOO_MANY => "Too many lanes",
            ARGON2_INCORRECT_PARAMETER => "Incorrect parameter",
            ARGON2_INCORRECT_TYPE => "There is no such version of Argon2",
            ARGON2_ENCODING_FAIL => "Encoding failed",
            _ => return None,
        };
        Some(msg.to_string())
    }
}

#[allow(unreachable_patterns)]
fn error_code(err: argon2::Error) -> i32 {
    match err {
        argon2::Error::AdTooLong => ARGON2_AD_TOO_LONG,
        argon2::Error::AlgorithmInvalid => ARGON2_INCORRECT_TYPE,
        argon2::Error::MemoryTooLittle => ARGON2_MEMORY_TOO_LITTLE,
        argon2::Error::MemoryTooMuch => ARGON2_MEMORY_TOO_MUCH,
        argon2::Error::OutputTooShort => ARGON2_OUTPUT_TOO_SHORT,
        argon2::Error::OutputTooLong => ARGON2_OUTPUT_TOO_LONG,
        argon2::Error::PwdTooLong => ARGON2_PWD_TOO_LONG,
        argon2::Error::SaltTooShort => ARGON2_SALT_TOO_SHORT,
        argon2::Error::SaltTooLong => ARGON2_SALT_TOO_LONG,
        argon2::Error::SecretTooLong => ARGON2_SECRET_TOO_LONG,
        argon2::Error::ThreadsTooFew => ARGON2_LANES_TOO_FEW,
        argon2::Error::ThreadsTooMany => ARGON2_LANES_TOO_MANY,
        argon2::Error::TimeTooSmall => ARGON2_TIME_TOO_SMALL,
        _ => ARGON2_INCORRECT_PARAMETER,
    }
}

fn decimal_len(mut n: u32) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

fn unpadded_b64_len(len: u32) -> usize {
    let len = len as usize;
    len / 3 * 4
        + match len % 3 {
            2 => 3,
            1 => 2,
            _ => 0,
        }
}
