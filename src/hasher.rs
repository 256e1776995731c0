//! Hash orchestration: marshal a request into the primitive's flat call
//!
//! Each request allocates its password, salt, digest and encoded-output
//! buffers from the engine heap. The buffers belong to that request alone
//! and are released (and wiped) on every return path.
//!
//! There are no retries here. The primitive is deterministic, so retrying
//! with identical inputs cannot succeed where the first attempt failed.

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::b64;
use crate::encoded::EncodedHash;
use crate::engine::{Engine, EngineHandle};
use crate::error::{ErrorCategory, ErrorKind, HostError, Result};
use crate::params::{ARGON2_VERSION, HashParameters, MAX_HASH_LENGTH};
use crate::primitive::{ARGON2_OK, ARGON2_OUTPUT_TOO_LONG, HashCall};

/// Compute the encoded hash of `password`.
///
/// Fails with [`ErrorKind::NotReady`] without touching the primitive if the
/// engine has not finished loading. This call runs the full hash on the
/// current thread; see [`compute_hash_async`] for async contexts.
pub fn compute_hash(
    password: &str,
    params: &HashParameters,
    engine: &EngineHandle,
) -> Result<EncodedHash> {
    let engine = engine.engine()?;
    hash_with_engine(password.as_bytes(), params, &engine)
}

/// [`compute_hash`] on tokio's blocking thread pool.
pub async fn compute_hash_async(
    password: String,
    params: HashParameters,
    engine: &EngineHandle,
) -> Result<EncodedHash> {
    let engine = engine.engine()?;
    let password = zeroize::Zeroizing::new(password);
    tokio::task::spawn_blocking(move || hash_with_engine(password.as_bytes(), &params, &engine))
        .await
        .map_err(|e| {
            HostError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "hash task did not complete",
                e,
            )
        })?
}

/// Check `password` against an encoded hash by recomputing it with the same
/// variant, costs and salt.
pub fn verify_password(
    password: &str,
    encoded: &EncodedHash,
    engine: &EngineHandle,
) -> Result<bool> {
    let engine = engine.engine()?;
    if encoded.version() != ARGON2_VERSION {
        return Err(HostError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidHash,
            format!("unsupported argon2 version {}", encoded.version()),
        ));
    }

    let expected = encoded.digest()?;
    let params = HashParameters::new(
        encoded.variant(),
        encoded.memory_cost_kib(),
        encoded.iterations(),
        encoded.parallelism(),
        expected.len() as u32,
        encoded.salt_b64(),
    );
    let recomputed = hash_with_engine(password.as_bytes(), &params, &engine)?;
    let actual = recomputed.digest()?;

    Ok(expected.ct_eq(&actual).into())
}

fn hash_with_engine(
    password: &[u8],
    params: &HashParameters,
    engine: &Engine,
) -> Result<EncodedHash> {
    if params.secret.is_some() || params.associated_data.is_some() {
        warn!("secret and associated data are not supported yet and will be ignored");
    }

    // Output buffers are sized from hash_length before the primitive sees it.
    if params.hash_length > MAX_HASH_LENGTH {
        let description = engine.primitive().error_message(ARGON2_OUTPUT_TOO_LONG);
        return Err(HostError::primitive(ARGON2_OUTPUT_TOO_LONG, description));
    }

    let salt_bytes =
        b64::decode(&params.salt_b64).map_err(|e| e.with_context("salt is not valid base64"))?;

    let heap = engine.heap();
    let pwd = heap.allocate_from(password);
    let salt = heap.allocate_from(&salt_bytes);
    let mut digest = heap.allocate(params.hash_length as usize);

    let encoded_len = engine.primitive().encoded_len(
        params.iterations,
        params.memory_cost_kib,
        params.parallelism,
        salt.len() as u32,
        params.hash_length,
        params.variant.tag(),
    );
    let mut encoded = heap.allocate(encoded_len);

    debug!(
        variant = %params.variant,
        m_cost = params.memory_cost_kib,
        t_cost = params.iterations,
        parallelism = params.parallelism,
        salt_len = salt.len(),
        hash_len = params.hash_length,
        "invoking argon2 primitive"
    );
    let code = engine.invoke(HashCall {
        t_cost: params.iterations,
        m_cost: params.memory_cost_kib,
        parallelism: params.parallelism,
        pwd: &pwd,
        salt: &salt,
        hash: &mut digest,
        encoded: &mut encoded,
        variant_tag: params.variant.tag(),
        secret: &[],
        ad: &[],
        version: ARGON2_VERSION,
    });

    if code != ARGON2_OK {
        let description = engine.primitive().error_message(code);
        debug!(code, "argon2 primitive failed");
        return Err(HostError::primitive(code, description));
    }

    let text = std::str::from_utf8(encoded.until_nul()).map_err(|e| {
        HostError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "primitive produced a non-UTF-8 encoded hash",
            e,
        )
    })?;
    EncodedHash::parse(text)
        .map_err(|e| e.with_context("primitive produced a malformed encoded hash"))
}
