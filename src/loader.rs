//! Fetching, verifying and instantiating engine modules
//!
//! A load runs in three stages:
//!
//! 1. fetch the module bytes and a detached Ed25519 signature
//! 2. verify the signature against the trusted public key
//! 3. instantiate the verified module in a background task
//!
//! [`EngineLoader::load`] returns as soon as stage 3 has been started; the
//! returned handle becomes ready when instantiation completes.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH, Signature, VerifyingKey};
use tracing::{error, info, warn};

use crate::b64;
use crate::engine::{Engine, EngineHandle};
use crate::error::{ErrorCategory, ErrorKind, HostError, Result};
use crate::primitive::{Argon2Primitive, NativeArgon2};

/// WebAssembly binary magic followed by format version 1.
const WASM_HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// Raw bytes of a module and its detached signature, as retrieved.
#[derive(Debug, Clone)]
pub struct FetchedModule {
    pub bytes: Vec<u8>,
    pub signature: Option<Vec<u8>>,
}

/// Source of engine modules.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Retrieve the module at `location`. Any failure to retrieve the module
    /// itself MUST be reported as [`ErrorKind::Fetch`].
    async fn fetch(&self, location: &str) -> Result<FetchedModule>;
}

/// Reads modules from the local filesystem.
///
/// The detached signature is read from `<location>.sig` unless an explicit
/// signature path is configured. It may be stored either as standard Base64
/// text or as the raw 64 signature bytes. A missing signature file is not a
/// fetch error; it fails verification instead.
#[derive(Debug, Clone, Default)]
pub struct FsModuleFetcher {
    signature_path: Option<PathBuf>,
}

impl FsModuleFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signature_path(path: impl Into<PathBuf>) -> Self {
        Self {
            signature_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl ModuleFetcher for FsModuleFetcher {
    async fn fetch(&self, location: &str) -> Result<FetchedModule> {
        let bytes = tokio::fs::read(location).await.map_err(|e| {
            HostError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Fetch,
                format!("failed to read engine module {}: {}", location, e),
                e,
            )
        })?;

        let signature_path = self
            .signature_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.sig", location)));
        let signature = match tokio::fs::read(&signature_path).await {
            Ok(raw) => Some(parse_signature_file(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(HostError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Fetch,
                    format!(
                        "failed to read module signature {}: {}",
                        signature_path.display(),
                        e
                    ),
                    e,
                ));
            }
        };

        Ok(FetchedModule { bytes, signature })
    }
}

fn parse_signature_file(raw: Vec<u8>) -> Vec<u8> {
    if let Ok(text) = std::str::from_utf8(&raw) {
        if let Ok(decoded) = b64::decode(text.trim()) {
            if decoded.len() == SIGNATURE_LENGTH {
                return decoded;
            }
        }
    }
    raw
}

/// Module bytes that passed (or were explicitly exempted from) verification.
#[derive(Debug, Clone)]
pub struct VerifiedModule {
    bytes: Vec<u8>,
    verified: bool,
}

impl VerifiedModule {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// False only when integrity checking was explicitly disabled.
    pub fn is_signature_verified(&self) -> bool {
        self.verified
    }
}

/// Turns a verified module into a callable primitive.
#[async_trait]
pub trait ModuleInstantiator: Send + Sync {
    async fn instantiate(&self, module: VerifiedModule) -> Result<Arc<dyn Argon2Primitive>>;
}

/// Accepts WebAssembly engine modules and binds them to [`NativeArgon2`].
///
/// The module must carry a valid WebAssembly header. Its code is never
/// executed and its bytes are dropped after the header check, so the
/// signature does not cover the code that computes hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinInstantiator;

#[async_trait]
impl ModuleInstantiator for BuiltinInstantiator {
    async fn instantiate(&self, module: VerifiedModule) -> Result<Arc<dyn Argon2Primitive>> {
        if !module.bytes().starts_with(&WASM_HEADER) {
            return Err(HostError::with_kind(
                ErrorCategory::User,
                ErrorKind::Instantiation,
                "engine module is not a WebAssembly version 1 binary",
            ));
        }
        Ok(Arc::new(NativeArgon2::new()))
    }
}

/// Decode a trusted Ed25519 public key given as standard Base64 of its
/// 32 raw bytes.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey> {
    let raw = b64::decode(encoded.trim())
        .map_err(|e| e.with_context("trusted public key is not valid base64"))?;
    let raw: [u8; PUBLIC_KEY_LENGTH] = raw.as_slice().try_into().map_err(|_| {
        HostError::with_kind(
            ErrorCategory::User,
            ErrorKind::Integrity,
            format!(
                "trusted public key must be {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                raw.len()
            ),
        )
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|e| {
        HostError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Integrity,
            "trusted public key is not a valid Ed25519 point",
            e,
        )
    })
}

/// Verify the detached signature of a fetched module.
pub fn verify_module(fetched: FetchedModule, trusted_public_key: &str) -> Result<VerifiedModule> {
    let key = decode_public_key(trusted_public_key)?;
    let signature_bytes = fetched.signature.as_deref().ok_or_else(|| {
        HostError::with_kind(
            ErrorCategory::User,
            ErrorKind::Integrity,
            "engine module has no detached signature",
        )
    })?;
    let signature = Signature::from_slice(signature_bytes).map_err(|e| {
        HostError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Integrity,
            "engine module signature is malformed",
            e,
        )
    })?;
    key.verify_strict(&fetched.bytes, &signature).map_err(|e| {
        HostError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Integrity,
            "engine module signature verification failed",
            e,
        )
    })?;
    Ok(VerifiedModule {
        bytes: fetched.bytes,
        verified: true,
    })
}

/// Loads engine modules. Every successful [`EngineLoader::load`] creates a
/// fresh engine instance; nothing is cached between loads.
#[derive(Clone)]
pub struct EngineLoader {
    fetcher: Arc<dyn ModuleFetcher>,
    instantiator: Arc<dyn ModuleInstantiator>,
    verify_integrity: bool,
}

impl EngineLoader {
    pub fn new(fetcher: Arc<dyn ModuleFetcher>, instantiator: Arc<dyn ModuleInstantiator>) -> Self {
        Self {
            fetcher,
            instantiator,
            verify_integrity: true,
        }
    }

    /// Filesystem fetcher with the builtin instantiator.
    pub fn filesystem() -> Self {
        Self::new(Arc::new(FsModuleFetcher::new()), Arc::new(BuiltinInstantiator))
    }

    /// Disabling integrity verification is logged on every load.
    pub fn with_integrity_check(mut self, enabled: bool) -> Self {
        self.verify_integrity = enabled;
        self
    }

    /// Fetch, verify and start instantiating the module at `location`.
    ///
    /// Resolves once instantiation has been initiated; use
    /// [`EngineHandle::wait_ready`] or [`EngineHandle::is_ready`] before
    /// hashing. Fetch and verification failures are returned directly and
    /// never produce a handle.
    pub async fn load(&self, location: &str, trusted_public_key: &str) -> Result<EngineHandle> {
        info!(location, "loading argon2 engine module");

        let fetched = self.fetcher.fetch(location).await?;

        let module = if self.verify_integrity {
            verify_module(fetched, trusted_public_key).inspect_err(|e| {
                error!(location, error = %e, "engine module failed integrity verification");
            })?
        } else {
            warn!(
                location,
                "integrity verification disabled; engine module signature NOT checked"
            );
            VerifiedModule {
                bytes: fetched.bytes,
                verified: false,
            }
        };

        let handle = EngineHandle::new();
        handle.begin_loading();

        let instantiator = Arc::clone(&self.instantiator);
        let task_handle = handle.clone();
        let location = location.to_string();
        let task = tokio::spawn(async move {
            match instantiator.instantiate(module).await {
                Ok(primitive) => {
                    if task_handle.complete(Engine::new(primitive)) {
                        info!(location = %location, "argon2 engine ready");
                    }
                }
                Err(e) => {
                    error!(location = %location, error = %e, "engine instantiation failed");
                    task_handle.fail(e.kind.unwrap_or(ErrorKind::Instantiation), e.to_string());
                }
            }
        });
        handle.attach_task(task);

        Ok(handle)
    }
}
