//! Loader configuration
//!
//! ```json
//! {
//!   "module_location": "/opt/engines/argon2.wasm",
//!   "public_key": "<base64 of the 32-byte Ed25519 key>",
//!   "signature_location": "/opt/engines/argon2.wasm.sig",
//!   "verify_integrity": true
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::EngineHandle;
use crate::error::{ErrorCategory, ErrorKind, HostError, Result};
use crate::loader::{BuiltinInstantiator, EngineLoader, FsModuleFetcher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    pub module_location: String,
    /// Standard Base64 of the raw Ed25519 public key trusted to sign modules.
    pub public_key: String,
    /// Defaults to `<module_location>.sig`.
    #[serde(default)]
    pub signature_location: Option<String>,
    #[serde(default = "default_verify_integrity")]
    pub verify_integrity: bool,
}

fn default_verify_integrity() -> bool {
    true
}

impl LoaderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            HostError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("invalid loader configuration: {}", e),
                e,
            )
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            HostError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to read {}: {}", path.display(), e),
                e,
            )
        })?;
        Self::from_json_str(&json).map_err(|e| e.with_context(format!("in {}", path.display())))
    }

    /// A filesystem loader configured from this file.
    pub fn loader(&self) -> EngineLoader {
        let fetcher = match &self.signature_location {
            Some(path) => FsModuleFetcher::with_signature_path(path),
            None => FsModuleFetcher::new(),
        };
        EngineLoader::new(Arc::new(fetcher), Arc::new(BuiltinInstantiator))
            .with_integrity_check(self.verify_integrity)
    }

    /// Load the configured module.
    pub async fn load_engine(&self) -> Result<EngineHandle> {
        self.loader()
            .load(&self.module_location, &self.public_key)
            .await
    }
}
