//! argon2-host - Host-side Argon2 password hashing front-end
//!
//! Loads a signed hashing engine, marshals hash requests into the engine's
//! flat calling convention, and produces standard encoded Argon2 hashes.
//!
//! # Trust boundary
//!
//! The signature check covers the fetched module bytes only. With the
//! default [`loader::BuiltinInstantiator`] those bytes are checked for a
//! WebAssembly header and then discarded: the hash rounds run in the
//! in-process [`primitive::NativeArgon2`], which the signature does not
//! cover. A signature then gates *whether* an engine becomes ready, not
//! *what code* computes the hash. Supply a [`loader::ModuleInstantiator`]
//! that executes the module to bind the two together.

#![forbid(unsafe_code)]

pub mod b64;
pub mod config;
pub mod encoded;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod heap;
pub mod loader;
pub mod params;
pub mod primitive;

pub use encoded::EncodedHash;
pub use engine::{EngineHandle, EngineState};
pub use error::{ErrorCategory, ErrorKind, HostError, Result};
pub use hasher::{compute_hash, compute_hash_async, verify_password};
pub use loader::EngineLoader;
pub use params::{HashParameters, Variant};
