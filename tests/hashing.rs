//! Hash orchestration integration tests
//!
//! Checks interoperability of the encoded output with the `argon2` crate's
//! PHC string encoder, parameter sensitivity and concurrent use of one engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};

use argon2_host::b64;
use argon2_host::primitive::{Argon2Primitive, HashCall, NativeArgon2};
use argon2_host::{
    EncodedHash, EngineHandle, HashParameters, Variant, compute_hash, verify_password,
};

const SALT: &[u8] = b"0123456789abcdef";

fn engine() -> EngineHandle {
    EngineHandle::from_primitive(Arc::new(NativeArgon2::new()))
}

fn reference_hash(variant: Variant, m: u32, t: u32, p: u32, password: &str) -> String {
    let algorithm = match variant {
        Variant::Argon2d => Algorithm::Argon2d,
        Variant::Argon2i => Algorithm::Argon2i,
        Variant::Argon2id => Algorithm::Argon2id,
    };
    let params = Params::new(m, t, p, Some(32)).unwrap();
    let salt = SaltString::encode_b64(SALT).unwrap();
    Argon2::new(algorithm, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

#[test]
fn test_matches_reference_encoder() {
    let engine = engine();
    for variant in [Variant::Argon2d, Variant::Argon2i, Variant::Argon2id] {
        for (m, t, p) in [(64, 1, 1), (128, 2, 2), (256, 3, 4)] {
            let params = HashParameters::new(variant, m, t, p, 32, b64::encode(SALT));
            let ours = compute_hash("password", &params, &engine).unwrap();
            assert_eq!(
                ours.as_str(),
                reference_hash(variant, m, t, p, "password"),
                "{} m={} t={} p={}",
                variant,
                m,
                t,
                p
            );
        }
    }
}

#[test]
fn test_password_is_hashed_as_utf8() {
    let engine = engine();
    let params = HashParameters::new(Variant::Argon2id, 64, 1, 1, 32, b64::encode(SALT));
    let ours = compute_hash("pässwörd ✓", &params, &engine).unwrap();
    assert_eq!(
        ours.as_str(),
        reference_hash(Variant::Argon2id, 64, 1, 1, "pässwörd ✓")
    );
}

#[test]
fn test_parameter_changes_change_digest() {
    let engine = engine();
    let base = HashParameters::new(Variant::Argon2id, 64, 1, 1, 32, b64::encode(SALT));

    let mut variations = vec![base.clone()];
    let mut more_iterations = base.clone();
    more_iterations.iterations = 2;
    variations.push(more_iterations);
    let mut more_memory = base.clone();
    more_memory.memory_cost_kib = 128;
    variations.push(more_memory);
    let mut more_lanes = base.clone();
    more_lanes.parallelism = 2;
    variations.push(more_lanes);
    let mut other_salt = base.clone();
    other_salt.salt_b64 = b64::encode(b"fedcba9876543210");
    variations.push(other_salt);
    let mut other_variant = base.clone();
    other_variant.variant = Variant::Argon2i;
    variations.push(other_variant);

    let digests: HashSet<String> = variations
        .iter()
        .map(|params| {
            compute_hash("password", params, &engine)
                .unwrap()
                .digest_b64()
                .to_string()
        })
        .collect();
    assert_eq!(digests.len(), variations.len());
}

#[test]
fn test_hash_length_is_respected() {
    let engine = engine();
    for len in [4u32, 16, 33, 64] {
        let params = HashParameters::new(Variant::Argon2i, 64, 1, 1, len, b64::encode(SALT));
        let hash = compute_hash("password", &params, &engine).unwrap();
        assert_eq!(hash.digest().unwrap().len(), len as usize);
    }
}

#[test]
fn test_ignored_secret_and_associated_data() {
    let engine = engine();
    let plain = HashParameters::new(Variant::Argon2id, 64, 1, 1, 32, b64::encode(SALT));
    let mut extended = plain.clone();
    extended.secret = Some("pepper".to_string());
    extended.associated_data = Some("context".to_string());

    assert_eq!(
        compute_hash("password", &plain, &engine).unwrap(),
        compute_hash("password", &extended, &engine).unwrap()
    );
}

#[test]
fn test_verify_reference_hash() {
    let engine = engine();
    let reference = reference_hash(Variant::Argon2id, 128, 2, 1, "hunter2");
    let encoded = EncodedHash::parse(&reference).unwrap();
    assert!(verify_password("hunter2", &encoded, &engine).unwrap());
    assert!(!verify_password("hunter3", &encoded, &engine).unwrap());
}

#[test]
fn test_concurrent_hashing_on_shared_engine() {
    let handle = engine();
    let params = HashParameters::new(Variant::Argon2id, 64, 1, 1, 32, b64::encode(SALT));
    let expected = compute_hash("password", &params, &handle).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..3 {
                    assert_eq!(compute_hash("password", &params, &handle).unwrap(), expected);
                }
            });
        }
    });

    assert_eq!(handle.engine().unwrap().heap().live_buffers(), 0);
}

/// Fails the call if it ever observes a concurrent invocation.
struct NonReentrantPrimitive {
    inner: NativeArgon2,
    busy: AtomicBool,
    overlaps: AtomicUsize,
}

impl Argon2Primitive for NonReentrantPrimitive {
    fn encoded_len(&self, t: u32, m: u32, p: u32, salt_len: u32, hash_len: u32, tag: u32) -> usize {
        self.inner.encoded_len(t, m, p, salt_len, hash_len, tag)
    }

    fn hash_ext(&self, call: HashCall<'_>) -> i32 {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(5));
        let code = self.inner.hash_ext(call);
        self.busy.store(false, Ordering::SeqCst);
        code
    }

    fn is_reentrant(&self) -> bool {
        false
    }
}

#[test]
fn test_non_reentrant_primitive_is_serialized() {
    let primitive = Arc::new(NonReentrantPrimitive {
        inner: NativeArgon2::new(),
        busy: AtomicBool::new(false),
        overlaps: AtomicUsize::new(0),
    });
    let handle = EngineHandle::from_primitive(primitive.clone());
    let params = HashParameters::new(Variant::Argon2d, 64, 1, 1, 32, b64::encode(SALT));

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..3 {
                    compute_hash("password", &params, &handle).unwrap();
                }
            });
        }
    });

    assert_eq!(primitive.overlaps.load(Ordering::SeqCst), 0);
}
