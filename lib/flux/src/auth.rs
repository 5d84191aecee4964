//! Salted, iterated digest primitive used to store and verify user passwords.
//!
//! Mirrors `auth.h`'s `SALT_LEN`/`HASH_ITERS`/`AUTH_HASHFUNC` constants: a fresh
//! random salt per user, a digest over `salt || password` run through a fixed
//! iteration count, everything at rest in lowercase hex.

use rand::RngCore;
use sha2::{Digest, Sha512};

pub const SALT_LEN: usize = 16;
pub const DIGEST_LEN: usize = 64; // Sha512::output_size()

/// Number of times the digest is re-applied to itself. Kept as a named constant
/// rather than persisted, so raising it does not change the on-disk format --
/// only the value of `digest`.
pub const HASH_ITERS: u32 = 1;

pub type Salt = [u8; SALT_LEN];
pub type Digest512 = [u8; DIGEST_LEN];

/// Generates a fresh random salt.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Computes `digest_iter(salt || password)` over `HASH_ITERS` iterations.
pub fn digest(salt: &Salt, password: &str) -> Digest512 {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut out: Digest512 = hasher.finalize().into();

    for _ in 1..HASH_ITERS {
        out = Sha512::digest(&out).into();
    }

    out
}

/// Constant-time comparison of two digests, so login timing does not leak
/// information about how many leading bytes matched.
pub fn digest_eq(a: &Digest512, b: &Digest512) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verifies `password` against a stored `salt`/`digest` pair.
pub fn verify(salt: &Salt, stored_digest: &Digest512, password: &str) -> bool {
    digest_eq(stored_digest, &digest(salt, password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrips_through_verify() {
        let salt = generate_salt();
        let d = digest(&salt, "hunter2");
        assert!(verify(&salt, &d, "hunter2"));
        assert!(!verify(&salt, &d, "wrong"));
    }

    #[test]
    fn different_salts_produce_different_digests() {
        let salt_a = generate_salt();
        let salt_b = generate_salt();
        assert_ne!(salt_a, salt_b);
        assert_ne!(digest(&salt_a, "hunter2"), digest(&salt_b, "hunter2"));
    }

    #[test]
    fn digest_eq_rejects_any_mismatch() {
        let a = [1u8; DIGEST_LEN];
        let mut b = a;
        b[DIGEST_LEN - 1] ^= 1;
        assert!(!digest_eq(&a, &b));
        assert!(digest_eq(&a, &a));
    }
}
