//! One-time secrets: codes, link tokens and nonces.
//!
//! Only the SHA-256 of a code or token is stored. The plaintext leaves the
//! engine exactly once, inside the [`crate::Challenge`] handed to delivery.

use sha2::{Digest, Sha256};

use crate::VerificationError;

pub const CODE_DIGITS: usize = 6;

fn random_bytes<const N: usize>() -> Result<[u8; N], VerificationError> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).map_err(|e| VerificationError::Unexpected(e.to_string()))?;
    Ok(buf)
}

/// A zero-padded six digit numeric code.
pub fn generate_code() -> Result<String, VerificationError> {
    let n = u32::from_be_bytes(random_bytes::<4>()?) % 1_000_000;
    Ok(format!("{n:0width$}", width = CODE_DIGITS))
}

/// A 256-bit hex token for email links.
pub fn generate_token() -> Result<String, VerificationError> {
    Ok(hex::encode(random_bytes::<32>()?))
}

/// A 128-bit hex nonce for redirect state and challenges.
pub fn generate_nonce() -> Result<String, VerificationError> {
    Ok(hex::encode(random_bytes::<16>()?))
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Compare a client-supplied secret against a stored hash. Surrounding
/// whitespace is ignored.
pub fn secret_matches(candidate: &str, stored_hash: &str) -> bool {
    let computed = hash_secret(candidate.trim());
    computed.len() == stored_hash.len()
        && computed
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
