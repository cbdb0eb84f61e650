//! Write-key derivation.
//!
//! Every `write` command must carry a `key` proving knowledge of the
//! gateway's 16-character password.  The key is the AES-128-CBC encryption
//! of the gateway's current session token under that password, with the
//! fixed [`AUTH_IV`], hex-encoded:
//!
//! ```text
//! key = hex( AES-128-CBC(password, AUTH_IV, token[..16]) )
//! ```
//!
//! The token is refreshed by the gateway on every exchange (and in its
//! heartbeats), so the key must be re-derived right before each write.
//!
//! # Tolerant failure
//!
//! A missing password, a missing token or a password of the wrong length all
//! yield an empty key.  The gateway then answers the write with an `error`
//! payload, which the caller sees as a device error.

use aes::Aes128;
use cbc::cipher::{Block, BlockEncryptMut, KeyIvInit};
use tracing::warn;

use crate::protocol::constants::{AUTH_IV, AUTH_KEY_LEN};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

/// Derives the hex write key for `token` under the gateway password `key`.
///
/// Returns an empty string if either input is empty or the password is not
/// exactly 16 bytes.  Tokens shorter than one block are zero-padded; only
/// the first 16 bytes of a longer token are used.
///
/// # Examples
///
/// ```rust
/// use aqara_core::derive_auth_token;
///
/// let a = derive_auth_token("0987654321qwerty", "1234567890abcdef");
/// let b = derive_auth_token("0987654321qwerty", "1234567890abcdef");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 32);
/// assert_eq!(derive_auth_token("", "1234567890abcdef"), "");
/// ```
pub fn derive_auth_token(key: &str, token: &str) -> String {
    if key.is_empty() || token.is_empty() {
        return String::new();
    }

    let mut encryptor = match Aes128CbcEnc::new_from_slices(key.as_bytes(), &AUTH_IV) {
        Ok(encryptor) => encryptor,
        Err(_) => {
            warn!(
                "gateway key must be {AUTH_KEY_LEN} bytes, got {}; sending writes without a key",
                key.len()
            );
            return String::new();
        }
    };

    let mut block = [0u8; AUTH_KEY_LEN];
    let token = token.as_bytes();
    let n = token.len().min(AUTH_KEY_LEN);
    block[..n].copy_from_slice(&token[..n]);

    encryptor.encrypt_block_mut(Block::<Aes128CbcEnc>::from_mut_slice(&mut block));
    hex::encode(block)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_key_and_short_token_golden_value() {
        // Arrange
        let key = "\0".repeat(16);

        // Act
        let derived = derive_auth_token(&key, "1234abcd");

        // Assert
        assert_eq!(derived, "a3c2cde8de2dde5485526a715c7a5df3");
    }

    #[test]
    fn test_full_block_token_golden_value() {
        let derived = derive_auth_token("0987654321qwerty", "1234567890abcdef");
        assert_eq!(derived, "3eb43e37c20aff4c5872cc0d04d81314");
    }

    #[test]
    fn test_long_token_uses_first_block_only() {
        assert_eq!(
            derive_auth_token("0987654321qwerty", "1234567890abcdefXYZ"),
            derive_auth_token("0987654321qwerty", "1234567890abcdef"),
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_auth_token("0987654321qwerty", "tok");
        let b = derive_auth_token("0987654321qwerty", "tok");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_tokens_give_different_keys() {
        assert_ne!(
            derive_auth_token("0987654321qwerty", "aaaaaaaaaaaaaaaa"),
            derive_auth_token("0987654321qwerty", "bbbbbbbbbbbbbbbb"),
        );
    }

    #[test]
    fn test_empty_key_or_token_yields_empty() {
        assert_eq!(derive_auth_token("", "1234567890abcdef"), "");
        assert_eq!(derive_auth_token("0987654321qwerty", ""), "");
    }

    #[test]
    fn test_wrong_key_length_yields_empty() {
        assert_eq!(derive_auth_token("short", "1234567890abcdef"), "");
        assert_eq!(derive_auth_token("0987654321qwerty!", "1234567890abcdef"), "");
    }

    #[test]
    fn test_output_is_lowercase_hex_of_one_block() {
        let derived = derive_auth_token("0987654321qwerty", "1234567890abcdef");
        assert_eq!(derived.len(), 32);
        assert!(derived.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
