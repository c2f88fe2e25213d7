//! At-rest sealing for TOTP seeds.
//!
//! Seeds are encrypted with ChaCha20-Poly1305 under the service seal key.
//! The AAD binds each ciphertext to its account and device identifiers, so a
//! sealed seed copied onto another row fails to open.

use anyhow::{Result, anyhow};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

/// Seal key length in bytes.
pub const SEAL_KEY_BYTES: usize = 32;

const NONCE_BYTES: usize = 12;

fn device_aad(account_id: Uuid, device_id: Uuid) -> Vec<u8> {
    // AAD = "totp-device:v1|account_id|device_id"
    format!("totp-device:v1|{account_id}|{device_id}").into_bytes()
}

/// Seal a seed for storage. Output layout is `nonce (12 bytes) || ciphertext`.
///
/// # Errors
/// Returns an error if the nonce cannot be drawn or encryption fails.
pub fn seal_seed(
    key: &[u8; SEAL_KEY_BYTES],
    seed: &[u8],
    account_id: Uuid,
    device_id: Uuid,
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_BYTES];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| anyhow!("nonce generation failure: {e}"))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = device_aad(account_id, device_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: seed,
                aad: &aad,
            },
        )
        .map_err(|e| anyhow!("seal failure: {e}"))?;

    let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed seed. Expects the `nonce || ciphertext` layout of [`seal_seed`].
///
/// # Errors
/// Returns an error if the input is truncated, was tampered with, or was
/// sealed for a different account/device pair.
pub fn open_seed(
    key: &[u8; SEAL_KEY_BYTES],
    sealed: &[u8],
    account_id: Uuid,
    device_id: Uuid,
) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_BYTES {
        return Err(anyhow!("sealed seed too short"));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_BYTES);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let aad = device_aad(account_id, device_id);
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|e| anyhow!("open failure: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KEY: [u8; SEAL_KEY_BYTES] = [42u8; SEAL_KEY_BYTES];

    #[test]
    fn seal_open_roundtrip() {
        let seed = b"twenty-byte-totp-sd!";
        let account_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();

        let sealed = seal_seed(&KEY, seed, account_id, device_id).unwrap();
        assert_ne!(sealed.as_slice(), seed.as_slice());
        assert!(sealed.len() > seed.len());

        let opened = open_seed(&KEY, &sealed, account_id, device_id).unwrap();
        assert_eq!(opened, seed);
    }

    #[test]
    fn open_fails_for_other_device() {
        let account_id = Uuid::new_v4();
        let sealed = seal_seed(&KEY, b"seed", account_id, Uuid::new_v4()).unwrap();
        assert!(open_seed(&KEY, &sealed, account_id, Uuid::new_v4()).is_err());
    }

    #[test]
    fn open_fails_for_other_account() {
        let device_id = Uuid::new_v4();
        let sealed = seal_seed(&KEY, b"seed", Uuid::new_v4(), device_id).unwrap();
        assert!(open_seed(&KEY, &sealed, Uuid::new_v4(), device_id).is_err());
    }

    #[test]
    fn open_fails_on_tampered_ciphertext() {
        let account_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let mut sealed = seal_seed(&KEY, b"seed", account_id, device_id).unwrap();

        let last = sealed.len() - 1;
        if let Some(byte) = sealed.get_mut(last) {
            *byte ^= 0xFF;
        }
        assert!(open_seed(&KEY, &sealed, account_id, device_id).is_err());
    }

    #[test]
    fn open_fails_on_truncated_input() {
        let result = open_seed(&KEY, &[0u8; 4], Uuid::new_v4(), Uuid::new_v4());
        assert!(result.is_err());
    }
}
