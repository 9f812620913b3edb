//! AES-256-CBC primitives used by the KeePassHttp handshake.
//!
//! Key size: 32 bytes. Nonce (used directly as the CBC IV): 16 bytes.
//! Padding: PKCS#7.
//!
//! The verifier for a `(key, nonce)` pair is `encrypt(key, nonce, base64(nonce))`.

use aes::Aes256;
use base64::{engine::general_purpose, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub fn valid_params(key: &[u8], nonce: &[u8]) -> bool {
    key.len() == KEY_SIZE && nonce.len() == NONCE_SIZE
}

pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if !valid_params(key, iv) {
        return Err(CryptoError::InvalidParams);
    }
    let cipher =
        Aes256CbcEnc::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidParams)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if !valid_params(key, iv) {
        return Err(CryptoError::InvalidParams);
    }
    let cipher =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidParams)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Decrypt and interpret the plaintext as UTF-8, the way every protocol field
/// is transported.
pub fn decrypt_string(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<String, CryptoError> {
    let plaintext = decrypt(key, iv, ciphertext)?;
    Ok(String::from_utf8(plaintext)?)
}

pub fn create_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn create_verifier(key: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let encoded = general_purpose::STANDARD.encode(nonce);
    encrypt(key, nonce, encoded.as_bytes())
}

/// Recompute the verifier for `(key, nonce)` and compare it with the
/// presented one in constant time. Invalid sizes simply fail the check.
pub fn verify(key: &[u8], nonce: &[u8], verifier: &[u8]) -> bool {
    match create_verifier(key, nonce) {
        Ok(expected) => expected.ct_eq(verifier).into(),
        Err(_) => false,
    }
}
