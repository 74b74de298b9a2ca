//! Envelope Cipher
//!
//! AES-256-CBC envelope encryption. A passphrase-derived master key wraps a
//! fresh random key per message, and that key encrypts the payload.
//!
//! The on-the-wire layout is `IV || CBC(zero_pad(plaintext))`. Zero padding
//! cannot tell padding from plaintext that ends in `0x00`; [`decrypt`] strips
//! every trailing zero. Serialized replication messages are JSON and never
//! end in a zero byte.
//!
//! The master key is a bare SHA-256 of the passphrase with no salt or work
//! factor, matching what existing peers derive.

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::error::{CipherError, Result};
use crate::models::CipherBlock;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// AES block size, also the IV length
pub const BLOCK_SIZE: usize = 16;

// == Key Derivation ==
/// Derives the master key from a passphrase.
pub fn derive_master_key(passphrase: &str) -> [u8; KEY_SIZE] {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

// == Encrypt ==
/// Encrypts `plaintext`, returning the random IV followed by the ciphertext.
///
/// The plaintext is always padded with at least one zero byte.
///
/// # Errors
/// `CryptoFailure` if the key is not 32 bytes or the IV cannot be drawn.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CipherError::Randomness(e.to_string()))?;

    let encryptor =
        Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CipherError::InvalidKey(key.len()))?;
    let body = encryptor.encrypt_padded_vec_mut::<NoPadding>(&zero_pad(plaintext));

    let mut out = Vec::with_capacity(BLOCK_SIZE + body.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&body);
    Ok(out)
}

// == Decrypt ==
/// Decrypts `IV || ciphertext` and strips trailing zero bytes.
///
/// # Errors
/// `CryptoFailure` for a bad key or input that is not whole blocks.
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut plain = decrypt_blocks(ciphertext, key)?;
    let end = plain.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    plain.truncate(end);
    Ok(plain)
}

/// CBC-decrypts without touching the padding.
fn decrypt_blocks(ciphertext: &[u8], key: &[u8]) -> std::result::Result<Vec<u8>, CipherError> {
    if ciphertext.len() < BLOCK_SIZE || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::MalformedCiphertext(ciphertext.len()));
    }
    let (iv, body) = ciphertext.split_at(BLOCK_SIZE);
    let decryptor =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CipherError::InvalidKey(key.len()))?;
    decryptor
        .decrypt_padded_vec_mut::<NoPadding>(body)
        .map_err(|_| CipherError::MalformedCiphertext(ciphertext.len()))
}

fn zero_pad(data: &[u8]) -> Vec<u8> {
    let padding = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + padding);
    padded.extend_from_slice(data);
    padded.resize(data.len() + padding, 0);
    padded
}

// == Seal / Open ==
/// Encrypts a payload under a fresh message key wrapped by `master_key`.
///
/// # Panics
/// If the system random source cannot produce a message key. Continuing
/// would mean sending traffic under a predictable key.
pub fn seal(plaintext: &[u8], master_key: &[u8]) -> Result<CipherBlock> {
    let message_key = random_message_key();
    let cipher_payload = encrypt(plaintext, &message_key)?;
    let wrapped_message_key = encrypt(&message_key, master_key)?;
    Ok(CipherBlock {
        wrapped_message_key,
        cipher_payload,
    })
}

/// Reverses [`seal`]: unwraps the message key, then decrypts the payload.
///
/// The wrapped key is a whole number of blocks holding exactly
/// `KEY_SIZE` key bytes, so it is read by length rather than zero-stripped;
/// a message key ending in `0x00` still unwraps.
pub fn open(block: &CipherBlock, master_key: &[u8]) -> Result<Vec<u8>> {
    let unwrapped = decrypt_blocks(&block.wrapped_message_key, master_key)?;
    if unwrapped.len() < KEY_SIZE {
        return Err(CipherError::MalformedCiphertext(block.wrapped_message_key.len()).into());
    }
    decrypt(&block.cipher_payload, &unwrapped[..KEY_SIZE])
}

fn random_message_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    if let Err(e) = OsRng.try_fill_bytes(&mut key) {
        panic!("system random source failed while generating a message key: {e}");
    }
    key
}
