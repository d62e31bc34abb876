//! # Symmetric Encryption
//!
//! AES-256-CBC with PKCS#7 padding. Every ciphertext carries its IV in the
//! first 16 bytes:
//!
//! ```text
//! [IV(16)] [Ciphertext(N * 16)]
//! ```
//!
//! CBC with PKCS#7 has no integrity check. Corrupted ciphertext that happens
//! to unpad cleanly decrypts to garbage instead of failing.
//!
//! Keys come from the caller, from [`CryptoBox::generate_key`], or from a
//! password via PBKDF2-HMAC-SHA256 ([`derive_key_from_password`]). Nothing
//! here stores key material.

use crate::error::{constants, ProtocolError, Result};
use aes::cipher::block_padding::{Padding, Pkcs7};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::Sha256;
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size in bytes
pub const IV_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Salt size for password-based key derivation
pub const SALT_SIZE: usize = 32;

/// PBKDF2 iteration count
pub const KDF_ITERATIONS: u32 = 100_000;

/// Bytes processed between yields in the async variants (multiple of BLOCK_SIZE)
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A 256-bit symmetric key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, failing unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for EncryptionKey {}

/// Output of password-based key derivation.
///
/// The salt must be persisted by the caller to derive the same key again.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: EncryptionKey,
    pub salt: [u8; SALT_SIZE],
}

/// AES-256-CBC transform bound to one key.
///
/// Holds no state between calls besides the key; every call builds and
/// drops its own cipher context, so a shared `CryptoBox` may be used from
/// many threads at once.
#[derive(Clone, Debug)]
pub struct CryptoBox {
    key: EncryptionKey,
}

impl CryptoBox {
    /// Create a crypto box from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(Self {
            key: EncryptionKey::from_slice(key)?,
        })
    }

    pub fn from_key(key: EncryptionKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Encrypt `plaintext`, prepending the IV to the output.
    ///
    /// A random IV is generated when `iv` is `None`. Empty plaintext
    /// produces an empty buffer.
    pub fn encrypt(&self, plaintext: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>> {
        let iv = resolve_iv(iv)?;
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let cipher = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), &iv).map_err(|_| {
            ProtocolError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: self.key.as_bytes().len(),
            }
        })?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a buffer produced by [`CryptoBox::encrypt`].
    ///
    /// # Errors
    /// - `InvalidCiphertext` if the input is non-empty but shorter than an IV
    /// - `AuthenticationOrPaddingError` if the body is not block aligned or
    ///   PKCS#7 unpadding fails
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let Some((iv, body)) = split_ciphertext(ciphertext)? else {
            return Ok(Vec::new());
        };

        let cipher = Aes256CbcDec::new_from_slices(self.key.as_bytes(), iv).map_err(|_| {
            ProtocolError::InvalidIvLength {
                expected: IV_SIZE,
                actual: iv.len(),
            }
        })?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| ProtocolError::AuthenticationOrPaddingError)
    }

    /// Non-blocking [`CryptoBox::encrypt`]: yields to the scheduler every 64 KiB.
    ///
    /// Produces exactly the same bytes as the blocking variant for the same IV.
    pub async fn encrypt_async(&self, plaintext: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>> {
        let iv = resolve_iv(iv)?;
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let mut cipher = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), &iv).map_err(|_| {
            ProtocolError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: self.key.as_bytes().len(),
            }
        })?;

        let full = plaintext.len() - plaintext.len() % BLOCK_SIZE;
        let mut out = Vec::with_capacity(IV_SIZE + full + BLOCK_SIZE);
        out.extend_from_slice(&iv);

        for chunk in plaintext[..full].chunks(STREAM_CHUNK_SIZE) {
            let start = out.len();
            out.extend_from_slice(chunk);
            for block in out[start..].chunks_exact_mut(BLOCK_SIZE) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            tokio::task::yield_now().await;
        }

        // Final block always carries the padding, even when the input is aligned
        let tail = &plaintext[full..];
        let mut last = aes::Block::default();
        last[..tail.len()].copy_from_slice(tail);
        Pkcs7::pad(&mut last, tail.len());
        cipher.encrypt_block_mut(&mut last);
        out.extend_from_slice(&last);

        Ok(out)
    }

    /// Non-blocking [`CryptoBox::decrypt`]: yields to the scheduler every 64 KiB.
    pub async fn decrypt_async(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let Some((iv, body)) = split_ciphertext(ciphertext)? else {
            return Ok(Vec::new());
        };
        if body.len() % BLOCK_SIZE != 0 {
            return Err(ProtocolError::AuthenticationOrPaddingError);
        }

        let mut cipher = Aes256CbcDec::new_from_slices(self.key.as_bytes(), iv).map_err(|_| {
            ProtocolError::InvalidIvLength {
                expected: IV_SIZE,
                actual: iv.len(),
            }
        })?;

        let mut out = Vec::with_capacity(body.len());
        for chunk in body.chunks(STREAM_CHUNK_SIZE) {
            let start = out.len();
            out.extend_from_slice(chunk);
            for block in out[start..].chunks_exact_mut(BLOCK_SIZE) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            tokio::task::yield_now().await;
        }

        let last_start = out.len() - BLOCK_SIZE;
        let last = aes::Block::clone_from_slice(&out[last_start..]);
        let kept = Pkcs7::unpad(&last)
            .map_err(|_| ProtocolError::AuthenticationOrPaddingError)?
            .len();
        out.truncate(last_start + kept);
        Ok(out)
    }

    /// Generate a random AES-256 key
    pub fn generate_key() -> Result<EncryptionKey> {
        let mut key = [0u8; KEY_SIZE];
        fill_random(&mut key)?;
        Ok(EncryptionKey(key))
    }

    /// Generate a random IV
    pub fn generate_iv() -> Result<[u8; IV_SIZE]> {
        let mut iv = [0u8; IV_SIZE];
        fill_random(&mut iv)?;
        Ok(iv)
    }

    /// Generate a random salt for key derivation
    pub fn generate_salt() -> Result<[u8; SALT_SIZE]> {
        let mut salt = [0u8; SALT_SIZE];
        fill_random(&mut salt)?;
        Ok(salt)
    }
}

/// Encrypt with a raw key. See [`CryptoBox::encrypt`].
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>> {
    CryptoBox::new(key)?.encrypt(plaintext, iv)
}

/// Decrypt with a raw key. See [`CryptoBox::decrypt`].
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    CryptoBox::new(key)?.decrypt(ciphertext)
}

/// Derive a key from a password with PBKDF2-HMAC-SHA256 ([`KDF_ITERATIONS`] rounds).
///
/// When `salt` is `None` a fresh 32-byte salt is generated and returned
/// alongside the key.
pub fn derive_key_from_password(password: &str, salt: Option<&[u8]>) -> Result<DerivedKey> {
    derive_key_with_iterations(password, salt, KDF_ITERATIONS)
}

/// Like [`derive_key_from_password`] with an explicit iteration count.
///
/// Counts below [`KDF_ITERATIONS`] are rejected.
#[instrument(skip(password, salt))]
pub fn derive_key_with_iterations(
    password: &str,
    salt: Option<&[u8]>,
    iterations: u32,
) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(ProtocolError::EmptyPassword);
    }
    if iterations < KDF_ITERATIONS {
        return Err(ProtocolError::KeyDerivation(format!(
            "{}: {iterations} < {KDF_ITERATIONS}",
            constants::ERR_KDF_ITERATIONS
        )));
    }

    let salt: [u8; SALT_SIZE] = match salt {
        Some(bytes) => bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidSaltLength {
                expected: SALT_SIZE,
                actual: bytes.len(),
            })?,
        None => CryptoBox::generate_salt()?,
    };

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut key);
    debug!(iterations, "Derived key from password");

    let derived = DerivedKey {
        key: EncryptionKey(key),
        salt,
    };
    key.zeroize();
    Ok(derived)
}

fn resolve_iv(iv: Option<&[u8]>) -> Result<[u8; IV_SIZE]> {
    match iv {
        Some(bytes) => bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidIvLength {
                expected: IV_SIZE,
                actual: bytes.len(),
            }),
        None => CryptoBox::generate_iv(),
    }
}

/// Split `[IV][body]`. `None` means the input was empty.
fn split_ciphertext(ciphertext: &[u8]) -> Result<Option<(&[u8], &[u8])>> {
    if ciphertext.is_empty() {
        return Ok(None);
    }
    if ciphertext.len() < IV_SIZE {
        return Err(ProtocolError::InvalidCiphertext);
    }
    let (iv, body) = ciphertext.split_at(IV_SIZE);
    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some((iv, body)))
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|_| ProtocolError::RandomGeneration)
}
