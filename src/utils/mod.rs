//! # Utility Modules
//!
//! The byte-buffer transforms the packet pipeline is built from, plus
//! logging setup.
//!
//! ## Components
//! - **Crypto**: AES-256-CBC with PKCS#7 padding and PBKDF2 key derivation
//! - **Compression**: store, deflate, gzip, brotli, LZ4 and Zstd with a
//!   bounded working buffer
//! - **Logging**: Structured logging configuration
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom) for keys, IVs and salts
//! - Decompression bomb protection via output limits
//! - Memory zeroing for key material (zeroize crate)

pub mod compression;
pub mod crypto;
pub mod logging;

pub use compression::{CompressionAlgorithm, CompressionLevel};
pub use crypto::{CryptoBox, DerivedKey, EncryptionKey};
