//! Cryptographic primitives used by the trust layer.
//!
//! - [`aead`]: AES-256-GCM under the APIv3 key (certificate records, notifications)
//! - [`signer`]: SHA256-with-RSA signing and the platform's canonical strings
//! - [`oaep`]: RSA-OAEP for sensitive request fields

pub mod aead;
pub mod oaep;
pub mod signer;

pub use aead::{AeadError, ApiV3Key};
pub use oaep::{decrypt_oaep, encrypt_oaep};
pub use signer::{generate_nonce, verify_signature, Signer};
