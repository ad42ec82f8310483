//! Cryptographic primitives for the clout reputation protocol (§4.1).
//!
//! No async, no I/O, no ports — this crate is the leaf of the dependency
//! graph (§2 "Leaf-first dependency order").

pub mod aead;
pub mod canonical;
pub mod ecdh;
pub mod encrypted_trust;
pub mod ephemeral;
pub mod error;
pub mod identity;

pub use error::CryptoError;
pub use identity::Identity;
