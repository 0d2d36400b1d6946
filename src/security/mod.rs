//! Cross-cutting security: the Config Store's secret-at-rest envelope and
//! SSH boundary enforcement for the Supervisor — no sandboxing beyond
//! the SSH connection itself.

pub mod crypto;

pub use crypto::{decrypt, encrypt, CryptoError, RootKey};
