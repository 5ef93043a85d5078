//! Broker authentication: short-lived signed tokens and the mutual-TLS
//! client configuration.

pub mod tls;
pub mod token;

pub use tls::{build_tls_config, TlsError};
pub use token::{mint, mint_at, verify, Credential, CredentialError, CredentialMinter, SigningKey, VerifyingKey, TOKEN_LIFETIME};
