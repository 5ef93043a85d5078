use std::{fmt, path::Path, time::Duration};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Validity window of every minted credential.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed RSA key in {path}: {source}")]
    Parse {
        path: String,
        source: jsonwebtoken::errors::Error,
    },
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Verify(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// RS256 private key, loaded once at startup.
#[derive(Clone)]
pub struct SigningKey(EncodingKey);

impl SigningKey {
    pub fn from_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        EncodingKey::from_rsa_pem(pem).map(Self)
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, CredentialError> {
        let pem = read_key_file(path)?;
        Self::from_pem(&pem).map_err(|source| CredentialError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// RS256 public key matching [`SigningKey`].
#[derive(Clone)]
pub struct VerifyingKey(DecodingKey);

impl VerifyingKey {
    pub fn from_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_pem(pem).map(Self)
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, CredentialError> {
        let pem = read_key_file(path)?;
        Self::from_pem(&pem).map_err(|source| CredentialError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerifyingKey(..)")
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, CredentialError> {
    std::fs::read(path).map_err(|source| CredentialError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// A signed token and the claims it carries.
#[derive(Clone)]
pub struct Credential {
    token: String,
    claims: Claims,
}

impl Credential {
    /// Encoded JWT, used as the MQTT password.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> i64 {
        self.claims.iat
    }

    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    pub fn audience(&self) -> &str {
        &self.claims.aud
    }

    /// True for `issued_at <= unix_secs < expires_at`.
    pub fn is_valid_at(&self, unix_secs: i64) -> bool {
        unix_secs >= self.claims.iat && unix_secs < self.claims.exp
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

pub fn mint(key: &SigningKey, audience: &str) -> Result<Credential, CredentialError> {
    mint_at(key, audience, OffsetDateTime::now_utc())
}

pub fn mint_at(
    key: &SigningKey,
    audience: &str,
    issued_at: OffsetDateTime,
) -> Result<Credential, CredentialError> {
    let iat = issued_at.unix_timestamp();
    let claims = Claims {
        iat,
        exp: iat + TOKEN_LIFETIME.as_secs() as i64,
        aud: audience.to_string(),
    };

    let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key.0)
        .map_err(CredentialError::Sign)?;

    Ok(Credential { token, claims })
}

/// Check signature, audience and expiry of `token`.
pub fn verify(token: &str, key: &VerifyingKey, audience: &str) -> Result<Claims, CredentialError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);

    jsonwebtoken::decode::<Claims>(token, &key.0, &validation)
        .map(|data| data.claims)
        .map_err(CredentialError::Verify)
}

/// Signing key plus the fixed audience; mints one credential per cycle.
#[derive(Debug, Clone)]
pub struct CredentialMinter {
    key: SigningKey,
    audience: String,
}

impl CredentialMinter {
    pub fn new(key: SigningKey, audience: impl Into<String>) -> Self {
        Self {
            key,
            audience: audience.into(),
        }
    }

    pub fn mint(&self) -> Result<Credential, CredentialError> {
        mint(&self.key, &self.audience)
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const PRIVATE_PEM: &[u8] = include_bytes!("../../tests/fixtures/rsa_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/rsa_public.pem");
    const OTHER_PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/other_public.pem");

    fn signing_key() -> SigningKey {
        SigningKey::from_pem(PRIVATE_PEM).unwrap()
    }

    #[test]
    fn expiry_is_exactly_one_lifetime_after_issue() {
        let issued = datetime!(2024-06-01 12:00:00 UTC);
        let cred = mint_at(&signing_key(), "powerchat-187002", issued).unwrap();

        assert_eq!(cred.issued_at(), issued.unix_timestamp());
        assert_eq!(cred.expires_at() - cred.issued_at(), 3600);
        assert_eq!(cred.audience(), "powerchat-187002");
    }

    #[test]
    fn credential_is_expired_one_second_past_lifetime() {
        let issued = datetime!(2024-06-01 12:00:00 UTC).unix_timestamp();
        let cred = mint_at(&signing_key(), "aud", datetime!(2024-06-01 12:00:00 UTC)).unwrap();

        assert!(cred.is_valid_at(issued));
        assert!(cred.is_valid_at(issued + 3599));
        assert!(!cred.is_valid_at(issued + 3600));
        assert!(!cred.is_valid_at(issued + 3601));
        assert!(!cred.is_valid_at(issued - 1));
    }

    #[test]
    fn minted_token_verifies_with_matching_public_key() {
        let minter = CredentialMinter::new(signing_key(), "aud-x");
        let cred = minter.mint().unwrap();

        let claims = verify(cred.token(), &VerifyingKey::from_pem(PUBLIC_PEM).unwrap(), "aud-x").unwrap();
        assert_eq!(claims.aud, "aud-x");
        assert_eq!(claims.exp, claims.iat + 3600);
    }

    #[test]
    fn verification_fails_for_foreign_key_or_audience() {
        let cred = mint(&signing_key(), "aud-x").unwrap();

        let other = VerifyingKey::from_pem(OTHER_PUBLIC_PEM).unwrap();
        assert!(matches!(verify(cred.token(), &other, "aud-x"), Err(CredentialError::Verify(_))));

        let right = VerifyingKey::from_pem(PUBLIC_PEM).unwrap();
        assert!(matches!(verify(cred.token(), &right, "aud-y"), Err(CredentialError::Verify(_))));
    }

    #[test]
    fn expired_token_is_rejected_by_verification() {
        let long_ago = datetime!(2020-01-01 00:00:00 UTC);
        let cred = mint_at(&signing_key(), "aud", long_ago).unwrap();

        let key = VerifyingKey::from_pem(PUBLIC_PEM).unwrap();
        assert!(verify(cred.token(), &key, "aud").is_err());
    }

    #[test]
    fn key_loading_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.pem");
        assert!(matches!(SigningKey::from_pem_file(&missing), Err(CredentialError::Read { .. })));

        let garbage = dir.path().join("garbage.pem");
        std::fs::write(&garbage, "not a pem file").unwrap();
        assert!(matches!(SigningKey::from_pem_file(&garbage), Err(CredentialError::Parse { .. })));
    }

    #[test]
    fn debug_output_never_contains_the_token() {
        let cred = mint(&signing_key(), "aud").unwrap();
        let shown = format!("{cred:?}");
        assert!(!shown.contains(cred.token()));
        assert!(shown.contains("redacted"));
    }
}
