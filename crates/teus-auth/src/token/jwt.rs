//! JWT token codec.
//!
//! Encodes, signs, decodes and verifies the access and refresh tokens issued
//! by [`TokenService`](crate::token::TokenService). One process-wide key is
//! used for both signing and verification.
//!
//! ## Supported Algorithms
//!
//! - **HS256**: HMAC with SHA-256, shared secret from configuration
//! - **RS256**: RSA with SHA-256
//! - **ES384**: ECDSA with P-384 curve
//!
//! ## Verification order
//!
//! The signature is verified over the raw `header.payload` bytes before
//! either segment is parsed, then the header and claims are decoded, then the
//! issuer and expiry are checked. Changing any byte of a token therefore fails
//! with [`JwtError::InvalidSignature`], even when the token is also expired,
//! and a well-signed token past its `exp` fails with [`JwtError::Expired`].
//! Expiry uses zero leeway: a token is expired once `exp <= now`.

use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, crypto, dangerous, encode};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use rand::Rng;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::config::{MIN_HS256_SECRET_LEN, SigningConfig};
use crate::types::Role;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// The token is structurally invalid or was not issued by us.
    #[error("Malformed token: {message}")]
    Malformed {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `Malformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::malformed(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// RSA with SHA-256.
    RS256,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
            Self::ES384 => "ES384",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HS256" => Ok(Self::HS256),
            "RS256" => Ok(Self::RS256),
            "ES384" => Ok(Self::ES384),
            other => Err(JwtError::invalid_key(format!(
                "Unsupported signing algorithm: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Token type discriminator carried in every token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// Short-lived token that authenticates requests.
    Access,
    /// Long-lived token that can only be exchanged for a new access token.
    Refresh,
}

/// The business content of a token, before the codec stamps issuer,
/// timestamps and identifier onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// Subject (user handle).
    pub subject: String,

    /// Role, present only on access tokens.
    pub role: Option<Role>,

    /// Token type.
    pub token_use: TokenUse,
}

impl TokenGrant {
    /// Grant for an access token.
    #[must_use]
    pub fn access(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role: Some(role),
            token_use: TokenUse::Access,
        }
    }

    /// Grant for a refresh token. Refresh tokens never carry a role.
    #[must_use]
    pub fn refresh(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: None,
            token_use: TokenUse::Refresh,
        }
    }
}

/// Claims encoded in every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (user handle).
    pub sub: String,

    /// Role. Absent on refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Token type.
    pub token_use: TokenUse,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// JWT ID.
    pub jti: String,
}

impl TokenClaims {
    /// Returns `true` if the claim shape is that of an access token.
    #[must_use]
    pub fn is_access_token(&self) -> bool {
        self.token_use == TokenUse::Access && self.role.is_some()
    }

    /// Returns `true` if the claim shape is that of a refresh token.
    #[must_use]
    pub fn is_refresh_token(&self) -> bool {
        self.token_use == TokenUse::Refresh && self.role.is_none()
    }

    /// Returns the expiration time.
    ///
    /// # Errors
    /// Returns an error if `exp` is outside the representable range.
    pub fn expires_at(&self) -> Result<OffsetDateTime, JwtError> {
        OffsetDateTime::from_unix_timestamp(self.exp)
            .map_err(|e| JwtError::malformed(format!("exp out of range: {e}")))
    }
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key pair for JWT operations.
///
/// For HS256 both halves are derived from the same secret.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,

    decoding_key: DecodingKey,
}

impl SigningKeyPair {
    /// Creates an HS256 key from a shared secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than 32 bytes.
    pub fn from_secret(secret: &[u8]) -> Result<Self, JwtError> {
        if secret.len() < MIN_HS256_SECRET_LEN {
            return Err(JwtError::invalid_key(format!(
                "HS256 secret must be at least {} bytes",
                MIN_HS256_SECRET_LEN
            )));
        }

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Creates an HS256 key from a freshly generated random secret.
    pub fn generate_secret() -> Result<Self, JwtError> {
        let secret: [u8; 32] = OsRng.r#gen();
        Self::from_secret(&secret)
    }

    /// Generates a new 2048-bit RSA key pair for RS256.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_rsa() -> Result<Self, JwtError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::RS256,
            encoding_key,
            decoding_key,
        })
    }

    /// Generates a new EC key pair on the P-384 curve for ES384.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JwtError::key_generation_error("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::key_generation_error("Missing y coordinate"))?;

        // jsonwebtoken only reads PKCS8 for EC private keys
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        let decoding_key = DecodingKey::from_ec_components(
            &URL_SAFE_NO_PAD.encode(x.as_slice()),
            &URL_SAFE_NO_PAD.encode(y.as_slice()),
        )
        .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
        })
    }

    /// Loads an asymmetric key pair from PEM strings.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid or `algorithm` is HS256.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key) = match algorithm {
            SigningAlgorithm::RS256 => (
                EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?,
                DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?,
            ),
            SigningAlgorithm::ES384 => (
                EncodingKey::from_ec_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?,
                DecodingKey::from_ec_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?,
            ),
            SigningAlgorithm::HS256 => {
                return Err(JwtError::invalid_key("HS256 keys are not loaded from PEM"));
            }
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    /// Builds the process signing key from configuration.
    ///
    /// # Errors
    /// Returns an error if the configured material is invalid or key
    /// generation fails.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        let algorithm: SigningAlgorithm = config.algorithm().parse()?;

        match algorithm {
            SigningAlgorithm::HS256 => match &config.secret {
                Some(secret) => Self::from_secret(secret.as_bytes()),
                None => {
                    tracing::warn!(
                        "No HS256 secret configured; generated an ephemeral one, tokens will not survive a restart"
                    );
                    Self::generate_secret()
                }
            },
            SigningAlgorithm::RS256 | SigningAlgorithm::ES384 => {
                match (&config.private_key_pem, &config.public_key_pem) {
                    (Some(private_pem), Some(public_pem)) => {
                        Self::from_pem("configured", algorithm, private_pem, public_pem)
                    }
                    _ => {
                        tracing::warn!(
                            algorithm = %algorithm,
                            "No key pair configured; generated an ephemeral one"
                        );
                        if algorithm == SigningAlgorithm::RS256 {
                            Self::generate_rsa()
                        } else {
                            Self::generate_ec()
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Service for encoding and decoding tokens.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
}

impl JwtService {
    /// Creates a new JWT service.
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
        }
    }

    /// Encodes a grant into a signed token valid for `ttl` from now.
    ///
    /// A zero or negative `ttl` yields a token that is already expired.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode(&self, grant: &TokenGrant, ttl: Duration) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: grant.subject.clone(),
            role: grant.role,
            token_use: grant.token_use,
            iat: now,
            exp: now.saturating_add(ttl.whole_seconds()),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        self.encode_claims(&claims)
    }

    /// Signs an already-built claim set.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode_claims(&self, claims: &TokenClaims) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and verifies a token, including its expiry.
    ///
    /// # Errors
    /// Returns `Malformed`, `InvalidSignature` or `Expired`.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let claims = self.decode_allow_expired(token)?;

        if claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(JwtError::Expired);
        }

        Ok(claims)
    }

    /// Decodes a token without checking its expiry.
    ///
    /// Signature, structure and issuer are still verified.
    ///
    /// # Errors
    /// Returns `Malformed` or `InvalidSignature`.
    pub fn decode_allow_expired(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let (message, signature) = split_signature(token)?;
        let algorithm = self.signing_key.algorithm.to_jwt_algorithm();

        // Key and algorithm are process-wide; the header is parsed only after
        // the signature holds.
        let verified = crypto::verify(
            signature,
            message.as_bytes(),
            &self.signing_key.decoding_key,
            algorithm,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::Base64(_) => JwtError::InvalidSignature,
            _ => JwtError::from(e),
        })?;
        if !verified {
            return Err(JwtError::InvalidSignature);
        }

        let data = dangerous::insecure_decode::<TokenClaims>(token)?;
        if data.header.alg != algorithm {
            return Err(JwtError::malformed(format!(
                "unexpected algorithm {:?}",
                data.header.alg
            )));
        }
        if data.claims.iss != self.issuer {
            return Err(JwtError::malformed("issuer mismatch"));
        }

        Ok(data.claims)
    }
}

/// Splits a compact token into its signed `header.payload` part and the
/// encoded signature.
fn split_signature(token: &str) -> Result<(&str, &str), JwtError> {
    let (message, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| JwtError::malformed("expected three segments"))?;
    match message.split_once('.') {
        Some((header, payload))
            if !header.is_empty() && !payload.is_empty() && !payload.contains('.') =>
        {
            Ok((message, signature))
        }
        _ => Err(JwtError::malformed("expected three segments")),
    }
}

// ============================================================================
// Tests
// ============================================================================
