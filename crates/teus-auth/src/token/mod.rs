//! Token issuance and validation.
//!
//! - [`jwt`] - the signing codec
//! - [`service`] - access/refresh token lifecycle on top of the codec

pub mod jwt;
pub mod service;

pub use jwt::{
    JwtError, JwtService, SigningAlgorithm, SigningKeyPair, TokenClaims, TokenGrant, TokenUse,
};
pub use service::{TokenConfig, TokenPair, TokenService};
