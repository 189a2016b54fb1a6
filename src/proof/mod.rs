//! Proof that a destination IP belongs to an app.
//!
//! The connector only maps a transit IP to a destination it has reason to
//! believe serves the requested app.  When its own table does not already
//! show that, it asks a [`ProofValidator`].

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::PeerId;

pub mod dns;
pub use dns::DnsProofValidator;

/// What a peer claims about one destination.
#[derive(Debug, Clone, Copy)]
pub struct ProofRequest<'a> {
    pub peer: PeerId,
    pub app: &'a str,
    pub destination: IpAddr,
    /// Hostnames the peer saw resolving to `destination`.
    pub fqdns: &'a [String],
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("app {0:?} is not configured on this connector")]
    UnknownApp(String),
    #[error("proof validation unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProofValidator: Send + Sync {
    /// Returns `Ok(true)` when the destination is attested for the app and
    /// `Ok(false)` when the supplied proof is not sufficient.
    async fn validate(&self, req: &ProofRequest<'_>) -> Result<bool, ProofError>;
}

/// Attests every destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ProofValidator for AllowAll {
    async fn validate(&self, _req: &ProofRequest<'_>) -> Result<bool, ProofError> {
        Ok(true)
    }
}

/// Attests nothing; only mappings the connector already holds count.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ProofValidator for DenyAll {
    async fn validate(&self, _req: &ProofRequest<'_>) -> Result<bool, ProofError> {
        Ok(false)
    }
}
