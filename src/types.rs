//! Wire types of the connector transit-IP protocol.
//!
//! A peer sends a [`ConnectorTransitIpRequest`] holding zero or more
//! [`TransitIpRequest`]s and receives a [`ConnectorTransitIpResponse`] whose
//! items line up index for index with the request items.  The types are
//! serialised with [`serde`](https://serde.rs/); the JSON field names are part
//! of the protocol and must not change.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a mesh node, as resolved by the transport layer.
///
/// The connector never interprets the value; it is only used as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PeerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A single transit IP allocation request from a peer.
///
/// Requesting a transit IP the peer already has a mapping for replaces that
/// mapping.  A batch must not name the same transit IP twice; if it does the
/// last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitIpRequest {
    /// Address the peer sends traffic to; rewritten to `destination_ip`.
    #[serde(rename = "transitIP", default, skip_serializing_if = "Option::is_none")]
    pub transit_ip: Option<IpAddr>,
    /// Final destination of connections to the transit IP.
    #[serde(rename = "destinationIP", default, skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<IpAddr>,
    /// Name of a configured connector application.
    #[serde(default)]
    pub app: String,
    /// Hostnames that previously resolved to the destination IP.
    #[serde(default, alias = "fqdns", skip_serializing_if = "Vec::is_empty")]
    pub fqdns_proof: Vec<String>,
}

impl TransitIpRequest {
    pub fn new(transit_ip: IpAddr, destination_ip: IpAddr, app: impl Into<String>) -> Self {
        Self {
            transit_ip: Some(transit_ip),
            destination_ip: Some(destination_ip),
            app: app.into(),
            fqdns_proof: Vec::new(),
        }
    }

    pub fn with_proof<I, S>(mut self, fqdns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fqdns_proof = fqdns.into_iter().map(Into::into).collect();
        self
    }
}

/// Request body of the transit-IP peer API route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorTransitIpRequest {
    /// Set by a peer on its first request after start.  Only a hint.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear: bool,
    #[serde(default, alias = "transitIPs", skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TransitIpRequest>,
}

/// Outcome code of one [`TransitIpRequest`].
///
/// The set is closed; a new code is a protocol change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum TransitIpResponseCode {
    /// The mapping was stored.
    #[default]
    Ok = 0,
    /// Any failure not covered by another code.
    OtherFailure = 1,
    /// The connector has no proof that the destination belongs to the app.
    /// The peer may retry with more proof.
    MissingProof = 2,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transit IP response code {0}")]
pub struct CodeError(pub u8);

impl From<TransitIpResponseCode> for u8 {
    fn from(code: TransitIpResponseCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for TransitIpResponseCode {
    type Error = CodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::OtherFailure),
            2 => Ok(Self::MissingProof),
            other => Err(CodeError(other)),
        }
    }
}

/// Outcome of one [`TransitIpRequest`].
///
/// `message` is meant for logs, not for end users, and is empty on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitIpResponse {
    #[serde(default)]
    pub code: TransitIpResponseCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl TransitIpResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failure(code: TransitIpResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == TransitIpResponseCode::Ok
    }
}

/// Response body of the transit-IP peer API route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorTransitIpResponse {
    /// Set by the connector on its first response to a peer after start.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clear: bool,
    /// Elements correspond to the order of the request items.
    #[serde(default, alias = "transitIPs")]
    pub items: Vec<TransitIpResponse>,
}
