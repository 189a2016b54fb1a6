//! JSON codec for the transit-IP peer API route.
//!
//! The transport resolves the calling peer and hands the raw body over; this
//! module turns it into a [`ConnectorTransitIpRequest`], runs it through the
//! [`Connector`] and encodes the response.  Only an undecodable body fails
//! the whole request.

use log::warn;
use thiserror::Error;

use crate::processor::Connector;
use crate::types::{ConnectorTransitIpRequest, PeerId};

/// Route the peer API serves transit-IP requests on.
pub const TRANSIT_IP_PATH: &str = "/v0/connector/transit-ip/";

#[derive(Debug, Error)]
pub enum PeerApiError {
    #[error("Error decoding JSON")]
    Decode(#[source] serde_json::Error),
    #[error("Error encoding JSON")]
    Encode(#[source] serde_json::Error),
}

impl PeerApiError {
    /// HTTP-equivalent status code.
    pub fn status(&self) -> u16 {
        match self {
            PeerApiError::Decode(_) => 400,
            PeerApiError::Encode(_) => 500,
        }
    }
}

pub async fn handle_transit_ip(
    connector: &Connector,
    peer: PeerId,
    body: &[u8],
) -> Result<Vec<u8>, PeerApiError> {
    let req: ConnectorTransitIpRequest = serde_json::from_slice(body).map_err(|e| {
        warn!("peer {}: undecodable transit-ip request: {}", peer, e);
        PeerApiError::Decode(e)
    })?;
    let resp = connector.process(peer, &req).await;
    serde_json::to_vec(&resp).map_err(PeerApiError::Encode)
}
