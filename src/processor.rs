//! Batch processing of transit IP requests.
//!
//! [`Connector::process`] walks a peer's batch in order and answers every
//! item independently: one item failing never stops the rest.  The store
//! lock is released while a destination is being proven, so a slow
//! validator only delays the request it belongs to.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::proof::{ProofError, ProofRequest, ProofValidator};
use crate::store::MappingStore;
use crate::types::{
    ConnectorTransitIpRequest, ConnectorTransitIpResponse, PeerId, TransitIpRequest,
    TransitIpResponse, TransitIpResponseCode,
};

/// Why a single item was not mapped.  The `Display` text is the response
/// message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("missing transit IP")]
    MissingTransitIp,
    #[error("missing destination IP")]
    MissingDestinationIp,
    #[error("unspecified address {0}")]
    Unspecified(IpAddr),
    #[error("transit IP {transit} and destination IP {destination} are in different address families")]
    FamilyMismatch { transit: IpAddr, destination: IpAddr },
    #[error("missing app")]
    MissingApp,
    #[error("no proof that {destination} belongs to app {app:?}")]
    MissingProof { app: String, destination: IpAddr },
    #[error("proof validation cancelled")]
    Cancelled,
    #[error("proof validation timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Proof(#[from] ProofError),
}

impl ItemError {
    pub fn code(&self) -> TransitIpResponseCode {
        match self {
            ItemError::MissingProof { .. } | ItemError::Proof(ProofError::Unavailable(_)) => {
                TransitIpResponseCode::MissingProof
            }
            _ => TransitIpResponseCode::OtherFailure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Set `clear` on the first response to each peer after start, so the
    /// peer drops what it remembers from a previous connector instance.
    pub announce_clear: bool,
    /// Upper bound on one proof validation.
    pub proof_timeout: Duration,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            announce_clear: true,
            proof_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Connector {
    store: Arc<MappingStore>,
    validator: Arc<dyn ProofValidator>,
    options: ConnectorOptions,
    /// Peers that already got a response from this instance.
    answered: Mutex<HashSet<PeerId>>,
}

impl Connector {
    pub fn new(validator: Arc<dyn ProofValidator>) -> Self {
        Self::with_options(validator, ConnectorOptions::default())
    }

    pub fn with_options(validator: Arc<dyn ProofValidator>, options: ConnectorOptions) -> Self {
        Self {
            store: Arc::new(MappingStore::new()),
            validator,
            options,
            answered: Mutex::new(HashSet::new()),
        }
    }

    /// The mapping table, shared with the data plane.
    pub fn store(&self) -> Arc<MappingStore> {
        Arc::clone(&self.store)
    }

    pub async fn process(
        &self,
        peer: PeerId,
        request: &ConnectorTransitIpRequest,
    ) -> ConnectorTransitIpResponse {
        self.process_with_cancel(peer, request, &CancellationToken::new())
            .await
    }

    /// Like [`Connector::process`], but a cancelled `cancel` fails any item
    /// still waiting on proof validation.
    pub async fn process_with_cancel(
        &self,
        peer: PeerId,
        request: &ConnectorTransitIpRequest,
        cancel: &CancellationToken,
    ) -> ConnectorTransitIpResponse {
        if request.clear {
            // Advisory only, nothing expires early.
            info!("peer {} restarted and hinted to clear its mappings", peer);
        }

        let mut items = Vec::with_capacity(request.items.len());
        for (i, item) in request.items.iter().enumerate() {
            let outcome = match self.process_item(peer, item, cancel).await {
                Ok(()) => TransitIpResponse::ok(),
                Err(e) => {
                    debug!("peer {}: item {} rejected: {}", peer, i, e);
                    TransitIpResponse::failure(e.code(), e.to_string())
                }
            };
            items.push(outcome);
        }

        ConnectorTransitIpResponse {
            clear: self.first_response(peer).await,
            items,
        }
    }

    async fn process_item(
        &self,
        peer: PeerId,
        item: &TransitIpRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ItemError> {
        let (transit, destination) = check_item(item)?;
        self.prove(peer, item, destination, cancel).await?;
        self.store
            .upsert(peer, transit, destination, &item.app)
            .await;
        Ok(())
    }

    async fn prove(
        &self,
        peer: PeerId,
        item: &TransitIpRequest,
        destination: IpAddr,
        cancel: &CancellationToken,
    ) -> Result<(), ItemError> {
        if self.store.attests(peer, &item.app, destination).await {
            return Ok(());
        }

        let req = ProofRequest {
            peer,
            app: &item.app,
            destination,
            fqdns: &item.fqdns_proof,
        };
        let timeout = self.options.proof_timeout;
        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ItemError::Cancelled),
            res = tokio::time::timeout(timeout, self.validator.validate(&req)) => match res {
                Ok(verdict) => verdict.map_err(ItemError::from),
                Err(_) => Err(ItemError::TimedOut(timeout)),
            },
        }?;

        if verdict {
            Ok(())
        } else {
            Err(ItemError::MissingProof {
                app: item.app.clone(),
                destination,
            })
        }
    }

    async fn first_response(&self, peer: PeerId) -> bool {
        self.options.announce_clear && self.answered.lock().await.insert(peer)
    }
}

fn check_item(item: &TransitIpRequest) -> Result<(IpAddr, IpAddr), ItemError> {
    let transit = item.transit_ip.ok_or(ItemError::MissingTransitIp)?;
    let destination = item.destination_ip.ok_or(ItemError::MissingDestinationIp)?;
    for addr in [transit, destination] {
        if addr.is_unspecified() {
            return Err(ItemError::Unspecified(addr));
        }
    }
    if transit.is_ipv4() != destination.is_ipv4() {
        return Err(ItemError::FamilyMismatch {
            transit,
            destination,
        });
    }
    if item.app.is_empty() {
        return Err(ItemError::MissingApp);
    }
    Ok((transit, destination))
}
