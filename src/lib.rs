//! Transit IP mapping core of a mesh connector.
//!
//! Peers ask the connector to rewrite traffic sent to a transit IP so that
//! it reaches a destination IP belonging to one of the connector's apps.
//! The [`Connector`] validates and records those requests in a per-peer
//! [`MappingStore`], which the packet-rewriting data plane reads.

pub mod config;
pub mod peerapi;
pub mod processor;
pub mod proof;
pub mod store;
pub mod types;

pub use processor::{Connector, ConnectorOptions, ItemError};
pub use proof::{AllowAll, DenyAll, DnsProofValidator, ProofError, ProofRequest, ProofValidator};
pub use store::{Mapping, MappingStore};
pub use types::{
    ConnectorTransitIpRequest, ConnectorTransitIpResponse, PeerId, TransitIpRequest,
    TransitIpResponse, TransitIpResponseCode,
};
