//! Per-peer transit IP mapping table.
//!
//! The table maps a peer to its own `transit IP -> destination IP` map.  All
//! access goes through one lock covering both levels; mutations are rare
//! control-plane events, so the coarse lock is cheap enough.

use std::collections::HashMap;
use std::net::IpAddr;

use log::debug;
use tokio::sync::Mutex;

use crate::types::PeerId;

/// A stored DNAT target, tagged with the app it was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub destination: IpAddr,
    pub app: String,
}

#[derive(Debug, Default)]
pub struct MappingStore {
    peers: Mutex<HashMap<PeerId, HashMap<IpAddr, Mapping>>>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the mapping for `(peer, transit)`.
    ///
    /// The peer's table is created on first use.  Addresses are expected to
    /// have been validated by the caller.
    pub async fn upsert(&self, peer: PeerId, transit: IpAddr, destination: IpAddr, app: &str) {
        let mut peers = self.peers.lock().await;
        let previous = peers.entry(peer).or_default().insert(
            transit,
            Mapping {
                destination,
                app: app.to_string(),
            },
        );
        match previous {
            Some(old) if old.destination != destination => {
                debug!(
                    "peer {}: {} remapped {} -> {} (app {})",
                    peer, transit, old.destination, destination, app
                );
            }
            Some(_) => {}
            None => debug!("peer {}: {} -> {} (app {})", peer, transit, destination, app),
        }
    }

    /// Destination currently mapped for `(peer, transit)`.
    ///
    /// Callers outside the tokio runtime use [`MappingStore::blocking_lookup`].
    pub async fn lookup(&self, peer: PeerId, transit: IpAddr) -> Option<IpAddr> {
        let peers = self.peers.lock().await;
        peers
            .get(&peer)
            .and_then(|m| m.get(&transit))
            .map(|m| m.destination)
    }

    /// Same as [`MappingStore::lookup`] for synchronous callers.
    ///
    /// Panics when called from within an async execution context.
    pub fn blocking_lookup(&self, peer: PeerId, transit: IpAddr) -> Option<IpAddr> {
        let peers = self.peers.blocking_lock();
        peers
            .get(&peer)
            .and_then(|m| m.get(&transit))
            .map(|m| m.destination)
    }

    pub async fn get(&self, peer: PeerId, transit: IpAddr) -> Option<Mapping> {
        let peers = self.peers.lock().await;
        peers.get(&peer).and_then(|m| m.get(&transit)).cloned()
    }

    /// Whether `peer` already holds a mapping to `destination` for `app`.
    pub async fn attests(&self, peer: PeerId, app: &str, destination: IpAddr) -> bool {
        let peers = self.peers.lock().await;
        peers.get(&peer).is_some_and(|m| {
            m.values()
                .any(|mapping| mapping.destination == destination && mapping.app == app)
        })
    }

    /// Drops every mapping of `peer`, returning how many there were.
    ///
    /// Nothing in the request path calls this; it is the hook for whatever
    /// reaps peers that left the mesh.
    pub async fn forget_peer(&self, peer: PeerId) -> usize {
        let mut peers = self.peers.lock().await;
        peers.remove(&peer).map_or(0, |m| m.len())
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn mapping_count(&self, peer: PeerId) -> usize {
        let peers = self.peers.lock().await;
        peers.get(&peer).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn lookup_after_upsert() {
        let store = MappingStore::new();
        assert_eq!(store.peer_count().await, 0);

        store.upsert(PeerId(1), ip("0.0.0.1"), ip("1.2.3.4"), "x").await;
        assert_eq!(store.lookup(PeerId(1), ip("0.0.0.1")).await, Some(ip("1.2.3.4")));
        assert_eq!(store.lookup(PeerId(1), ip("0.0.0.2")).await, None);
        assert_eq!(
            store.get(PeerId(1), ip("0.0.0.1")).await,
            Some(Mapping {
                destination: ip("1.2.3.4"),
                app: "x".into()
            })
        );
        assert_eq!(store.peer_count().await, 1);
    }

    #[tokio::test]
    async fn upsert_overwrites() {
        let store = MappingStore::new();
        store.upsert(PeerId(1), ip("0.0.0.1"), ip("1.2.3.4"), "x").await;
        store.upsert(PeerId(1), ip("0.0.0.1"), ip("5.6.7.8"), "y").await;

        let mapping = store.get(PeerId(1), ip("0.0.0.1")).await.unwrap();
        assert_eq!(mapping.destination, ip("5.6.7.8"));
        assert_eq!(mapping.app, "y");
        assert_eq!(store.mapping_count(PeerId(1)).await, 1);
        assert!(!store.attests(PeerId(1), "x", ip("1.2.3.4")).await);
    }

    #[tokio::test]
    async fn peers_are_isolated() {
        let store = MappingStore::new();
        store.upsert(PeerId(1), ip("0.0.0.1"), ip("1.2.3.4"), "x").await;

        assert_eq!(store.lookup(PeerId(2), ip("0.0.0.1")).await, None);
        assert!(!store.attests(PeerId(2), "x", ip("1.2.3.4")).await);
        assert!(store.attests(PeerId(1), "x", ip("1.2.3.4")).await);
        assert!(!store.attests(PeerId(1), "other", ip("1.2.3.4")).await);
    }

    #[tokio::test]
    async fn forget_peer_drops_only_that_peer() {
        let store = MappingStore::new();
        store.upsert(PeerId(1), ip("0.0.0.1"), ip("1.2.3.4"), "x").await;
        store.upsert(PeerId(1), ip("0.0.0.2"), ip("1.2.3.5"), "x").await;
        store.upsert(PeerId(2), ip("0.0.0.1"), ip("1.2.3.4"), "x").await;

        assert_eq!(store.forget_peer(PeerId(1)).await, 2);
        assert_eq!(store.forget_peer(PeerId(1)).await, 0);
        assert_eq!(store.lookup(PeerId(1), ip("0.0.0.1")).await, None);
        assert_eq!(store.lookup(PeerId(2), ip("0.0.0.1")).await, Some(ip("1.2.3.4")));
    }

    #[test]
    fn blocking_lookup_outside_runtime() {
        let store = MappingStore::new();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(store.upsert(PeerId(1), ip("0.0.0.1"), ip("1.2.3.4"), "x"));
        drop(rt);

        assert_eq!(store.blocking_lookup(PeerId(1), ip("0.0.0.1")), Some(ip("1.2.3.4")));
        assert_eq!(store.blocking_lookup(PeerId(2), ip("0.0.0.1")), None);
    }
}
