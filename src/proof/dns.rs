//! DNS backed proof validation.
//!
//! Each configured app owns a set of domains.  A peer proves that a
//! destination belongs to an app by naming hostnames under those domains
//! that resolved to it; the connector re-resolves them with
//! [hickory-resolver](https://crates.io/crates/hickory-resolver) and accepts
//! the destination if any answer contains it.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::future::join_all;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use log::{debug, error, warn};

use super::{ProofError, ProofRequest, ProofValidator};
use crate::config::AppConfig;

pub struct DnsProofValidator {
    resolver: TokioAsyncResolver,
    /// App name -> normalised domains.
    apps: HashMap<String, Vec<String>>,
    max_fqdns: usize,
}

impl DnsProofValidator {
    pub fn new(resolver: TokioAsyncResolver, apps: &[AppConfig], max_fqdns: usize) -> Self {
        let apps = apps
            .iter()
            .map(|app| {
                let domains = app
                    .domains
                    .iter()
                    .map(|d| normalize(d.trim_start_matches("*.")))
                    .filter(|d| !d.is_empty())
                    .collect();
                (app.name.clone(), domains)
            })
            .collect();
        Self {
            resolver,
            apps,
            max_fqdns,
        }
    }

    /// Builds a validator using the system resolver configuration.
    pub fn from_system_conf(apps: &[AppConfig], max_fqdns: usize) -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            error!(
                "Failed to load system resolv.conf: {}. Falling back to default upstreams.",
                e
            );
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Self::new(resolver, apps, max_fqdns)
    }

    /// Proof hostnames that fall under one of `domains`, deduplicated and
    /// capped at `max_fqdns`.
    fn in_scope(&self, domains: &[String], fqdns: &[String]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for fqdn in fqdns {
            let name = normalize(fqdn);
            if name.is_empty() || names.contains(&name) {
                continue;
            }
            if !domains.iter().any(|d| in_domain(&name, d)) {
                debug!("proof hostname {} is outside the app's domains", name);
                continue;
            }
            if names.len() == self.max_fqdns {
                debug!("ignoring proof hostnames beyond {}", self.max_fqdns);
                break;
            }
            names.push(name);
        }
        names
    }
}

#[async_trait]
impl ProofValidator for DnsProofValidator {
    async fn validate(&self, req: &ProofRequest<'_>) -> Result<bool, ProofError> {
        let domains = self
            .apps
            .get(req.app)
            .ok_or_else(|| ProofError::UnknownApp(req.app.to_string()))?;

        let names = self.in_scope(domains, req.fqdns);
        if names.is_empty() {
            return Ok(false);
        }

        let lookups = names.iter().map(|name| async move {
            // Absolute name, so search domains are not appended.
            (name, self.resolver.lookup_ip(format!("{}.", name)).await)
        });
        let mut attested = false;
        for (name, result) in join_all(lookups).await {
            match result {
                Ok(lookup) => {
                    if lookup.iter().any(|addr| addr == req.destination) {
                        debug!(
                            "peer {}: {} resolves to {} for app {}",
                            req.peer, name, req.destination, req.app
                        );
                        attested = true;
                    }
                }
                Err(e) => warn!("Resolver lookup failed for {}: {}", name, e),
            }
        }
        Ok(attested)
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn in_domain(name: &str, domain: &str) -> bool {
    name == domain
        || name
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
