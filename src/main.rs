//! Connector daemon entry point.
//!
//! Serves the transit-IP peer API over stdin/stdout, one request per line:
//! `<peer-id> <json-body>` in, `<status> <json-or-error>` out.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;

use transitmap::config::{Config, ProofMode};
use transitmap::peerapi::{handle_transit_ip, TRANSIT_IP_PATH};
use transitmap::{
    AllowAll, Connector, ConnectorOptions, DenyAll, DnsProofValidator, PeerId, ProofValidator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting connector with config: {:?}", cfg);

    let validator: Arc<dyn ProofValidator> = match cfg.proof {
        ProofMode::Dns => Arc::new(DnsProofValidator::from_system_conf(
            &cfg.apps,
            cfg.max_proof_fqdns,
        )),
        ProofMode::AllowAll => {
            warn!("Proof validation disabled, every destination is accepted");
            Arc::new(AllowAll)
        }
        ProofMode::DenyAll => Arc::new(DenyAll),
    };
    let connector = Arc::new(Connector::with_options(
        validator,
        ConnectorOptions {
            announce_clear: cfg.announce_clear,
            proof_timeout: cfg.proof_timeout(),
        },
    ));

    info!("Serving {} on stdin", TRANSIT_IP_PATH);
    let mut serve_handle = tokio::spawn(serve_lines(connector));

    tokio::select! {
        res = &mut serve_handle => match res {
            Ok(Ok(())) => info!("Input closed, shutting down..."),
            Ok(Err(e)) => error!("Peer API failed: {}", e),
            Err(e) => error!("Peer API task failed: {}", e),
        },
        res = signal::ctrl_c() => match res {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
    }

    serve_handle.abort();
    info!("Shutdown complete.");
    Ok(())
}

async fn serve_lines(connector: Arc<Connector>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (peer, body) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let reply = match peer.parse::<u64>() {
            Ok(id) => match handle_transit_ip(&connector, PeerId(id), body.as_bytes()).await {
                Ok(bytes) => format!("200 {}", String::from_utf8_lossy(&bytes)),
                Err(e) => format!("{} {}", e.status(), e),
            },
            Err(_) => {
                warn!("Invalid peer ID: {}", peer);
                "400 Invalid peer ID".to_string()
            }
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
