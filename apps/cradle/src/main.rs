use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cradle_client_core::config::default_state_dir;
use cradle_client_core::lifecycle::MessageCallback;
use cradle_client_core::responder::{respond_to_offer, RespondOutcome};
use cradle_client_core::retriever::RetrieveOutcome;
use cradle_client_core::session::{negotiate_as_initiator, wait_for_connection};
use cradle_client_core::telemetry::init_tracing;
use cradle_client_core::update::{check_for_update, FileMetaCache, MetaCache, LAST_UPDATE_KEY};
use cradle_client_core::{
    revoke, ExchangeClient, LinkConfig, PeerCallbacks, RtcPeer, TrustedParents,
};

const CHANNEL_LABEL: &str = "cradle";

#[derive(Debug, Parser)]
#[command(name = "cradle")]
#[command(about = "Baby/parent peer session over a cradle-road exchange")]
struct Cli {
    #[command(flatten)]
    link: LinkConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initiate: publish an offer and accept answers from trusted parents
    Baby {
        /// Parent ids allowed to complete the handshake
        #[arg(
            long = "trusted-parent",
            env = "CRADLE_TRUSTED_PARENTS",
            value_delimiter = ',',
            required = true
        )]
        trusted_parents: Vec<String>,
    },
    /// Respond: answer the published offer as `parent_id`
    Parent {
        #[arg(long, env = "CRADLE_PARENT_ID")]
        parent_id: String,
    },
    /// Ask the server whether a newer build is deployed
    CheckUpdate {
        /// Record this build id as the last one run before checking
        #[arg(long)]
        last_update: Option<String>,

        /// Where the last-seen build id is kept between runs
        #[arg(long, env = "CRADLE_STATE_DIR")]
        state_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let exchange = ExchangeClient::from_config(&cli.link)?;
    let timing = cli.link.timing()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target = "cradle", "interrupt received; shutting down");
        }
        on_interrupt.cancel();
    });

    match cli.command {
        Command::Baby { trusted_parents } => {
            let gate = TrustedParents::new(trusted_parents);
            let peer = RtcPeer::new(callbacks(), Vec::new(), &cli.link.ice_servers).await?;
            peer.create_data_channel(CHANNEL_LABEL, print_messages())
                .await
                .context("failed to create data channel")?;

            info!(target = "cradle", room = ?cli.link.room(), "publishing offer");
            match negotiate_as_initiator(peer.as_ref(), &exchange, &gate, &timing, &cancel).await? {
                RetrieveOutcome::Accepted { parent_id } => {
                    info!(target = "cradle", ?parent_id, "trusted parent answered");
                    chat(&peer, &exchange, &cancel).await
                }
                RetrieveOutcome::Cancelled => Ok(()),
            }
        }
        Command::Parent { parent_id } => {
            let peer = RtcPeer::new(callbacks(), Vec::new(), &cli.link.ice_servers).await?;
            peer.attach_data_channel(None, print_messages());

            info!(target = "cradle", room = ?cli.link.room(), %parent_id, "waiting for an offer");
            match respond_to_offer(peer.as_ref(), &exchange, &parent_id, &timing, &cancel).await? {
                RespondOutcome::Answered { .. } => chat(&peer, &exchange, &cancel).await,
                RespondOutcome::Cancelled => Ok(()),
            }
        }
        Command::CheckUpdate {
            last_update,
            state_dir,
        } => {
            let state_dir = state_dir
                .or_else(default_state_dir)
                .context("no state directory available; pass --state-dir")?;
            let cache = FileMetaCache::in_dir(&state_dir);
            if let Some(last_update) = last_update {
                cache.store(LAST_UPDATE_KEY, last_update).await;
            }
            let status = check_for_update(&exchange, &cache).await;
            let current = cache.load(LAST_UPDATE_KEY).await.unwrap_or_default();
            println!(
                "updated={} had_previous={} last_update={}",
                status.is_updated, status.had_previous, current
            );
            Ok(())
        }
    }
}

fn callbacks() -> PeerCallbacks {
    PeerCallbacks {
        on_connect: Some(Arc::new(|_peer: Arc<RtcPeer>| {
            info!(target = "cradle", "peer connected");
        })),
        on_disconnect: Some(Arc::new(|_peer: Arc<RtcPeer>| {
            warn!(target = "cradle", "peer disconnected");
        })),
        on_track: None,
    }
}

fn print_messages() -> MessageCallback {
    Arc::new(|payload: Bytes, _peer: Arc<RtcPeer>| {
        println!("< {}", String::from_utf8_lossy(&payload));
    })
}

// Relay stdin lines over the data channel until the session ends, then revoke.
async fn chat(
    peer: &Arc<RtcPeer>,
    exchange: &ExchangeClient,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if wait_for_connection(peer.connection_state(), cancel).await {
        let mut lines = BufReader::new(stdin()).lines();
        let mut state = peer.connection_state();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() || state.borrow().is_terminal() {
                        break;
                    }
                }
                line = lines.next_line() => match line.context("failed to read stdin")? {
                    Some(line) => {
                        peer.send_message(line).await;
                    }
                    None => break,
                },
            }
        }
    }
    let _ = revoke([peer.as_ref()], exchange).await;
    Ok(())
}
