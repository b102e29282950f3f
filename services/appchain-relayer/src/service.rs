// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Relayer Service Module 🕸️
//!
//! A module for starting the long-running loops of the relay pipeline.
//!
//! ## Overview
//!
//! Services are tasks which the relayer constantly runs throughout its lifetime:
//! following the finalized heads, scanning blocks, syncing the light client, relaying
//! commitments and completing the pending actions. Each one stops on the shutdown signal,
//! and returns an error only when the process should exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use appchain_chain_clients::{SourceChainClient, TargetChainClient};
use appchain_relayer_context::RelayerContext;
use appchain_relayer_store::RelayerStore;
use appchain_relayer_types::CursorKind;
use appchain_relayer_utils::{probe, Result};

use crate::action_tracker::ActionTracker;
use crate::block_scanner::{BlockScanner, ScanStep};
use crate::commitment_relay::CommitmentRelay;
use crate::height_tracker::HeightTracker;
use crate::light_client_sync::LightClientSync;
use crate::watchdog::Watchdog;

/// The running services, a task that ends early means the relayer has to stop.
pub type Services = JoinSet<Result<()>>;

/// Every component of the relay pipeline, wired together.
pub struct Pipeline<S> {
    /// The scan cursor, and the finalized watermark.
    pub tracker: HeightTracker<S>,
    /// Records commitments and sessions.
    pub scanner: Arc<BlockScanner<S>>,
    /// Keeps the beefy light client up to date.
    pub light_client: Arc<LightClientSync<S>>,
    /// Uses the relay cursor.
    pub relay: Arc<CommitmentRelay<S>>,
    /// Completes the multi-step actions.
    pub actions: Arc<ActionTracker<S>>,
    /// Shared by the scan and relay loops.
    pub watchdog: Watchdog,
    source: Arc<dyn SourceChainClient>,
}

impl<S: RelayerStore> Pipeline<S> {
    /// Wires the pipeline over `store` and the two chain clients.
    pub fn new(
        ctx: &RelayerContext,
        store: Arc<S>,
        source: Arc<dyn SourceChainClient>,
        target: Arc<dyn TargetChainClient>,
    ) -> Self {
        let relay_config = ctx.config.relay;
        let tracker = HeightTracker::new(
            store.clone(),
            CursorKind::Scan,
            ctx.config.source.start_block_height,
        );
        let actions = Arc::new(ActionTracker::new(
            store.clone(),
            target.clone(),
            relay_config.update_state_min_interval(),
            relay_config.max_confirm_attempts,
            relay_config.confirm_retry_interval(),
            ctx.metrics.clone(),
        ));
        let scanner = Arc::new(BlockScanner::new(
            store.clone(),
            source.clone(),
            tracker.clone(),
            relay_config.block_sync_size,
            ctx.metrics.clone(),
        ));
        let light_client = Arc::new(LightClientSync::new(
            ctx.clone(),
            store.clone(),
            source.clone(),
            target.clone(),
            actions.clone(),
        ));
        let relay = Arc::new(CommitmentRelay::new(
            ctx.clone(),
            store,
            source.clone(),
            target,
            tracker.clone(),
            actions.clone(),
        ));
        let watchdog = Watchdog::new(
            source.clone(),
            relay_config.watchdog_timeout(),
            relay_config.liveness_probe_timeout(),
            ctx.metrics.clone(),
        );
        Self {
            tracker,
            scanner,
            light_client,
            relay,
            actions,
            watchdog,
            source,
        }
    }
}

/// Starts all background services of the relay pipeline.
///
/// Returns the running services, they do not block.
///
/// # Examples
///
/// ```ignore
/// let mut services = service::ignite(&ctx, Arc::new(store), source, target).await?;
/// ```
pub async fn ignite<S: RelayerStore>(
    ctx: &RelayerContext,
    store: Arc<S>,
    source: Arc<dyn SourceChainClient>,
    target: Arc<dyn TargetChainClient>,
) -> Result<Services> {
    tracing::debug!(
        "Relayer configuration: {}",
        serde_json::to_string_pretty(&ctx.config)?
    );
    let pipeline = Pipeline::new(ctx, store, source, target);
    let accepted = pipeline.light_client.refresh_accepted_height().await?;
    tracing::info!(
        "Light client accepted height: {}",
        accepted.map_or_else(|| String::from("none"), |h| format!("#{h}"))
    );
    let mut services = JoinSet::new();
    start_height_tracker_service(ctx, &pipeline, &mut services);
    start_block_scanner_service(ctx, &pipeline, &mut services);
    start_light_client_service(ctx, &pipeline, &mut services);
    start_commitment_relay_service(ctx, &pipeline, &mut services);
    start_action_tracker_service(ctx, &pipeline, &mut services);
    Ok(services)
}

/// Follows the finalized heads of the source chain.
pub fn start_height_tracker_service<S: RelayerStore>(
    ctx: &RelayerContext,
    pipeline: &Pipeline<S>,
    services: &mut Services,
) {
    let mut shutdown_signal = ctx.shutdown_signal();
    let tracker = pipeline.tracker.clone();
    let source = pipeline.source.clone();
    let grace = ctx.config.relay.disconnect_grace();
    tracing::info!("Starting height tracker service");
    services.spawn(async move {
        tokio::select! {
            res = tracker.follow_finalized(source.as_ref(), grace) => res,
            _ = shutdown_signal.recv() => {
                tracing::debug!("Shutting down the height tracker");
                Ok(())
            },
        }
    });
}

async fn run_block_scanner<S: RelayerStore>(
    scanner: Arc<BlockScanner<S>>,
    watchdog: Watchdog,
    interval: Duration,
) -> Result<()> {
    loop {
        match watchdog.guard("scan", scanner.scan_once()).await? {
            // keep going while behind.
            Some(Ok(ScanStep::Advanced(_))) => continue,
            Some(Ok(ScanStep::Idle)) | None => {}
            Some(Err(e)) => tracing::warn!("Block scanner error: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Scans the finalized blocks for commitments and authority set changes.
pub fn start_block_scanner_service<S: RelayerStore>(
    ctx: &RelayerContext,
    pipeline: &Pipeline<S>,
    services: &mut Services,
) {
    let mut shutdown_signal = ctx.shutdown_signal();
    let task = run_block_scanner(
        pipeline.scanner.clone(),
        pipeline.watchdog.clone(),
        ctx.config.relay.scan_interval(),
    );
    tracing::info!("Starting block scanner service");
    services.spawn(async move {
        tokio::select! {
            res = task => res,
            _ = shutdown_signal.recv() => {
                tracing::debug!("Shutting down the block scanner");
                Ok(())
            },
        }
    });
}

/// Follows the finality stream and keeps the light client up to date.
///
/// The stream is subscribed to again whenever it ends.
pub fn start_light_client_service<S: RelayerStore>(
    ctx: &RelayerContext,
    pipeline: &Pipeline<S>,
    services: &mut Services,
) {
    let mut shutdown_signal = ctx.shutdown_signal();
    let light_client = pipeline.light_client.clone();
    tracing::info!("Starting light client service");
    services.spawn(async move {
        let backoff = backoff::backoff::Constant::new(Duration::from_secs(1));
        let task = backoff::future::retry(backoff, || async {
            light_client.run().await.map_err(|e| {
                if e.is_fatal() {
                    backoff::Error::permanent(e)
                } else {
                    tracing::warn!("Light client sync stopped: {}, restarting", e);
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Retry,
                        light_client_sync = true
                    );
                    backoff::Error::transient(e)
                }
            })
        });
        tokio::select! {
            res = task => res,
            _ = shutdown_signal.recv() => {
                tracing::debug!("Shutting down the light client sync");
                Ok(())
            },
        }
    });
}

async fn run_commitment_relay<S: RelayerStore>(
    relay: Arc<CommitmentRelay<S>>,
    watchdog: Watchdog,
    interval: Duration,
) -> Result<()> {
    loop {
        match watchdog.guard("relay", relay.process_pending()).await? {
            Some(Ok(pass)) if pass != Default::default() => {
                tracing::debug!("Relay pass: {:?}", pass)
            }
            Some(Err(e)) => tracing::warn!("Commitment relay error: {}", e),
            _ => {}
        }
        tokio::time::sleep(interval).await;
    }
}

/// Relays the discovered commitments.
pub fn start_commitment_relay_service<S: RelayerStore>(
    ctx: &RelayerContext,
    pipeline: &Pipeline<S>,
    services: &mut Services,
) {
    let mut shutdown_signal = ctx.shutdown_signal();
    let task = run_commitment_relay(
        pipeline.relay.clone(),
        pipeline.watchdog.clone(),
        ctx.config.relay.relay_interval(),
    );
    tracing::info!("Starting commitment relay service");
    services.spawn(async move {
        tokio::select! {
            res = task => res,
            _ = shutdown_signal.recv() => {
                tracing::debug!("Shutting down the commitment relay");
                Ok(())
            },
        }
    });
}

/// Completes the pending actions.
pub fn start_action_tracker_service<S: RelayerStore>(
    ctx: &RelayerContext,
    pipeline: &Pipeline<S>,
    services: &mut Services,
) {
    let mut shutdown_signal = ctx.shutdown_signal();
    let actions = pipeline.actions.clone();
    let interval = ctx.config.relay.action_poll_interval();
    tracing::info!("Starting action tracker service");
    services.spawn(async move {
        tokio::select! {
            res = actions.run(interval) => res,
            _ = shutdown_signal.recv() => {
                tracing::debug!("Shutting down the action tracker");
                Ok(())
            },
        }
    });
}
