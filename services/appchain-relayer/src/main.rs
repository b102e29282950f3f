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

//! Appchain Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal::unix;
use tokio::time;

use appchain_chain_clients::{NearClient, SubstrateClient};
use appchain_relayer_config::cli::{
    create_store, load_config, setup_logger, Opts,
};
use appchain_relayer_context::RelayerContext;
use appchain_relayer_utils::probe;

/// The main entry point for the relayer.
///
/// All the loops share one thread, they only interleave at their suspension points.
#[paw::main]
#[tokio::main(flavor = "current_thread")]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config(args.config_dir.clone())?;
    let ctx = RelayerContext::new(config)?;

    // persistent storage for the relayer
    let store = create_store(&args)?;
    let cloned_store = store.clone();
    let metrics_clone = ctx.metrics.clone();

    // metric for data stored which is determined every 1 hour
    let sled_metric_task_handle = tokio::task::spawn(async move {
        let mut sled_data_metric_interval =
            time::interval(Duration::from_secs(3600));
        loop {
            sled_data_metric_interval.tick().await;
            metrics_clone
                .lock()
                .await
                .total_amount_of_data_stored
                .set(cloned_store.get_data_stored_size() as f64);
        }
    });

    let source = SubstrateClient::connect(&ctx.config.source.ws_endpoint)
        .await
        .context("failed to connect to the source chain")?;
    let target_config = &ctx.config.target;
    let private_key = target_config
        .private_key
        .clone()
        .ok_or(appchain_relayer_utils::Error::MissingSecrets)?;
    let target = NearClient::new(
        &target_config.rpc_endpoint,
        target_config.signer_account_id.clone(),
        target_config.anchor_contract_id.clone(),
        private_key,
        Some(target_config.gas),
    )?;
    tracing::info!(
        "Relaying to {} as {}",
        target_config.anchor_contract_id,
        target_config.signer_account_id
    );

    // start all background services.
    // this does not block, will fire the services on background tasks.
    // the metrics endpoint.
    let web_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = appchain_relayer::handlers::build_web_services(web_ctx).await {
            tracing::error!("Web server stopped: {}", e);
        }
    });
    let mut services = appchain_relayer::service::ignite(
        &ctx,
        Arc::new(store),
        Arc::new(source),
        Arc::new(target),
    )
    .await?;
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        started = true
    );
    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let shutdown = || {
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            shutdown = true
        );
        tracing::warn!("Shutting down...");
        // send shutdown signal to all of the application.
        ctx.shutdown();
        // abort get sled storage data task
        sled_metric_task_handle.abort();
    };
    let exit_code = tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            0
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            0
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            0
        },
        Some(res) = services.join_next() => {
            match res {
                Ok(Err(e)) if e.is_fatal() => {
                    tracing::error!("Fatal: {}, exiting for a restart", e)
                }
                Ok(Err(e)) => tracing::error!("A service failed: {}", e),
                Ok(Ok(())) => tracing::error!("A service stopped unexpectedly"),
                Err(e) => tracing::error!("A service panicked: {}", e),
            }
            1
        },
    };
    shutdown();
    // let the loops finish their current step.
    let _ = time::timeout(Duration::from_secs(5), async {
        while services.join_next().await.is_some() {}
    })
    .await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    tracing::info!("Clean Exit ..");
    Ok(())
}
