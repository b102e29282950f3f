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

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;

use appchain_chain_clients::{AnchorContract, SourceChainClient, TargetChainClient};
use appchain_proof_generation::codec::{decode_signed_commitment, SignedCommitment};
use appchain_proof_generation::AuthoritySetProver;
use appchain_relayer_context::RelayerContext;
use appchain_relayer_store::RelayerStore;
use appchain_relayer_types::{
    ActionType, LightClientState, Session, TrustedLightClientState,
};
use appchain_relayer_utils::{probe, unix_timestamp_millis, Error, Result};

use crate::action_tracker::{ActionTracker, Confirmation};

/// Where the light client sync is with the signed commitment it is handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SyncState {
    /// Waiting for the next signed commitment.
    #[display(fmt = "idle")]
    Idle,
    /// Building the authority set and MMR proofs.
    #[display(fmt = "awaiting-proof")]
    AwaitingProof,
    /// A state update is in flight on the target chain.
    #[display(fmt = "submitting")]
    Submitting,
    /// The target chain accepted the update.
    #[display(fmt = "accepted")]
    Accepted,
}

/// What happened to one signed commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Not newer than the commitment the light client already accepted.
    Stale,
    /// The target chain is in witness mode, it needs no light client state.
    Bypassed,
    /// No update needed, the state is kept to prove message batches below this height.
    Cached(u64),
    /// An update is needed but cannot be sent now.
    Deferred,
    /// The target chain accepted the state at this height.
    Accepted(u64),
    /// The target chain rejected the update.
    Rejected,
}

/// Keeps the beefy light client of the target chain close enough to the source chain.
///
/// Every signed commitment of the finality stream is a candidate. The light client is only
/// updated when an authority set change is not covered yet, or when it lags more than
/// `update-state-max-gap` blocks behind. Other candidates are cached: a message proof
/// carries its light client state, so it can be proven without a separate update.
pub struct LightClientSync<S> {
    ctx: RelayerContext,
    store: Arc<S>,
    source: Arc<dyn SourceChainClient>,
    target: Arc<dyn TargetChainClient>,
    actions: Arc<ActionTracker<S>>,
    prover: AuthoritySetProver,
    state: Mutex<SyncState>,
}

impl<S: RelayerStore> LightClientSync<S> {
    /// Creates the light client sync, `actions` tracks the `UpdateState` action.
    pub fn new(
        ctx: RelayerContext,
        store: Arc<S>,
        source: Arc<dyn SourceChainClient>,
        target: Arc<dyn TargetChainClient>,
        actions: Arc<ActionTracker<S>>,
    ) -> Self {
        Self {
            ctx,
            store,
            source,
            target,
            actions,
            prover: AuthoritySetProver,
            state: Mutex::new(SyncState::Idle),
        }
    }

    /// The current state, for logs and tests.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    fn transition(&self, next: SyncState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::trace!("Light client sync: {} -> {}", *state, next);
            *state = next;
        }
    }

    /// Reads the height of the latest commitment the target chain accepted.
    pub async fn refresh_accepted_height(&self) -> Result<Option<u64>> {
        let relay_state = self.ctx.relay_state();
        if let Some(height) = self.target.latest_commitment_height().await? {
            relay_state.raise_accepted_height(height);
        }
        Ok(relay_state.accepted_height())
    }

    /// Handles one SCALE encoded signed commitment of the finality stream.
    pub async fn handle_signed_commitment(
        &self,
        encoded: &[u8],
    ) -> Result<SyncOutcome> {
        let outcome = self.sync(encoded).await;
        self.transition(SyncState::Idle);
        outcome
    }

    async fn sync(&self, encoded: &[u8]) -> Result<SyncOutcome> {
        let signed = decode_signed_commitment(encoded)?;
        let height = signed.block_number();
        let relay_state = self.ctx.relay_state();
        let accepted = relay_state.accepted_height();
        if accepted.map_or(false, |a| height <= a) {
            tracing::trace!("Stale signed commitment #{}", height);
            return Ok(SyncOutcome::Stale);
        }
        if self.target.is_witness_mode().await? {
            return Ok(SyncOutcome::Bypassed);
        }

        let relay_config = self.ctx.config.relay;
        let pending_session = self.store.first_pending_session(height)?;
        if let Some(Session {
            height: session,
            failed_at: Some(failed_at),
            ..
        }) = &pending_session
        {
            tracing::info!(
                "Session #{} is still not covered, the last update failed at {}ms",
                session,
                failed_at
            );
        }
        let pending_session = pending_session.map(|s| s.height);
        let gap = height.saturating_sub(accepted.unwrap_or_default());
        let required = pending_session.is_some()
            || gap > relay_config.update_state_max_gap;

        self.transition(SyncState::AwaitingProof);
        let trusted = self.build_state(signed).await?;
        if !required {
            relay_state.cache_trusted_state(trusted);
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::LightClient,
                cached = height,
            );
            return Ok(SyncOutcome::Cached(height));
        }

        if !relay_state.update_allowed(relay_config.update_state_min_interval())
        {
            tracing::debug!("Light client updated recently, deferring #{}", height);
            return Ok(SyncOutcome::Deferred);
        }
        if self.actions.is_pending(ActionType::UpdateState)? {
            // a previous update has to land first.
            if self.actions.confirm(ActionType::UpdateState).await?
                != Confirmation::Completed
            {
                return Ok(SyncOutcome::Deferred);
            }
            if self
                .refresh_accepted_height()
                .await?
                .map_or(false, |a| height <= a)
            {
                return Ok(SyncOutcome::Stale);
            }
        }

        self.transition(SyncState::Submitting);
        let _guard = relay_state.lock_relay().await;
        relay_state.mark_update();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::LightClient,
            submitting = height,
            session = ?pending_session,
            gap,
        );
        match self.target.start_updating_state(&trusted.state).await {
            Ok(outcome) => {
                tracing::debug!(
                    "Light client update #{} started, tx: {}",
                    height,
                    outcome.tx_id
                );
                self.actions.track(ActionType::UpdateState)?;
            }
            Err(e) if e.is_transaction_failure() => {
                let tx_id = e.tx_id().map(ToOwned::to_owned);
                tracing::warn!("Light client update #{} failed: {}", height, e);
                self.actions
                    .record_failure(ActionType::UpdateState, tx_id)
                    .await?;
                return self.reject(height, pending_session).await;
            }
            Err(e) => return Err(e),
        }
        match self.actions.confirm(ActionType::UpdateState).await? {
            Confirmation::Completed => {
                self.accept(trusted).await?;
                Ok(SyncOutcome::Accepted(height))
            }
            Confirmation::Failed => {
                self.reject(height, pending_session).await
            }
            Confirmation::Incomplete | Confirmation::CoolingDown => {
                Ok(SyncOutcome::Deferred)
            }
        }
    }

    async fn build_state(
        &self,
        signed: SignedCommitment,
    ) -> Result<TrustedLightClientState> {
        let height = signed.block_number();
        let previous_height = height.checked_sub(1).ok_or(Error::Generic(
            "signed commitment of the genesis block",
        ))?;
        let mmr_root = signed
            .commitment
            .mmr_root()
            .ok_or(Error::Generic("signed commitment without an mmr root"))?;
        tracing::trace!("MMR root at #{}: 0x{}", height, hex::encode(mmr_root));
        let current = self.source.authorities(height).await?;
        let previous = self.source.authorities(previous_height).await?;
        if current != previous {
            tracing::info!(
                "Authority set rotated at #{} ({} -> {} authorities)",
                height,
                previous.len(),
                current.len()
            );
        }
        let authority_proof = self.prover.prove(&current)?;
        tracing::trace!(
            "Authority set root at #{}: 0x{}",
            height,
            hex::encode(authority_proof.root)
        );
        let mmr = self
            .source
            .generate_mmr_proof(previous_height, height)
            .await?;
        Ok(TrustedLightClientState {
            block_number: height,
            state: LightClientState {
                signed_commitment: signed.encoded,
                validator_proofs: authority_proof.proofs,
                mmr_leaf: mmr.leaves,
                mmr_proof: mmr.proof,
            },
        })
    }

    async fn accept(&self, trusted: TrustedLightClientState) -> Result<()> {
        let height = trusted.block_number;
        let relay_state = self.ctx.relay_state();
        relay_state.cache_trusted_state(trusted);
        relay_state.raise_accepted_height(height);
        let covered = self.store.cover_sessions(height)?;
        self.ctx.metrics.lock().await.light_client_updates.inc();
        self.transition(SyncState::Accepted);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::LightClient,
            accepted = height,
            covered_sessions = covered,
        );
        Ok(())
    }

    async fn reject(
        &self,
        height: u64,
        session: Option<u64>,
    ) -> Result<SyncOutcome> {
        if let Some(session) = session {
            self.store.fail_session(session, unix_timestamp_millis())?;
        }
        self.ctx.metrics.lock().await.light_client_update_failures.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::LightClient,
            rejected = height,
        );
        Ok(SyncOutcome::Rejected)
    }

    /// Follows the finality stream until it ends.
    pub async fn run(&self) -> Result<()> {
        self.refresh_accepted_height().await?;
        let mut commitments = self.source.subscribe_signed_commitments().await?;
        while let Some(encoded) = commitments.next().await {
            match self.handle_signed_commitment(&encoded?).await {
                Ok(outcome) => tracing::trace!("Signed commitment: {:?}", outcome),
                Err(e) => tracing::warn!("Failed to handle signed commitment: {}", e),
            }
        }
        Err(Error::ForceRestart)
    }
}

