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

use std::collections::BTreeSet;
use std::sync::Arc;

use appchain_chain_clients::{AnchorContract, SourceChainClient, TargetChainClient};
use appchain_proof_generation::codec::decode_messages;
use appchain_relayer_context::RelayerContext;
use appchain_relayer_store::RelayerStore;
use appchain_relayer_types::{
    ActionType, Commitment, CommitmentStatus, CursorKind, Message, MessageProof,
};
use appchain_relayer_utils::{probe, unix_timestamp_millis, Error, Result};

use crate::action_tracker::ActionTracker;
use crate::height_tracker::HeightTracker;

/// Adds the signature of a third party verifier to a message proof.
///
/// The target chain checks it on top of the finality proof when it is configured to.
#[async_trait::async_trait]
pub trait ProofCosigner: Send + Sync {
    /// Signs a proof-mode message proof, the signature ends up in
    /// `verification_proxy_signature`.
    async fn cosign(&self, proof: &MessageProof) -> Result<Vec<u8>>;
}

/// What happened to one commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Accepted by the target chain.
    Relayed { tx_id: String },
    /// Rejected by the target chain.
    Failed { tx_id: String },
    /// Not relayable yet, retried on a later pass.
    Deferred { reason: &'static str },
}

impl RelayOutcome {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Deferred { .. })
    }
}

/// Counters of one [`CommitmentRelay::process_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayPass {
    /// Commitments accepted by the target chain.
    pub relayed: usize,
    /// Commitments rejected by the target chain.
    pub failed: usize,
    /// `1` if the pass stopped at a commitment that cannot be relayed yet.
    pub deferred: usize,
}

/// Relays the discovered commitments to the anchor contract, lowest height first.
pub struct CommitmentRelay<S> {
    ctx: RelayerContext,
    store: Arc<S>,
    source: Arc<dyn SourceChainClient>,
    target: Arc<dyn TargetChainClient>,
    scan: HeightTracker<S>,
    tracker: HeightTracker<S>,
    actions: Arc<ActionTracker<S>>,
    cosigner: Option<Arc<dyn ProofCosigner>>,
}

impl<S: RelayerStore> CommitmentRelay<S> {
    /// `scan` is the scanner's cursor. Only scanned heights are relayed, and the relay
    /// cursor shares its finalized watermark.
    pub fn new(
        ctx: RelayerContext,
        store: Arc<S>,
        source: Arc<dyn SourceChainClient>,
        target: Arc<dyn TargetChainClient>,
        scan: HeightTracker<S>,
        actions: Arc<ActionTracker<S>>,
    ) -> Self {
        let tracker = scan.with_kind(CursorKind::Relay);
        Self {
            ctx,
            store,
            source,
            target,
            scan,
            tracker,
            actions,
            cosigner: None,
        }
    }

    /// Co-signs every proof-mode message proof with `cosigner`.
    pub fn with_cosigner(mut self, cosigner: Arc<dyn ProofCosigner>) -> Self {
        self.cosigner = Some(cosigner);
        self
    }

    /// Relays the received commitments above the relay cursor that are both scanned and
    /// finalized, in ascending height order.
    ///
    /// The pass stops at the first commitment that cannot be relayed yet, so a higher
    /// commitment never overtakes a lower one. Transport and decoding errors also stop the
    /// pass and leave the commitment as it was. The relay cursor moves past a height once
    /// every commitment at that height is resolved.
    pub async fn process_pending(&self) -> Result<RelayPass> {
        let mut pass = RelayPass::default();
        let Some(scanned) = self.scan.current()? else {
            return Ok(pass);
        };
        let max_height = scanned.min(self.tracker.latest_finalized());
        let from_height = self.tracker.next_height()?;
        let mut pending = self
            .store
            .unresolved_commitments(from_height, max_height)?
            .into_iter()
            .peekable();
        while let Some(commitment) = pending.next() {
            let outcome = self.relay(&commitment).await.map_err(|e| {
                tracing::warn!("Failed to relay commitment {}: {}", commitment, e);
                e
            })?;
            match &outcome {
                RelayOutcome::Relayed { .. } => pass.relayed += 1,
                RelayOutcome::Failed { .. } => pass.failed += 1,
                RelayOutcome::Deferred { .. } => pass.deferred += 1,
            }
            if !outcome.is_terminal() {
                break;
            }
            // another commitment of this height is still to go.
            if pending.peek().map_or(false, |next| next.height == commitment.height) {
                continue;
            }
            self.tracker.advance(commitment.height)?;
        }
        Ok(pass)
    }

    /// Relays one commitment.
    ///
    /// A witness-mode submission that fails because the target chain left witness mode in
    /// the meantime is retried once with a proof. The failed transaction is recorded on the
    /// commitment first, so it is kept even if the retry has to wait.
    pub async fn relay(&self, commitment: &Commitment) -> Result<RelayOutcome> {
        let key = commitment.offchain_key();
        let encoded_messages = self
            .source
            .offchain_data(&key)
            .await?
            .ok_or_else(|| Error::MissingOffchainData(key.clone()))?;
        let messages = decode_messages(&encoded_messages)?;
        tracing::trace!(
            "Commitment {} carries {} messages",
            commitment,
            messages.len()
        );

        let witness_mode = self.target.is_witness_mode().await?;
        match self
            .submit(commitment, &encoded_messages, &messages, witness_mode)
            .await?
        {
            RelayOutcome::Failed { tx_id }
                if witness_mode && !self.target.is_witness_mode().await? =>
            {
                tracing::info!(
                    "Target chain left witness mode while relaying {} (tx: {}), retrying with a proof",
                    commitment,
                    tx_id
                );
                self.store.mark_commitment(
                    commitment.height,
                    &commitment.commitment_ref,
                    CommitmentStatus::Received,
                    Some(tx_id),
                    unix_timestamp_millis(),
                )?;
                match self
                    .submit(commitment, &encoded_messages, &messages, false)
                    .await?
                {
                    RelayOutcome::Failed { tx_id } => {
                        self.mark_failed(commitment, tx_id).await
                    }
                    outcome => Ok(outcome),
                }
            }
            RelayOutcome::Failed { tx_id } => {
                self.mark_failed(commitment, tx_id).await
            }
            outcome => Ok(outcome),
        }
    }

    async fn build_proof(
        &self,
        commitment: &Commitment,
        encoded_messages: &[u8],
        witness_mode: bool,
    ) -> Result<Option<MessageProof>> {
        if witness_mode {
            return Ok(Some(MessageProof::witness(encoded_messages.to_vec())));
        }
        let height = commitment.height;
        let trusted = match self.ctx.relay_state().trusted_state() {
            Some(trusted) if trusted.covers(height) => trusted,
            _ => return Ok(None),
        };
        let block = self
            .source
            .block(height)
            .await?
            .ok_or(Error::Generic("finalized block not found"))?;
        let mmr = self
            .source
            .generate_mmr_proof(height, trusted.block_number)
            .await?;
        let mut proof = MessageProof {
            header: block.encoded_header,
            encoded_messages: encoded_messages.to_vec(),
            mmr_leaf: mmr.leaves,
            mmr_proof: mmr.proof,
            light_client_state: Some(trusted.state),
            verification_proxy_signature: None,
        };
        if let Some(cosigner) = &self.cosigner {
            proof.verification_proxy_signature = Some(cosigner.cosign(&proof).await?);
        }
        Ok(Some(proof))
    }

    /// Submits one attempt. A failed attempt is returned but not recorded.
    async fn submit(
        &self,
        commitment: &Commitment,
        encoded_messages: &[u8],
        messages: &[Message],
        witness_mode: bool,
    ) -> Result<RelayOutcome> {
        let Some(proof) = self
            .build_proof(commitment, encoded_messages, witness_mode)
            .await?
        else {
            return self
                .defer(commitment, "no trusted light client state covers it")
                .await;
        };

        let relay_state = self.ctx.relay_state();
        let Ok(_guard) = relay_state.try_lock_relay() else {
            return self.defer(commitment, "light client update in flight").await;
        };
        if !witness_mode && self.actions.is_pending(ActionType::UpdateState)? {
            return self.defer(commitment, "light client update pending").await;
        }

        match self.target.relay_messages(&proof).await {
            Ok(outcome) => {
                self.store.mark_commitment(
                    commitment.height,
                    &commitment.commitment_ref,
                    CommitmentStatus::Relayed,
                    Some(outcome.tx_id.clone()),
                    unix_timestamp_millis(),
                )?;
                self.ctx.metrics.lock().await.commitments_relayed.inc();
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Commitment,
                    commitment = %commitment,
                    status = %CommitmentStatus::Relayed,
                    tx_id = %outcome.tx_id,
                    witness_mode,
                );
                self.track_implied_actions(messages)?;
                Ok(RelayOutcome::Relayed {
                    tx_id: outcome.tx_id,
                })
            }
            Err(e) if e.is_transaction_failure() => {
                tracing::warn!("Commitment {} rejected: {}", commitment, e);
                Ok(RelayOutcome::Failed {
                    tx_id: e.tx_id().unwrap_or_default().to_owned(),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn track_implied_actions(&self, messages: &[Message]) -> Result<()> {
        let implied = messages
            .iter()
            .filter_map(|m| ActionType::implied_by(m.payload_type))
            .chain(std::iter::once(ActionType::ProcessMessages))
            .collect::<BTreeSet<_>>();
        for action_type in implied {
            self.actions.track(action_type)?;
        }
        self.actions.trigger();
        Ok(())
    }

    async fn mark_failed(
        &self,
        commitment: &Commitment,
        tx_id: String,
    ) -> Result<RelayOutcome> {
        self.store.mark_commitment(
            commitment.height,
            &commitment.commitment_ref,
            CommitmentStatus::Failed,
            Some(tx_id.clone()),
            unix_timestamp_millis(),
        )?;
        self.ctx.metrics.lock().await.commitments_failed.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Commitment,
            commitment = %commitment,
            status = %CommitmentStatus::Failed,
            tx_id = %tx_id,
        );
        Ok(RelayOutcome::Failed { tx_id })
    }

    async fn defer(
        &self,
        commitment: &Commitment,
        reason: &'static str,
    ) -> Result<RelayOutcome> {
        self.ctx.metrics.lock().await.commitments_deferred.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Commitment,
            commitment = %commitment,
            status = "deferred",
            reason,
        );
        Ok(RelayOutcome::Deferred { reason })
    }
}
