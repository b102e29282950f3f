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

use backoff::backoff::Backoff;
use tokio::sync::{Mutex, Notify};

use appchain_chain_clients::{AnchorContract, Completion, TargetChainClient};
use appchain_relayer_store::RelayerStore;
use appchain_relayer_types::ActionType;
use appchain_relayer_utils::metric::Metrics;
use appchain_relayer_utils::retry::ConstantWithMaxRetryCount;
use appchain_relayer_utils::{probe, unix_timestamp_millis, Result};

/// How a [`ActionTracker::confirm`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Nothing is pending, or the target chain just completed the action.
    Completed,
    /// Still cooling down after a failure, nothing was attempted.
    CoolingDown,
    /// The target chain needs more calls than the attempt budget allowed.
    Incomplete,
    /// The target chain rejected the completion call, a new cool-down started.
    Failed,
}

/// Drives the multi-step administrative actions of the target chain to completion.
pub struct ActionTracker<S> {
    store: Arc<S>,
    target: Arc<dyn TargetChainClient>,
    min_interval: Duration,
    max_attempts: usize,
    retry_interval: Duration,
    metrics: Arc<Mutex<Metrics>>,
    // one completion call sequence at a time.
    confirm_lock: Mutex<()>,
    wake_up: Notify,
}

impl<S: RelayerStore> ActionTracker<S> {
    /// A failed action is retried after `min_interval`, a completion sequence makes at most
    /// `max_attempts` calls spaced by `retry_interval`.
    pub fn new(
        store: Arc<S>,
        target: Arc<dyn TargetChainClient>,
        min_interval: Duration,
        max_attempts: usize,
        retry_interval: Duration,
        metrics: Arc<Mutex<Metrics>>,
    ) -> Self {
        Self {
            store,
            target,
            min_interval,
            max_attempts: max_attempts.max(1),
            retry_interval,
            metrics,
            confirm_lock: Mutex::new(()),
            wake_up: Notify::new(),
        }
    }

    /// Whether `action_type` may be attempted now.
    ///
    /// True if the action was never recorded, never failed, is completed, or its last
    /// failure is older than the minimum interval.
    pub fn is_healthy(&self, action_type: ActionType) -> Result<bool> {
        Ok(self.store.get_action(action_type)?.map_or(true, |action| {
            action.is_healthy_at(unix_timestamp_millis(), self.min_interval)
        }))
    }

    /// Whether `action_type` is recorded and not completed yet.
    pub fn is_pending(&self, action_type: ActionType) -> Result<bool> {
        Ok(self
            .store
            .get_action(action_type)?
            .map_or(false, |action| action.is_pending()))
    }

    /// Records that the target chain now has `action_type` to complete.
    pub fn track(&self, action_type: ActionType) -> Result<()> {
        let action = self
            .store
            .upsert_pending_action(action_type, unix_timestamp_millis())?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Action,
            action = %action.action_type,
            status = ?action.status,
        );
        Ok(())
    }

    /// Asks the polling loop to run a pass now.
    pub fn trigger(&self) {
        self.wake_up.notify_one();
    }

    /// Tries to complete a pending action with a bounded number of completion calls.
    pub async fn confirm(&self, action_type: ActionType) -> Result<Confirmation> {
        let _guard = self.confirm_lock.lock().await;
        if !self.is_pending(action_type)? {
            return Ok(Confirmation::Completed);
        }
        if !self.is_healthy(action_type)? {
            tracing::trace!("{} is cooling down", action_type);
            return Ok(Confirmation::CoolingDown);
        }
        let mut backoff = ConstantWithMaxRetryCount::new(
            self.retry_interval,
            self.max_attempts - 1,
        );
        loop {
            let (outcome, completion) =
                match self.target.try_complete(action_type).await {
                    Ok(v) => v,
                    Err(e) if e.is_transaction_failure() => {
                        let tx_id = e.tx_id().map(ToOwned::to_owned);
                        tracing::warn!("{} failed: {}", action_type, e);
                        self.record_failure(action_type, tx_id).await?;
                        return Ok(Confirmation::Failed);
                    }
                    Err(e) => return Err(e),
                };
            match completion {
                Completion::Done => {
                    self.store
                        .complete_action(action_type, unix_timestamp_millis())?;
                    self.metrics.lock().await.actions_completed.inc();
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Action,
                        action = %action_type,
                        status = "completed",
                        tx_id = %outcome.tx_id,
                    );
                    return Ok(Confirmation::Completed);
                }
                Completion::Incomplete(reason) => {
                    tracing::debug!(
                        "{} not complete yet ({}), tx: {}",
                        action_type,
                        reason,
                        outcome.tx_id
                    );
                    match backoff.next_backoff() {
                        Some(wait) => tokio::time::sleep(wait).await,
                        None => {
                            tracing::warn!(
                                "{} still incomplete after {} calls",
                                action_type,
                                backoff.retries() + 1
                            );
                            return Ok(Confirmation::Incomplete);
                        }
                    }
                }
                Completion::Error(reason) => {
                    tracing::warn!(
                        "{} rejected by the target chain: {}, tx: {}",
                        action_type,
                        reason,
                        outcome.tx_id
                    );
                    self.record_failure(action_type, Some(outcome.tx_id))
                        .await?;
                    return Ok(Confirmation::Failed);
                }
            }
        }
    }

    pub(crate) async fn record_failure(
        &self,
        action_type: ActionType,
        tx_id: Option<String>,
    ) -> Result<()> {
        let action = self.store.fail_action(
            action_type,
            tx_id,
            unix_timestamp_millis(),
        )?;
        self.metrics.lock().await.actions_failed.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Action,
            action = %action_type,
            status = "failed",
            tx_id = ?action.tx_id,
        );
        Ok(())
    }

    /// Runs [`ActionTracker::confirm`] for every pending action.
    pub async fn process_pending(&self) -> Result<()> {
        for action in self.store.pending_actions()? {
            let action_type = action.action_type;
            match self.confirm(action_type).await {
                Ok(Confirmation::Completed) => {
                    tracing::info!("{} completed", action_type)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to confirm {}: {}", action_type, e)
                }
            }
        }
        Ok(())
    }

    /// Polls the pending actions every `interval`, or sooner when triggered.
    pub async fn run(&self, interval: Duration) -> Result<()> {
        loop {
            self.process_pending().await?;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = self.wake_up.notified() => {},
            }
        }
    }
}
