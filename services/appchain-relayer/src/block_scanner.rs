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

use tokio::sync::Mutex;

use appchain_chain_clients::SourceChainClient;
use appchain_proof_generation::codec::decode_digest_item;
use appchain_relayer_store::RelayerStore;
use appchain_relayer_types::Commitment;
use appchain_relayer_utils::metric::Metrics;
use appchain_relayer_utils::{probe, unix_timestamp_millis, Error, Result};

use crate::height_tracker::HeightTracker;

/// What one scan step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Nothing finalized to scan yet.
    Idle,
    /// Every height up to and including this one is scanned.
    Advanced(u64),
}

/// Walks the finalized source chain blocks in order, recording commitments and
/// authority set changes.
pub struct BlockScanner<S> {
    store: Arc<S>,
    source: Arc<dyn SourceChainClient>,
    tracker: HeightTracker<S>,
    batch_size: u64,
    metrics: Arc<Mutex<Metrics>>,
}

impl<S: RelayerStore> BlockScanner<S> {
    /// A scanner that processes up to `batch_size` heights at once.
    pub fn new(
        store: Arc<S>,
        source: Arc<dyn SourceChainClient>,
        tracker: HeightTracker<S>,
        batch_size: u64,
        metrics: Arc<Mutex<Metrics>>,
    ) -> Self {
        Self {
            store,
            source,
            tracker,
            batch_size: batch_size.max(1),
            metrics,
        }
    }

    /// Scans the next height, or the next batch of heights when far enough behind.
    ///
    /// The cursor only moves once every height of the batch is stored, a failure leaves
    /// it where it was so nothing is skipped.
    pub async fn scan_once(&self) -> Result<ScanStep> {
        let next = self.tracker.next_height()?;
        let latest = self.tracker.latest_finalized();
        if next > latest {
            return Ok(ScanStep::Idle);
        }
        let last = if latest - next >= self.batch_size {
            let last = next + self.batch_size - 1;
            tracing::trace!("Scanning blocks #{} to #{}", next, last);
            let tasks = (next..=last).map(|height| self.process_height(height));
            futures::future::try_join_all(tasks).await?;
            last
        } else {
            self.process_height(next).await?;
            next
        };
        self.tracker.advance(last)?;
        self.metrics
            .lock()
            .await
            .blocks_scanned
            .inc_by((last - next + 1) as f64);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            from = next,
            to = last,
            latest,
        );
        Ok(ScanStep::Advanced(last))
    }

    /// Records the commitments and the authority set change found in the block at `height`.
    ///
    /// Calling it again for the same height changes nothing.
    pub async fn process_height(&self, height: u64) -> Result<()> {
        let block = self
            .source
            .block(height)
            .await?
            .ok_or(Error::Generic("finalized block not found"))?;
        for log in &block.digest_logs {
            let item = decode_digest_item(log)?;
            if let Some(digest) = item.as_commitment() {
                let commitment =
                    Commitment::new(height, digest.to_vec(), unix_timestamp_millis());
                if self.store.insert_commitment(&commitment)? {
                    self.metrics.lock().await.commitments_received.inc();
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Commitment,
                        commitment = %commitment,
                        status = %commitment.status,
                    );
                }
            } else if item.is_authorities_change()
                && self.store.store_session(height)?
            {
                tracing::info!("Authority set changes at #{}", height);
            }
        }
        Ok(())
    }
}
