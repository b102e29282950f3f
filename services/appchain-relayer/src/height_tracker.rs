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

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;

use appchain_chain_clients::SourceChainClient;
use appchain_relayer_store::HistoryStore;
use appchain_relayer_types::CursorKind;
use appchain_relayer_utils::{probe, Error, Result};

/// Tracks the next height to process for one kind of work, and the latest finalized height
/// of the source chain.
///
/// Trackers created with [`HeightTracker::with_kind`] share the same finalized watermark.
#[derive(Debug, Clone)]
pub struct HeightTracker<S> {
    store: Arc<S>,
    kind: CursorKind,
    start_height: u64,
    latest_finalized: Arc<AtomicU64>,
}

impl<S: HistoryStore> HeightTracker<S> {
    /// A tracker of the `kind` cursor, with a fresh finalized watermark.
    pub fn new(store: Arc<S>, kind: CursorKind, start_height: u64) -> Self {
        Self {
            store,
            kind,
            start_height,
            latest_finalized: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A tracker for another cursor, sharing the finalized watermark.
    pub fn with_kind(&self, kind: CursorKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// `last persisted height + 1`, or the start height if nothing was processed yet.
    pub fn next_height(&self) -> Result<u64> {
        let next = self
            .store
            .get_cursor(self.kind)?
            .map_or(self.start_height, |h| h + 1);
        Ok(next.max(self.start_height))
    }

    /// The last fully processed height, if any.
    pub fn current(&self) -> Result<Option<u64>> {
        self.store.get_cursor(self.kind)
    }

    /// The latest finalized height observed, `0` until the first observation.
    pub fn latest_finalized(&self) -> u64 {
        self.latest_finalized.load(Ordering::SeqCst)
    }

    /// Records a finalized height, older observations are ignored.
    pub fn observe_finalized(&self, height: u64) {
        let previous = self.latest_finalized.fetch_max(height, Ordering::SeqCst);
        if height > previous {
            tracing::trace!("Latest finalized block: #{}", height);
        }
    }

    /// Persists `height` as fully processed. The cursor never moves backwards.
    pub fn advance(&self, height: u64) -> Result<()> {
        if let Some(current) = self.store.get_cursor(self.kind)? {
            if current >= height {
                return Ok(());
            }
        }
        self.store.set_cursor(self.kind, height)?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Sync,
            cursor = %self.kind,
            height,
        );
        Ok(())
    }

    /// Follows the finalized heads of the source chain, forever.
    ///
    /// A dropped subscription is re-established, if that keeps failing for longer than
    /// `grace` a [`Error::Fatal`] is returned.
    pub async fn follow_finalized<C>(
        &self,
        client: &C,
        grace: Duration,
    ) -> Result<()>
    where
        C: SourceChainClient + ?Sized,
    {
        let mut disconnected_since: Option<Instant> = None;
        loop {
            match client.subscribe_finalized_heights().await {
                Ok(mut heights) => {
                    while let Some(item) = heights.next().await {
                        match item {
                            Ok(height) => {
                                disconnected_since = None;
                                self.observe_finalized(height);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "Finalized heads subscription error: {}",
                                    e
                                );
                                break;
                            }
                        }
                    }
                    tracing::warn!("Finalized heads subscription ended");
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to subscribe to finalized heads: {}",
                        e
                    );
                }
            }
            let since = *disconnected_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= grace {
                tracing::error!(
                    "Source chain disconnected for more than {:?}",
                    grace
                );
                return Err(Error::Fatal("source chain disconnected"));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appchain_chain_clients::mocked::MockedSourceChain;
    use appchain_relayer_store::InMemoryStore;

    fn tracker(start: u64) -> HeightTracker<InMemoryStore> {
        HeightTracker::new(
            Arc::new(InMemoryStore::default()),
            CursorKind::Scan,
            start,
        )
    }

    #[test]
    fn next_height_starts_at_start_height() {
        let tracker = tracker(100);
        assert_eq!(tracker.next_height().unwrap(), 100);
        tracker.advance(100).unwrap();
        assert_eq!(tracker.next_height().unwrap(), 101);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let tracker = tracker(0);
        tracker.advance(20).unwrap();
        tracker.advance(5).unwrap();
        assert_eq!(tracker.current().unwrap(), Some(20));
    }

    #[test]
    fn kinds_share_the_finalized_watermark() {
        let scan = tracker(0);
        let relay = scan.with_kind(CursorKind::Relay);
        assert_eq!(relay.latest_finalized(), 0);
        scan.observe_finalized(42);
        scan.observe_finalized(41);
        assert_eq!(relay.latest_finalized(), 42);
        scan.advance(10).unwrap();
        assert_eq!(relay.current().unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_source_is_fatal_after_grace() {
        let tracker = tracker(0);
        let source = MockedSourceChain::default();
        source.set_unreachable(true);
        let err = tracker
            .follow_finalized(&source, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn follows_the_finalized_heads() {
        let tracker = tracker(0);
        let source = MockedSourceChain::default();
        source.set_finalized(77);
        let _ = tokio::time::timeout(
            Duration::from_millis(50),
            tracker.follow_finalized(&source, Duration::from_secs(60)),
        )
        .await;
        assert_eq!(tracker.latest_finalized(), 77);
    }
}
