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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use appchain_chain_clients::SourceChainClient;
use appchain_relayer_utils::metric::Metrics;
use appchain_relayer_utils::{probe, Error, Result};

/// Bounds how long one cycle of a loop may run.
///
/// When a cycle overruns, it is abandoned and the source chain is probed: if it answers the
/// stall is logged and the loop goes on, if it does not a [`Error::Fatal`] is returned so the
/// process exits and gets restarted with fresh connections.
#[derive(Clone)]
pub struct Watchdog {
    source: Arc<dyn SourceChainClient>,
    timeout: Duration,
    probe_timeout: Duration,
    metrics: Arc<Mutex<Metrics>>,
}

impl Watchdog {
    /// A watchdog probing `source` after `timeout`, the probe itself may take `probe_timeout`.
    pub fn new(
        source: Arc<dyn SourceChainClient>,
        timeout: Duration,
        probe_timeout: Duration,
        metrics: Arc<Mutex<Metrics>>,
    ) -> Self {
        Self {
            source,
            timeout,
            probe_timeout,
            metrics,
        }
    }

    /// Runs `cycle`, returns `None` if it was abandoned.
    pub async fn guard<F, T>(&self, name: &'static str, cycle: F) -> Result<Option<T>>
    where
        F: Future<Output = T>,
    {
        match tokio::time::timeout(self.timeout, cycle).await {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                self.metrics.lock().await.watchdog_expired.inc();
                let probe = tokio::time::timeout(
                    self.probe_timeout,
                    self.source.finalized_height(),
                )
                .await;
                let alive = matches!(probe, Ok(Ok(_)));
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Watchdog,
                    cycle = name,
                    timeout = ?self.timeout,
                    alive,
                );
                if alive {
                    tracing::warn!(
                        "{} cycle took longer than {:?}, the source chain is alive, moving on",
                        name,
                        self.timeout
                    );
                    Ok(None)
                } else {
                    tracing::error!(
                        "{} cycle took longer than {:?} and the source chain does not answer",
                        name,
                        self.timeout
                    );
                    Err(Error::Fatal("source chain liveness probe failed"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appchain_chain_clients::mocked::MockedSourceChain;

    fn watchdog(source: Arc<MockedSourceChain>) -> Watchdog {
        Watchdog::new(
            source,
            Duration::from_millis(10),
            Duration::from_millis(10),
            Arc::new(Mutex::new(Metrics::new().unwrap())),
        )
    }

    #[tokio::test]
    async fn fast_cycles_pass_through() {
        let watchdog = watchdog(Arc::new(MockedSourceChain::default()));
        let v = watchdog.guard("test", async { 7 }).await.unwrap();
        assert_eq!(v, Some(7));
    }

    #[tokio::test]
    async fn stalled_cycle_with_live_source_is_abandoned() {
        let watchdog = watchdog(Arc::new(MockedSourceChain::default()));
        let v = watchdog
            .guard("test", futures::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(v, None);
        assert_eq!(watchdog.metrics.lock().await.watchdog_expired.get(), 1.0);
    }

    #[tokio::test]
    async fn stalled_cycle_with_dead_source_is_fatal() {
        let source = Arc::new(MockedSourceChain::default());
        source.set_unreachable(true);
        let err = watchdog(source)
            .guard("test", futures::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
