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

use prometheus::core::{AtomicF64, GenericCounter, GenericGauge};
use prometheus::{opts, Encoder, Registry, TextEncoder};

/// A struct definition for collecting metrics in the relayer.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    /// Source chain blocks scanned for commitments.
    pub blocks_scanned: GenericCounter<AtomicF64>,
    /// Commitments discovered on the source chain.
    pub commitments_received: GenericCounter<AtomicF64>,
    /// Commitments accepted by the target chain.
    pub commitments_relayed: GenericCounter<AtomicF64>,
    /// Commitments rejected by the target chain.
    pub commitments_failed: GenericCounter<AtomicF64>,
    /// How many times a commitment was deferred.
    pub commitments_deferred: GenericCounter<AtomicF64>,
    /// Light client state updates accepted by the target chain.
    pub light_client_updates: GenericCounter<AtomicF64>,
    /// Light client state updates rejected by the target chain.
    pub light_client_update_failures: GenericCounter<AtomicF64>,
    /// Administrative actions completed on the target chain.
    pub actions_completed: GenericCounter<AtomicF64>,
    /// Administrative action attempts that failed with a transaction outcome.
    pub actions_failed: GenericCounter<AtomicF64>,
    /// How many times the watchdog expired.
    pub watchdog_expired: GenericCounter<AtomicF64>,
    /// Total amount of data stored metric
    pub total_amount_of_data_stored: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Instantiates the various metrics and their counters, also creates a registry for the counters and
    /// registers the counters
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            let c = GenericCounter::<AtomicF64>::with_opts(opts!(name, help))?;
            registry.register(Box::new(c.clone()))?;
            Ok::<_, prometheus::Error>(c)
        };
        let blocks_scanned = counter(
            "blocks_scanned",
            "The total number of source chain blocks scanned",
        )?;
        let commitments_received = counter(
            "commitments_received",
            "The total number of commitments found on the source chain",
        )?;
        let commitments_relayed = counter(
            "commitments_relayed",
            "The total number of commitments relayed to the target chain",
        )?;
        let commitments_failed = counter(
            "commitments_failed",
            "The total number of commitments rejected by the target chain",
        )?;
        let commitments_deferred = counter(
            "commitments_deferred",
            "How many times a commitment was deferred to the next pass",
        )?;
        let light_client_updates = counter(
            "light_client_updates",
            "The total number of light client states accepted by the target chain",
        )?;
        let light_client_update_failures = counter(
            "light_client_update_failures",
            "The total number of light client states rejected by the target chain",
        )?;
        let actions_completed = counter(
            "actions_completed",
            "The total number of administrative actions completed",
        )?;
        let actions_failed = counter(
            "actions_failed",
            "The total number of failed administrative action attempts",
        )?;
        let watchdog_expired = counter(
            "watchdog_expired",
            "How many times a pipeline cycle exceeded the watchdog timeout",
        )?;
        let total_amount_of_data_stored = GenericGauge::<AtomicF64>::with_opts(
            opts!(
                "total_amount_of_data_stored",
                "The Total number of data stored"
            ),
        )?;
        registry.register(Box::new(total_amount_of_data_stored.clone()))?;

        Ok(Self {
            registry,
            blocks_scanned,
            commitments_received,
            commitments_relayed,
            commitments_failed,
            commitments_deferred,
            light_client_updates,
            light_client_update_failures,
            actions_completed,
            actions_failed,
            watchdog_expired,
            total_amount_of_data_stored,
        })
    }

    /// Gathers the whole relayer metrics in the prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("metrics are not utf8: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_instance_has_its_own_registry() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.commitments_relayed.inc();
        assert_eq!(a.commitments_relayed.get() as u64, 1);
        assert_eq!(b.commitments_relayed.get() as u64, 0);
        let text = a.gather_metrics().unwrap();
        assert!(text.contains("commitments_relayed 1"));
    }
}
