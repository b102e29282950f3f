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

use axum::extract::State;
use axum::Json;

use appchain_relayer::handlers::{handle_metric_info, RelayerMetricResponse};
use appchain_relayer_types::{CommitmentStatus, PayloadType};

mod common;

use common::Harness;

#[tokio::test]
#[tracing_test::traced_test]
async fn metrics_endpoint_reports_the_relay_counters() {
    let h = Harness::new();
    let c = h.commitment(100, &[0x01], &[PayloadType::Lock]);
    h.finalize(200);
    h.target.set_witness_mode(true);
    h.pipeline.relay.process_pending().await.unwrap();
    assert_eq!(h.commitment_row(&c).status, CommitmentStatus::Relayed);

    let Json(RelayerMetricResponse { metrics }) =
        handle_metric_info(State(Arc::new(h.ctx.clone())))
            .await
            .unwrap();
    assert!(metrics.contains("commitments_relayed 1"));
    assert!(metrics.contains("commitments_failed 0"));
}
