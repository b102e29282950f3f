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

use std::time::Duration;

use codec::Encode;
use serde_json::json;

use appchain_chain_clients::mocked::MockResponse;
use appchain_proof_generation::codec::BeefyCommitment;
use appchain_relayer::{SyncOutcome, SyncState};
use appchain_relayer_config::RelayConfig;
use appchain_relayer_store::{ActionStore, SessionStore};
use appchain_relayer_types::{ActionType, LightClientState};
use appchain_relayer_utils::Error;

mod common;

use common::{
    authorities, signed_commitment, Harness, COMPLETE_UPDATE_METHOD,
    UPDATE_METHOD,
};

/// A harness whose light client accepted the commitment at `accepted`.
async fn harness(accepted: u64) -> Harness {
    let h = Harness::new();
    h.source.set_authorities(1, authorities());
    h.target.set_latest_commitment(accepted);
    h.pipeline.light_client.refresh_accepted_height().await.unwrap();
    h
}

#[tokio::test]
#[tracing_test::traced_test]
async fn old_commitments_are_stale() {
    let h = harness(200).await;
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Stale);
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(200))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Stale);
    assert!(h.source.mmr_requests().is_empty());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn witness_mode_bypasses_the_light_client() {
    let h = harness(100).await;
    h.store.store_session(120).unwrap();
    h.target.set_witness_mode(true);
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Bypassed);
    assert!(h.target.calls().is_empty());
    assert_eq!(h.ctx.relay_state().trusted_state(), None);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn close_commitments_are_cached_only() {
    let h = harness(100).await;
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Cached(150));
    assert_eq!(h.pipeline.light_client.state(), SyncState::Idle);
    assert!(h.target.calls().is_empty());
    assert_eq!(h.source.mmr_requests(), vec![(vec![149], 150)]);

    let trusted = h.ctx.relay_state().trusted_state().unwrap();
    assert_eq!(trusted.block_number, 150);
    assert_eq!(trusted.state.signed_commitment, signed_commitment(150));
    assert_eq!(trusted.state.validator_proofs.len(), 3);
    assert_eq!(trusted.state.mmr_leaf, 149u64.to_le_bytes().to_vec());
    assert_eq!(h.ctx.relay_state().accepted_height(), Some(100));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn uncovered_session_forces_an_update() {
    let h = harness(100).await;
    h.store.store_session(120).unwrap();
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Accepted(150));
    assert_eq!(h.pipeline.light_client.state(), SyncState::Idle);

    let methods = h
        .target
        .calls()
        .into_iter()
        .map(|(m, _)| m)
        .collect::<Vec<_>>();
    assert_eq!(methods, vec![UPDATE_METHOD, COMPLETE_UPDATE_METHOD]);
    let submitted: LightClientState =
        serde_json::from_value(h.target.calls_to(UPDATE_METHOD)[0].clone())
            .unwrap();
    assert_eq!(submitted.signed_commitment, signed_commitment(150));

    assert_eq!(h.ctx.relay_state().accepted_height(), Some(150));
    assert_eq!(h.store.first_pending_session(1_000).unwrap(), None);
    let action = h.store.get_action(ActionType::UpdateState).unwrap().unwrap();
    assert!(!action.is_pending());
    assert_eq!(
        h.ctx.metrics.lock().await.light_client_updates.get() as u64,
        1
    );
}

#[tokio::test]
#[tracing_test::traced_test]
async fn large_gap_forces_an_update() {
    let h = harness(10).await;
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Accepted(150));
    assert_eq!(h.target.calls_to(UPDATE_METHOD).len(), 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn rejected_update_marks_the_session() {
    let h = harness(100).await;
    h.store.store_session(120).unwrap();
    h.target
        .push_response(UPDATE_METHOD, MockResponse::Failure(String::from("u1")));

    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Rejected);
    assert_eq!(h.pipeline.light_client.state(), SyncState::Idle);
    assert_eq!(h.ctx.relay_state().accepted_height(), Some(100));

    let session = h.store.first_pending_session(150).unwrap().unwrap();
    assert_eq!(session.height, 120);
    assert!(session.failed_at.is_some());
    let action = h.store.get_action(ActionType::UpdateState).unwrap().unwrap();
    assert!(action.is_pending());
    assert_eq!(action.tx_id.as_deref(), Some("u1"));
    assert!(h.target.calls_to(COMPLETE_UPDATE_METHOD).is_empty());
    assert_eq!(
        h.ctx.metrics.lock().await.light_client_update_failures.get() as u64,
        1
    );

    let _ = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(160))
        .await;
    assert!(logs_contain("Session #120 is still not covered"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn commitment_without_an_mmr_root_is_refused() {
    let h = harness(100).await;
    h.store.store_session(120).unwrap();
    let encoded = BeefyCommitment {
        payload: vec![],
        block_number: 150,
        validator_set_id: 0,
    }
    .encode();
    let res = h
        .pipeline
        .light_client
        .handle_signed_commitment(&encoded)
        .await;
    assert!(res.is_err());
    assert!(h.target.calls().is_empty());
    assert_eq!(h.ctx.relay_state().trusted_state(), None);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn incomplete_update_is_finished_before_the_next_one() {
    let h = harness(100).await;
    h.store.store_session(120).unwrap();
    for _ in 0..3 {
        h.target.push_response(
            COMPLETE_UPDATE_METHOD,
            MockResponse::Success(String::from("c"), Some(json!("NeedMoreGas"))),
        );
    }
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Deferred);
    assert!(h.pipeline.actions.is_pending(ActionType::UpdateState).unwrap());
    assert_eq!(h.ctx.relay_state().accepted_height(), Some(100));

    // the contract finishes the update of #150 on the next completion call.
    h.target.set_latest_commitment(150);
    h.store.store_session(155).unwrap();
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(160))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Accepted(160));
    assert_eq!(h.target.calls_to(UPDATE_METHOD).len(), 2);
    assert_eq!(h.target.calls_to(COMPLETE_UPDATE_METHOD).len(), 5);
    assert_eq!(h.store.first_pending_session(1_000).unwrap(), None);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn updates_are_spaced_by_the_minimum_interval() {
    let h = Harness::with_relay_config(RelayConfig {
        update_state_min_interval_ms: 60_000,
        ..RelayConfig::default()
    });
    h.source.set_authorities(1, authorities());
    h.target.set_latest_commitment(100);
    h.store.store_session(120).unwrap();
    let light_client = &h.pipeline.light_client;
    light_client.refresh_accepted_height().await.unwrap();

    let outcome = light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Accepted(150));

    h.store.store_session(155).unwrap();
    let outcome = light_client
        .handle_signed_commitment(&signed_commitment(160))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Deferred);
    assert_eq!(h.target.calls_to(UPDATE_METHOD).len(), 1);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn rotated_authorities_are_proven() {
    let h = harness(100).await;
    h.source.set_authorities(1, authorities()[..2].to_vec());
    h.source.set_authorities(150, authorities());
    let outcome = h
        .pipeline
        .light_client
        .handle_signed_commitment(&signed_commitment(150))
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Cached(150));
    let trusted = h.ctx.relay_state().trusted_state().unwrap();
    assert_eq!(trusted.state.validator_proofs.len(), 3);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn malformed_commitments_are_rejected_early() {
    let h = harness(100).await;
    let err = h
        .pipeline
        .light_client
        .handle_signed_commitment(&[0x05, 0x00])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
    assert_eq!(h.pipeline.light_client.state(), SyncState::Idle);
    assert!(h.source.mmr_requests().is_empty());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn follows_the_finality_stream() {
    let h = harness(100).await;
    h.source.push_signed_commitment(signed_commitment(120));
    h.source.push_signed_commitment(signed_commitment(140));
    let run = tokio::time::timeout(
        Duration::from_millis(200),
        h.pipeline.light_client.run(),
    )
    .await;
    // the stream never ends.
    assert!(run.is_err());
    let trusted = h.ctx.relay_state().trusted_state().unwrap();
    assert_eq!(trusted.block_number, 140);
}
