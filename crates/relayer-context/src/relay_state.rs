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
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, TryLockError};

use appchain_relayer_types::TrustedLightClientState;

/// State shared by the light client sync and the commitment relay.
///
/// The relay lock is held across a target chain submission, so a light client update and
/// a message batch are never in flight at the same time. Everything else is read and
/// written between suspension points only.
#[derive(Debug, Default)]
pub struct RelayState {
    relay_lock: AsyncMutex<()>,
    trusted_state: RwLock<Option<TrustedLightClientState>>,
    /// `0` until the first accepted commitment is known.
    accepted_height: AtomicU64,
    last_update: Mutex<Option<Instant>>,
}

impl RelayState {
    /// Waits for the relay lock.
    pub async fn lock_relay(&self) -> MutexGuard<'_, ()> {
        self.relay_lock.lock().await
    }

    /// Takes the relay lock if nobody holds it.
    pub fn try_lock_relay(&self) -> Result<MutexGuard<'_, ()>, TryLockError> {
        self.relay_lock.try_lock()
    }

    /// The most recent trusted light client state.
    pub fn trusted_state(&self) -> Option<TrustedLightClientState> {
        self.trusted_state.read().clone()
    }

    /// Caches `state` unless a newer one is already cached.
    ///
    /// Returns `true` if the cache changed.
    pub fn cache_trusted_state(&self, state: TrustedLightClientState) -> bool {
        let mut cached = self.trusted_state.write();
        match cached.as_ref() {
            Some(c) if c.block_number >= state.block_number => false,
            _ => {
                *cached = Some(state);
                true
            }
        }
    }

    /// The height of the last commitment the target chain accepted, if any.
    pub fn accepted_height(&self) -> Option<u64> {
        match self.accepted_height.load(Ordering::SeqCst) {
            0 => None,
            h => Some(h),
        }
    }

    /// Raises the accepted height watermark, it never goes down.
    pub fn raise_accepted_height(&self, height: u64) {
        self.accepted_height.fetch_max(height, Ordering::SeqCst);
    }

    /// Whether `min_interval` has passed since the last light client update.
    pub fn update_allowed(&self, min_interval: Duration) -> bool {
        self.last_update
            .lock()
            .map_or(true, |at| at.elapsed() >= min_interval)
    }

    /// Remembers that a light client update was just submitted.
    pub fn mark_update(&self) {
        *self.last_update.lock() = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appchain_relayer_types::LightClientState;

    fn state(block_number: u64) -> TrustedLightClientState {
        TrustedLightClientState {
            block_number,
            state: LightClientState {
                signed_commitment: vec![],
                validator_proofs: vec![],
                mmr_leaf: vec![],
                mmr_proof: vec![],
            },
        }
    }

    #[test]
    fn trusted_state_only_moves_forward() {
        let relay_state = RelayState::default();
        assert!(relay_state.cache_trusted_state(state(10)));
        assert!(!relay_state.cache_trusted_state(state(5)));
        assert!(!relay_state.cache_trusted_state(state(10)));
        assert_eq!(relay_state.trusted_state().unwrap().block_number, 10);
        assert!(relay_state.cache_trusted_state(state(11)));
    }

    #[test]
    fn accepted_height_never_decreases() {
        let relay_state = RelayState::default();
        assert_eq!(relay_state.accepted_height(), None);
        relay_state.raise_accepted_height(20);
        relay_state.raise_accepted_height(7);
        assert_eq!(relay_state.accepted_height(), Some(20));
    }

    #[test]
    fn updates_are_spaced() {
        let relay_state = RelayState::default();
        assert!(relay_state.update_allowed(Duration::from_secs(60)));
        relay_state.mark_update();
        assert!(!relay_state.update_allowed(Duration::from_secs(60)));
        assert!(relay_state.update_allowed(Duration::ZERO));
    }

    #[tokio::test]
    async fn relay_lock_is_exclusive() {
        let relay_state = RelayState::default();
        let guard = relay_state.lock_relay().await;
        assert!(relay_state.try_lock_relay().is_err());
        drop(guard);
        assert!(relay_state.try_lock_relay().is_ok());
    }
}
