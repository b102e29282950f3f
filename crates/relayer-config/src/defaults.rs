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

#![allow(missing_docs)]

/// The default port the relayer will listen on. Defaults to 9955.
pub const fn relayer_port() -> u16 {
    9955
}

/// 300 Tgas is attached to every call by default.
pub const fn gas() -> u64 {
    300_000_000_000_000
}
/// At most `20` blocks are scanned per batch by default.
pub const fn block_sync_size() -> u64 {
    20
}
/// The scanner sleeps `6_000`ms once caught up.
pub const fn scan_interval_ms() -> u64 {
    6_000
}
/// The relay loop runs every `6_000`ms.
pub const fn relay_interval_ms() -> u64 {
    6_000
}
/// Pending actions are polled every `200`ms.
pub const fn action_poll_interval_ms() -> u64 {
    200
}
pub const fn update_state_min_interval_ms() -> u64 {
    6_000
}
/// The light client may lag `100` blocks behind by default.
pub const fn update_state_max_gap() -> u64 {
    100
}
pub const fn max_confirm_attempts() -> usize {
    10
}
pub const fn confirm_retry_interval_ms() -> u64 {
    1_000
}
/// A loop cycle may take up to `120` seconds.
pub const fn watchdog_timeout_secs() -> u64 {
    120
}
pub const fn liveness_probe_timeout_secs() -> u64 {
    10
}
/// The source chain may stay disconnected for `20` minutes.
pub const fn disconnect_grace_secs() -> u64 {
    1_200
}
