// This file is part of staking-stats.
// Copyright (C) 2026 staking-stats contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::error::Error as StdError;

/// Chain node abstraction: typed read-only queries against on-chain state.
/// Implementations connect on demand; callers never hold a connection
/// themselves.
#[trait_variant::make(Send)]
pub trait Node
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Current total token issuance in chain-native base units.
    async fn total_supply(&self) -> Result<u128, Self::Error>;

    /// Account balances for the given addresses, one record per address,
    /// matching the input order 1:1.
    async fn balances(&self, addresses: &[String]) -> Result<Vec<AccountBalance>, Self::Error>;

    /// The token's display decimal count; the first registered value if the
    /// chain exposes several.
    async fn chain_decimals(&self) -> Result<u32, Self::Error>;

    /// Human readable chain name.
    async fn chain_name(&self) -> Result<String, Self::Error>;

    /// Total value locked in staking at the current era, in base units.
    /// A missing era record is an error, not zero.
    async fn tvl(&self) -> Result<u128, Self::Error>;

    /// The reward rate calculation inputs, read concurrently from one
    /// connection as an all-or-nothing bundle.
    async fn reward_inputs(&self) -> Result<RewardInputs, Self::Error>;
}

/// Inputs for the annualized reward rate derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardInputs {
    /// Reward paid out per block, in base units.
    pub block_rewards: u128,

    /// Current on-chain timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,

    /// Height of the latest block.
    pub latest_block: u32,

    /// Share of block rewards assigned to developers, in `[0, 1]`.
    pub developer_reward_fraction: f64,

    /// Number of blocks per staking era.
    pub blocks_per_era: u32,
}

/// Balance of a single account in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountBalance {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
}
