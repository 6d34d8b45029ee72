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

use crate::domain::node::{Node, RewardInputs};
use log::error;
use serde::Deserialize;
use stats_common::error::BoxError;
use thiserror::Error;

/// Share of total block rewards assigned to the staking pool; the remainder
/// goes to block validators.
const STAKER_POOL_SHARE: f64 = 0.5;

/// Days per year, matching the era rate annualization.
const DAYS_PER_YEAR: f64 = 365.25;

/// Compounding periods per year for the APR to APY conversion.
const COMPOUNDING_PERIODS: f64 = 365.0;

/// Config for the staking calculations.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Config {
    /// Unix timestamp in seconds of the network's first block; network
    /// specific, supplied by configuration rather than derived.
    pub genesis_timestamp: u64,
}

/// Staking reward rate calculations on top of a [Node].
#[derive(Clone)]
pub struct StakingService<N> {
    node: N,
    genesis_timestamp: u64,
}

impl<N> StakingService<N>
where
    N: Node,
{
    pub fn new(node: N, config: Config) -> Self {
        Self {
            node,
            genesis_timestamp: config.genesis_timestamp,
        }
    }

    /// The current annualized simple reward rate in percent.
    ///
    /// Any internal failure is logged with its cause and collapsed into
    /// [StakingError::UpstreamData]; callers never see transport detail.
    pub async fn apr(&self) -> Result<f64, StakingError> {
        match self.apr_inner().await {
            Ok(apr) => Ok(apr),

            Err(error) => {
                error!(error:%; "cannot calculate APR");
                Err(StakingError::UpstreamData)
            }
        }
    }

    /// The current compounded annual reward rate in percent.
    pub async fn apy(&self) -> Result<f64, StakingError> {
        let apr = self.apr().await?;
        Ok(apr_to_apy(apr))
    }

    /// Total value locked in staking at the current era, in base units.
    pub async fn tvl(&self) -> Result<u128, StakingError> {
        match self.node.tvl().await {
            Ok(tvl) => Ok(tvl),

            Err(error) => {
                error!(error:%; "cannot fetch TVL");
                Err(StakingError::UpstreamData)
            }
        }
    }

    async fn apr_inner(&self) -> Result<f64, BoxError> {
        let inputs = self.node.reward_inputs().await?;
        let decimals = self.node.chain_decimals().await?;
        let tvl = self.node.tvl().await?;

        let apr = annualized_rate(&inputs, decimals, tvl, self.genesis_timestamp)?;

        Ok(apr)
    }
}

/// The annualized simple staking reward rate in percent.
///
/// The block reward and `tvl` are base-unit amounts; both are scaled with
/// `decimals` before any ratio is taken.
pub fn annualized_rate(
    inputs: &RewardInputs,
    decimals: u32,
    tvl: u128,
    genesis_timestamp: u64,
) -> Result<f64, RateError> {
    let RewardInputs {
        block_rewards,
        timestamp_ms,
        latest_block,
        developer_reward_fraction,
        blocks_per_era,
    } = *inputs;

    let block_rewards = scale_down(block_rewards, decimals);

    let elapsed_minutes = ((timestamp_ms / 1_000) as f64 - genesis_timestamp as f64) / 60.0;
    if elapsed_minutes <= 0.0 {
        return Err(RateError::NonPositiveElapsedTime {
            timestamp_ms,
            genesis_timestamp,
        });
    }

    let blocks_per_minute = latest_block as f64 / elapsed_minutes;
    let blocks_per_day = blocks_per_minute * 60.0 * 24.0;
    let era_rate = blocks_per_day / blocks_per_era as f64;
    let era_rewards = blocks_per_era as f64 * block_rewards;
    let annual_rewards = era_rewards * era_rate * DAYS_PER_YEAR;

    if tvl == 0 {
        return Err(RateError::ZeroTvl);
    }
    let total_staked = scale_down(tvl, decimals);

    let staker_share = (1.0 - developer_reward_fraction) * STAKER_POOL_SHARE;

    Ok(annual_rewards / total_staked * staker_share * 100.0)
}

/// The compounded annual rate in percent for the given simple annual rate in
/// percent, compounding daily.
pub fn apr_to_apy(apr: f64) -> f64 {
    ((1.0 + apr / 100.0 / COMPOUNDING_PERIODS).powf(COMPOUNDING_PERIODS) - 1.0) * 100.0
}

fn scale_down(amount: u128, decimals: u32) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Coarse user-facing staking calculation error; the original cause is
/// logged where it occurs, not exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StakingError {
    #[error(
        "cannot calculate the network reward rate, most likely due to an error fetching data \
         from a node"
    )]
    UpstreamData,
}

/// Error possibly returned by [annualized_rate] for inconsistent upstream
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateError {
    #[error(
        "chain timestamp {timestamp_ms}ms is not after the genesis timestamp \
         {genesis_timestamp}s"
    )]
    NonPositiveElapsedTime {
        timestamp_ms: u64,
        genesis_timestamp: u64,
    },

    #[error("total value locked is zero")]
    ZeroTvl,
}
