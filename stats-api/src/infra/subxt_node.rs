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

pub mod connection;

pub use connection::{ConnectionError, EmptyEndpoints};

use crate::{
    domain::node::{AccountBalance, Node, RewardInputs},
    infra::subxt_node::connection::{ConnectionManager, Connector},
};
use fastrace::trace;
use parity_scale_codec::Decode;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use stats_common::error::BoxError;
use std::{collections::HashMap, future::Future, str::FromStr, sync::Arc, time::Duration};
use subxt::{
    OnlineClient, SubstrateConfig,
    backend::{
        legacy::LegacyRpcMethods,
        rpc::reconnecting_rpc_client::{ExponentialBackoff, RpcClient},
    },
    dynamic::{DecodedValueThunk, Value},
    utils::AccountId32,
};
use thiserror::Error;
use tokio::try_join;

const PERBILL_DENOMINATOR: u32 = 1_000_000_000;

/// One established node connection: typed client plus legacy RPC methods,
/// both on a shared reconnecting RPC client.
pub struct Connection {
    client: OnlineClient<SubstrateConfig>,
    legacy: LegacyRpcMethods<SubstrateConfig>,
}

/// Config for node connections.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Endpoint URLs in failover priority order; must not be empty.
    pub endpoints: Vec<String>,

    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Full passes over the endpoint list before giving up on connecting.
    #[serde(default = "default_max_sweeps")]
    pub max_sweeps: usize,

    #[serde(with = "humantime_serde")]
    pub reconnect_max_delay: Duration,

    pub reconnect_max_attempts: usize,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_sweeps() -> usize {
    3
}

/// A [Node] implementation based on subxt, connecting on demand through the
/// failover [ConnectionManager].
#[derive(Clone)]
pub struct SubxtNode {
    connection: Arc<ConnectionManager<SubxtConnector>>,
}

impl SubxtNode {
    /// Create a new [SubxtNode] with the given [Config]. No connection is
    /// established until the first chain read.
    pub fn new(config: Config) -> Result<Self, EmptyEndpoints> {
        let Config {
            endpoints,
            connect_timeout,
            max_sweeps,
            reconnect_max_delay,
            reconnect_max_attempts,
        } = config;

        let connector = SubxtConnector {
            retry_max_delay: reconnect_max_delay,
            retry_max_attempts: reconnect_max_attempts,
        };
        let connection = ConnectionManager::new(connector, endpoints, connect_timeout, max_sweeps)?;

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// Run the given chain read, discarding the live connection handle on
    /// failure so the next call establishes a fresh one.
    async fn try_read<T>(
        &self,
        read: impl Future<Output = Result<T, SubxtNodeError>>,
    ) -> Result<T, SubxtNodeError> {
        match read.await {
            Ok(value) => Ok(value),

            Err(error) => {
                self.connection.invalidate().await;
                Err(error)
            }
        }
    }
}

impl Node for SubxtNode {
    type Error = SubxtNodeError;

    async fn total_supply(&self) -> Result<u128, Self::Error> {
        let connection = self.connection.ensure_connected().await?;
        self.try_read(fetch_total_supply(&connection)).await
    }

    async fn balances(&self, addresses: &[String]) -> Result<Vec<AccountBalance>, Self::Error> {
        let connection = self.connection.ensure_connected().await?;
        self.try_read(fetch_balances(&connection, addresses)).await
    }

    async fn chain_decimals(&self) -> Result<u32, Self::Error> {
        let connection = self.connection.ensure_connected().await?;
        self.try_read(fetch_chain_decimals(&connection)).await
    }

    async fn chain_name(&self) -> Result<String, Self::Error> {
        let connection = self.connection.ensure_connected().await?;
        self.try_read(fetch_chain_name(&connection)).await
    }

    async fn tvl(&self) -> Result<u128, Self::Error> {
        let connection = self.connection.ensure_connected().await?;
        self.try_read(fetch_tvl(&connection)).await
    }

    async fn reward_inputs(&self) -> Result<RewardInputs, Self::Error> {
        let connection = self.connection.ensure_connected().await?;
        self.try_read(fetch_reward_inputs(&connection)).await
    }
}

/// Dials one endpoint: reconnecting RPC client with exponential backoff,
/// typed online client and legacy RPC methods on top.
#[derive(Clone)]
struct SubxtConnector {
    retry_max_delay: Duration,
    retry_max_attempts: usize,
}

impl Connector for SubxtConnector {
    type Connection = Arc<Connection>;
    type Error = ConnectError;

    async fn connect(&self, endpoint: &str) -> Result<Self::Connection, Self::Error> {
        let retry_policy = ExponentialBackoff::from_millis(10)
            .max_delay(self.retry_max_delay)
            .take(self.retry_max_attempts);
        let rpc_client = RpcClient::builder()
            .retry_policy(retry_policy)
            .build(endpoint)
            .await
            .map_err(|error| ConnectError::RpcClient(error.into()))?;

        let client = OnlineClient::<SubstrateConfig>::from_rpc_client(rpc_client.clone()).await?;
        let legacy = LegacyRpcMethods::<SubstrateConfig>::new(rpc_client.into());

        Ok(Arc::new(Connection { client, legacy }))
    }
}

/// Error possibly returned for a single connection attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot create reconnecting RPC client")]
    RpcClient(#[source] BoxError),

    #[error("cannot create online client")]
    OnlineClient(#[from] subxt::Error),
}

async fn fetch_total_supply(connection: &Connection) -> Result<u128, SubxtNodeError> {
    let address = subxt::dynamic::storage("Balances", "TotalIssuance", Vec::<Value>::new());
    let value = storage_at_latest(connection)
        .await?
        .fetch(&address)
        .await
        .map_err(|error| SubxtNodeError::FetchStorage("Balances::TotalIssuance", error.into()))?
        .ok_or(SubxtNodeError::MissingStorageValue("Balances::TotalIssuance"))?;

    decode_storage::<u128>("Balances::TotalIssuance", &value)
}

#[trace]
async fn fetch_balances(
    connection: &Connection,
    addresses: &[String],
) -> Result<Vec<AccountBalance>, SubxtNodeError> {
    if addresses.is_empty() {
        return Ok(vec![]);
    }

    let mut keys = Vec::with_capacity(addresses.len());
    for address in addresses {
        let account = AccountId32::from_str(address).map_err(|error| {
            SubxtNodeError::InvalidAddress {
                address: address.to_string(),
                reason: error.to_string(),
            }
        })?;
        let storage_address =
            subxt::dynamic::storage("System", "Account", vec![Value::from_bytes(account.0)]);
        let key = connection
            .client
            .storage()
            .address_bytes(&storage_address)
            .map_err(|error| SubxtNodeError::EncodeStorageKey(error.into()))?;
        keys.push(key);
    }

    // One multi-key round trip instead of one query per address.
    let change_sets = connection
        .legacy
        .state_query_storage_at(keys.iter().map(|key| key.as_slice()), None)
        .await
        .map_err(SubxtNodeError::QueryStorage)?;

    let mut values = HashMap::new();
    for change_set in change_sets {
        for (key, value) in change_set.changes {
            if let Some(value) = value {
                values.insert(key.0, value.0);
            }
        }
    }

    assemble_balances(&keys, &values)
}

/// One balance per requested key, in key order; an absent storage entry is
/// an account without funds, i.e. all zero.
fn assemble_balances(
    keys: &[Vec<u8>],
    values: &HashMap<Vec<u8>, Vec<u8>>,
) -> Result<Vec<AccountBalance>, SubxtNodeError> {
    keys.iter()
        .map(|key| match values.get(key) {
            Some(bytes) => decode_account_balance(bytes),
            None => Ok(AccountBalance::default()),
        })
        .collect()
}

fn decode_account_balance(mut bytes: &[u8]) -> Result<AccountBalance, SubxtNodeError> {
    let account = AccountInfo::decode(&mut bytes)
        .map_err(|error| SubxtNodeError::DecodeStorage("System::Account", error))?;

    Ok(AccountBalance {
        free: account.data.free,
        reserved: account.data.reserved,
        frozen: account.data.frozen,
    })
}

async fn fetch_chain_decimals(connection: &Connection) -> Result<u32, SubxtNodeError> {
    let properties = connection
        .legacy
        .system_properties()
        .await
        .map_err(SubxtNodeError::SystemProperties)?;

    let Some(decimals) = properties.get("tokenDecimals") else {
        return Err(SubxtNodeError::MissingTokenDecimals);
    };

    token_decimals(decimals).ok_or(SubxtNodeError::MissingTokenDecimals)
}

/// The chain registers either a single decimal count or one per token
/// registry; the first registered value wins.
fn token_decimals(value: &JsonValue) -> Option<u32> {
    let decimals = match value {
        JsonValue::Number(number) => number.as_u64(),
        JsonValue::Array(values) => values.first().and_then(|value| value.as_u64()),
        _ => None,
    };

    decimals.and_then(|decimals| u32::try_from(decimals).ok())
}

async fn fetch_chain_name(connection: &Connection) -> Result<String, SubxtNodeError> {
    connection
        .legacy
        .system_chain()
        .await
        .map_err(SubxtNodeError::SystemChain)
}

#[trace]
async fn fetch_tvl(connection: &Connection) -> Result<u128, SubxtNodeError> {
    let storage = storage_at_latest(connection).await?;

    let era_address = subxt::dynamic::storage("DappsStaking", "CurrentEra", Vec::<Value>::new());
    let era = storage
        .fetch(&era_address)
        .await
        .map_err(|error| SubxtNodeError::FetchStorage("DappsStaking::CurrentEra", error.into()))?
        .ok_or(SubxtNodeError::MissingStorageValue("DappsStaking::CurrentEra"))?;
    let era = decode_storage::<u32>("DappsStaking::CurrentEra", &era)?;

    let info_address = subxt::dynamic::storage(
        "DappsStaking",
        "GeneralEraInfo",
        vec![Value::u128(era as u128)],
    );
    let info = storage
        .fetch(&info_address)
        .await
        .map_err(|error| {
            SubxtNodeError::FetchStorage("DappsStaking::GeneralEraInfo", error.into())
        })?
        // The record is expected to exist for any era up to the current one.
        .ok_or(SubxtNodeError::MissingEraInfo(era))?;
    let info = decode_storage::<EraInfo>("DappsStaking::GeneralEraInfo", &info)?;

    Ok(info.locked)
}

#[trace]
async fn fetch_reward_inputs(connection: &Connection) -> Result<RewardInputs, SubxtNodeError> {
    let (block_rewards, timestamp_ms, latest_block, developer_reward_fraction, blocks_per_era) =
        try_join!(
            fetch_block_rewards(connection),
            fetch_timestamp(connection),
            fetch_latest_block(connection),
            fetch_developer_reward_fraction(connection),
            fetch_blocks_per_era(connection),
        )?;

    Ok(RewardInputs {
        block_rewards,
        timestamp_ms,
        latest_block,
        developer_reward_fraction,
        blocks_per_era,
    })
}

async fn fetch_block_rewards(connection: &Connection) -> Result<u128, SubxtNodeError> {
    constant::<u128>(connection, "BlockReward", "RewardAmount")
}

async fn fetch_timestamp(connection: &Connection) -> Result<u64, SubxtNodeError> {
    let address = subxt::dynamic::storage("Timestamp", "Now", Vec::<Value>::new());
    let value = storage_at_latest(connection)
        .await?
        .fetch(&address)
        .await
        .map_err(|error| SubxtNodeError::FetchStorage("Timestamp::Now", error.into()))?
        .ok_or(SubxtNodeError::MissingStorageValue("Timestamp::Now"))?;

    decode_storage::<u64>("Timestamp::Now", &value)
}

async fn fetch_latest_block(connection: &Connection) -> Result<u32, SubxtNodeError> {
    let block = connection
        .client
        .blocks()
        .at_latest()
        .await
        .map_err(|error| SubxtNodeError::FetchLatestBlock(error.into()))?;

    Ok(block.number())
}

async fn fetch_developer_reward_fraction(connection: &Connection) -> Result<f64, SubxtNodeError> {
    let parts = constant::<u32>(connection, "DappsStaking", "DeveloperRewardPercentage")?;
    fraction_from_perbill(parts)
}

async fn fetch_blocks_per_era(connection: &Connection) -> Result<u32, SubxtNodeError> {
    constant::<u32>(connection, "DappsStaking", "BlockPerEra")
}

/// Convert a Perbill constant (parts per billion) into a fraction in
/// `[0, 1]`; a larger value indicates an incompatible runtime.
fn fraction_from_perbill(parts: u32) -> Result<f64, SubxtNodeError> {
    if parts > PERBILL_DENOMINATOR {
        return Err(SubxtNodeError::InvalidRewardPercentage(parts));
    }

    Ok(parts as f64 / PERBILL_DENOMINATOR as f64)
}

async fn storage_at_latest(
    connection: &Connection,
) -> Result<subxt::storage::Storage<SubstrateConfig, OnlineClient<SubstrateConfig>>, SubxtNodeError>
{
    connection
        .client
        .storage()
        .at_latest()
        .await
        .map_err(|error| SubxtNodeError::StorageAccess(error.into()))
}

fn decode_storage<T>(entry: &'static str, value: &DecodedValueThunk) -> Result<T, SubxtNodeError>
where
    T: Decode,
{
    let mut bytes = value.encoded();
    T::decode(&mut bytes).map_err(|error| SubxtNodeError::DecodeStorage(entry, error))
}

fn constant<T>(
    connection: &Connection,
    pallet: &'static str,
    name: &'static str,
) -> Result<T, SubxtNodeError>
where
    T: Decode,
{
    let address = subxt::dynamic::constant(pallet, name);
    let value = connection
        .client
        .constants()
        .at(&address)
        .map_err(|error| SubxtNodeError::FetchConstant(pallet, name, error.into()))?;

    let mut bytes = value.encoded();
    T::decode(&mut bytes).map_err(|error| SubxtNodeError::DecodeConstant(pallet, name, error))
}

/// `frame_system` account record layout.
#[derive(Decode)]
struct AccountInfo {
    _nonce: u32,
    _consumers: u32,
    _providers: u32,
    _sufficients: u32,
    data: AccountData,
}

#[derive(Decode)]
struct AccountData {
    free: u128,
    reserved: u128,
    frozen: u128,
    _flags: u128,
}

/// Aggregate staking amounts of one era.
#[derive(Decode)]
struct EraInfo {
    _rewards: EraRewards,
    _staked: u128,
    locked: u128,
}

#[derive(Decode)]
struct EraRewards {
    _stakers: u128,
    _dapps: u128,
}

/// Error possibly returned by [SubxtNode] chain reads.
#[derive(Debug, Error)]
pub enum SubxtNodeError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("cannot access storage at latest block")]
    StorageAccess(#[source] Box<subxt::Error>),

    #[error("cannot fetch storage value {0}")]
    FetchStorage(&'static str, #[source] Box<subxt::Error>),

    #[error("storage value {0} not found")]
    MissingStorageValue(&'static str),

    #[error("cannot SCALE decode storage value {0}")]
    DecodeStorage(&'static str, #[source] parity_scale_codec::Error),

    #[error("invalid account address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("cannot encode account storage key")]
    EncodeStorageKey(#[source] Box<subxt::Error>),

    #[error("cannot query storage")]
    QueryStorage(#[source] subxt::ext::subxt_rpcs::Error),

    #[error("cannot get system properties")]
    SystemProperties(#[source] subxt::ext::subxt_rpcs::Error),

    #[error("cannot get chain name")]
    SystemChain(#[source] subxt::ext::subxt_rpcs::Error),

    #[error("no usable tokenDecimals in system properties")]
    MissingTokenDecimals,

    #[error("no staking info for era {0}")]
    MissingEraInfo(u32),

    #[error("cannot fetch latest block")]
    FetchLatestBlock(#[source] Box<subxt::Error>),

    #[error("cannot fetch constant {0}::{1}")]
    FetchConstant(&'static str, &'static str, #[source] Box<subxt::Error>),

    #[error("cannot SCALE decode constant {0}::{1}")]
    DecodeConstant(&'static str, &'static str, #[source] parity_scale_codec::Error),

    #[error("invalid developer reward percentage constant: {0} parts per billion")]
    InvalidRewardPercentage(u32),
}
