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

use crate::domain::{
    api::Api,
    node::{AccountBalance, Node},
    rewards::RewardsIndexer,
    staking::{StakingError, StakingService},
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, io, net::IpAddr};
use thiserror::Error;
use tower_http::cors::CorsLayer;

/// Config for the API server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,
}

/// Axum based [Api] implementation exposing the staking stats routes.
pub struct AxumApi<N, R> {
    config: Config,
    node: N,
    staking: StakingService<N>,
    rewards: R,
}

impl<N, R> AxumApi<N, R> {
    pub fn new(config: Config, node: N, staking: StakingService<N>, rewards: R) -> Self {
        Self {
            config,
            node,
            staking,
            rewards,
        }
    }
}

impl<N, R> Api for AxumApi<N, R>
where
    N: Node,
    R: RewardsIndexer,
{
    type Error = AxumApiError;

    async fn serve(self) -> Result<(), Self::Error> {
        let Config { address, port } = self.config;

        let app = make_app(self.node, self.staking, self.rewards);

        let listener = tokio::net::TcpListener::bind((address, port))
            .await
            .map_err(AxumApiError::Bind)?;
        info!(address:?, port; "listening to TCP connections");

        axum::serve(listener, app).await.map_err(AxumApiError::Serve)
    }
}

/// Error possibly returned by [AxumApi::serve].
#[derive(Debug, Error)]
pub enum AxumApiError {
    #[error("cannot bind TCP listener")]
    Bind(#[source] io::Error),

    #[error("cannot serve API")]
    Serve(#[source] io::Error),
}

#[derive(Clone)]
struct AppState<N, R> {
    node: N,
    staking: StakingService<N>,
    rewards: R,
}

fn make_app<N, R>(node: N, staking: StakingService<N>, rewards: R) -> Router
where
    N: Node,
    R: RewardsIndexer,
{
    let state = AppState {
        node,
        staking,
        rewards,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/chain", get(get_chain::<N, R>))
        .route("/api/v1/token/supply", get(get_supply::<N, R>))
        .route("/api/v1/balances/{addresses}", get(get_balances::<N, R>))
        .route("/api/v1/staking/apr", get(get_apr::<N, R>))
        .route("/api/v1/staking/apy", get(get_apy::<N, R>))
        .route("/api/v1/staking/tvl", get(get_tvl::<N, R>))
        .route("/api/v1/staking/earned/{address}", get(get_earned::<N, R>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_chain<N, R>(State(state): State<AppState<N, R>>) -> Result<Json<ChainInfo>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    let name = state.node.chain_name().await.map_err(chain_data_error)?;
    let decimals = state
        .node
        .chain_decimals()
        .await
        .map_err(chain_data_error)?;

    Ok(Json(ChainInfo { name, decimals }))
}

async fn get_supply<N, R>(State(state): State<AppState<N, R>>) -> Result<Json<String>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    let supply = state.node.total_supply().await.map_err(chain_data_error)?;
    Ok(Json(supply.to_string()))
}

async fn get_balances<N, R>(
    State(state): State<AppState<N, R>>,
    Path(addresses): Path<String>,
) -> Result<Json<Vec<BalanceResponse>>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    let addresses = addresses
        .split(',')
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let balances = state
        .node
        .balances(&addresses)
        .await
        .map_err(chain_data_error)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(balances))
}

async fn get_apr<N, R>(State(state): State<AppState<N, R>>) -> Result<Json<f64>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    let apr = state.staking.apr().await?;
    Ok(Json(apr))
}

async fn get_apy<N, R>(State(state): State<AppState<N, R>>) -> Result<Json<f64>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    let apy = state.staking.apy().await?;
    Ok(Json(apy))
}

async fn get_tvl<N, R>(State(state): State<AppState<N, R>>) -> Result<Json<String>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    let tvl = state.staking.tvl().await?;
    Ok(Json(tvl.to_string()))
}

async fn get_earned<N, R>(
    State(state): State<AppState<N, R>>,
    Path(address): Path<String>,
) -> Result<Json<f64>, ApiError>
where
    N: Node,
    R: RewardsIndexer,
{
    match state.rewards.earned(&address).await {
        Ok(earned) => Ok(Json(earned)),

        Err(error) => {
            error!(error:%; "cannot fetch staking rewards");
            Err(ApiError::RewardsIndexer)
        }
    }
}

fn chain_data_error(error: impl Display) -> ApiError {
    error!(error:%; "cannot fetch chain data");
    ApiError::ChainData
}

#[derive(Debug, Serialize)]
struct ChainInfo {
    name: String,
    decimals: u32,
}

/// Account balance with base-unit amounts as strings, safe for JSON
/// consumers without big-number support.
#[derive(Debug, Serialize)]
struct BalanceResponse {
    free: String,
    reserved: String,
    frozen: String,
}

impl From<AccountBalance> for BalanceResponse {
    fn from(balance: AccountBalance) -> Self {
        Self {
            free: balance.free.to_string(),
            reserved: balance.reserved.to_string(),
            frozen: balance.frozen.to_string(),
        }
    }
}

/// Error response of the staking stats routes: a stable, user safe message;
/// causes are logged where they occur.
#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Staking(#[from] StakingError),

    #[error("cannot fetch chain data, most likely due to an error fetching data from a node")]
    ChainData,

    #[error(
        "cannot fetch staking rewards, most likely due to an error fetching data from the \
         staking indexer"
    )]
    RewardsIndexer,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{
            node::{AccountBalance, Node, RewardInputs},
            rewards::RewardsIndexer,
            staking::{Config as StakingConfig, StakingService},
        },
        infra::api::make_app,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use std::io;
    use tower::ServiceExt;

    const GENESIS_TIMESTAMP: u64 = 1_640_000_000;

    fn app(node: impl Node) -> axum::Router {
        let staking = StakingService::new(
            node.clone(),
            StakingConfig {
                genesis_timestamp: GENESIS_TIMESTAMP,
            },
        );
        make_app(node, staking, MockIndexer)
    }

    async fn body_json<T>(response: axum::response::Response) -> T
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body can be read");
        serde_json::from_slice(&bytes).expect("body is valid JSON")
    }

    async fn get(app: &axum::Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request can be built"),
            )
            .await
            .expect("request can be handled")
    }

    #[tokio::test]
    async fn test_health() {
        let response = get(&app(MockNode), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_apr() {
        let response = get(&app(MockNode), "/api/v1/staking/apr").await;
        assert_eq!(response.status(), StatusCode::OK);

        let apr = body_json::<f64>(response).await;
        assert!((apr - 23.6682).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_get_apy() {
        let app = app(MockNode);

        let apr = body_json::<f64>(get(&app, "/api/v1/staking/apr").await).await;
        let apy = body_json::<f64>(get(&app, "/api/v1/staking/apy").await).await;
        assert!(apy > apr);
    }

    #[tokio::test]
    async fn test_get_tvl() {
        let response = get(&app(MockNode), "/api/v1/staking/tvl").await;
        assert_eq!(response.status(), StatusCode::OK);

        let tvl = body_json::<String>(response).await;
        assert_eq!(tvl, (1_000_000u128 * 10u128.pow(6)).to_string());
    }

    #[tokio::test]
    async fn test_get_earned() {
        let response = get(&app(MockNode), "/api/v1/staking/earned/some-address").await;
        assert_eq!(response.status(), StatusCode::OK);

        let earned = body_json::<f64>(response).await;
        assert_eq!(earned, 42.0);
    }

    #[tokio::test]
    async fn test_get_chain() {
        let response = get(&app(MockNode), "/api/v1/chain").await;
        assert_eq!(response.status(), StatusCode::OK);

        let chain = body_json::<serde_json::Value>(response).await;
        assert_eq!(chain["name"], "Testnet");
        assert_eq!(chain["decimals"], 6);
    }

    #[tokio::test]
    async fn test_get_supply() {
        let response = get(&app(MockNode), "/api/v1/token/supply").await;
        assert_eq!(response.status(), StatusCode::OK);

        let supply = body_json::<String>(response).await;
        assert_eq!(supply, "1000000000");
    }

    #[tokio::test]
    async fn test_get_balances_preserves_order() {
        let response = get(&app(MockNode), "/api/v1/balances/addr-a,addr-b,addr-c").await;
        assert_eq!(response.status(), StatusCode::OK);

        let balances = body_json::<Vec<serde_json::Value>>(response).await;
        assert_eq!(balances.len(), 3);
        assert_eq!(balances[0]["free"], "0");
        assert_eq!(balances[1]["free"], "10");
        assert_eq!(balances[2]["free"], "20");
    }

    #[tokio::test]
    async fn test_upstream_errors_are_opaque() {
        let app = app(BrokenNode);

        let response = get(&app, "/api/v1/staking/apr").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body can be read");
        let message = String::from_utf8(bytes.to_vec()).expect("body is UTF-8");
        assert!(message.contains("cannot calculate the network reward rate"));
        assert!(!message.contains("unreachable"));
    }

    #[derive(Clone)]
    struct MockNode;

    impl Node for MockNode {
        type Error = io::Error;

        async fn total_supply(&self) -> Result<u128, Self::Error> {
            Ok(1_000_000_000)
        }

        async fn balances(
            &self,
            addresses: &[String],
        ) -> Result<Vec<AccountBalance>, Self::Error> {
            let balances = addresses
                .iter()
                .enumerate()
                .map(|(n, _)| AccountBalance {
                    free: n as u128 * 10,
                    ..Default::default()
                })
                .collect();
            Ok(balances)
        }

        async fn chain_decimals(&self) -> Result<u32, Self::Error> {
            Ok(6)
        }

        async fn chain_name(&self) -> Result<String, Self::Error> {
            Ok("Testnet".to_string())
        }

        async fn tvl(&self) -> Result<u128, Self::Error> {
            Ok(1_000_000 * 10u128.pow(6))
        }

        async fn reward_inputs(&self) -> Result<RewardInputs, Self::Error> {
            Ok(RewardInputs {
                block_rewards: 1_000_000,
                timestamp_ms: (GENESIS_TIMESTAMP + 600) * 1_000,
                latest_block: 10,
                developer_reward_fraction: 0.1,
                blocks_per_era: 100,
            })
        }
    }

    #[derive(Clone)]
    struct BrokenNode;

    impl Node for BrokenNode {
        type Error = io::Error;

        async fn total_supply(&self) -> Result<u128, Self::Error> {
            Err(io::Error::other("node unreachable"))
        }

        async fn balances(
            &self,
            _addresses: &[String],
        ) -> Result<Vec<AccountBalance>, Self::Error> {
            Err(io::Error::other("node unreachable"))
        }

        async fn chain_decimals(&self) -> Result<u32, Self::Error> {
            Err(io::Error::other("node unreachable"))
        }

        async fn chain_name(&self) -> Result<String, Self::Error> {
            Err(io::Error::other("node unreachable"))
        }

        async fn tvl(&self) -> Result<u128, Self::Error> {
            Err(io::Error::other("node unreachable"))
        }

        async fn reward_inputs(&self) -> Result<RewardInputs, Self::Error> {
            Err(io::Error::other("node unreachable"))
        }
    }

    #[derive(Clone)]
    struct MockIndexer;

    impl RewardsIndexer for MockIndexer {
        type Error = io::Error;

        async fn earned(&self, _address: &str) -> Result<f64, Self::Error> {
            Ok(42.0)
        }
    }
}
