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

use crate::domain::rewards::RewardsIndexer;
use fastrace::trace;
use reqwest::Client as HttpClient;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const STAKING_HISTORY_PATH: &str = "/api/scan/staking_history";
const API_KEY_HEADER: &str = "X-API-Key";
const PAGE_SIZE: u32 = 20;

/// Config for the rewards indexer lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub base_url: String,

    pub api_key: Option<SecretString>,
}

/// A [RewardsIndexer] implementation backed by a Subscan compatible HTTP
/// API.
#[derive(Clone)]
pub struct SubscanClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<SecretString>,
}

impl SubscanClient {
    /// Create a new [SubscanClient] with the given [Config].
    pub fn new(config: Config) -> Result<Self, SubscanError> {
        let Config { base_url, api_key } = config;

        let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        let http = HttpClient::builder()
            .user_agent(user_agent)
            .build()
            .map_err(SubscanError::MakeClient)?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }
}

impl RewardsIndexer for SubscanClient {
    type Error = SubscanError;

    #[trace]
    async fn earned(&self, address: &str) -> Result<f64, SubscanError> {
        let url = format!("{}{STAKING_HISTORY_PATH}", self.base_url);
        let body = StakingHistoryRequest {
            row: PAGE_SIZE,
            page: 0,
            address,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(SubscanError::Send)?
            .error_for_status()
            .map_err(SubscanError::Status)?
            .json::<StakingHistoryResponse>()
            .await
            .map_err(SubscanError::Decode)?;

        // No data for the address means nothing earned yet.
        Ok(response.data.map(|data| data.sum).unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct StakingHistoryRequest<'a> {
    row: u32,
    page: u32,
    address: &'a str,
}

#[derive(Debug, Deserialize)]
struct StakingHistoryResponse {
    data: Option<StakingHistoryData>,
}

#[derive(Debug, Deserialize)]
struct StakingHistoryData {
    sum: f64,
}

/// Error talking to the rewards indexer.
#[derive(Debug, Error)]
pub enum SubscanError {
    #[error("cannot create HTTP client")]
    MakeClient(#[source] reqwest::Error),

    #[error("cannot send request to the staking indexer")]
    Send(#[source] reqwest::Error),

    #[error("staking indexer returned an error status")]
    Status(#[source] reqwest::Error),

    #[error("cannot decode staking indexer response")]
    Decode(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use crate::infra::subscan::StakingHistoryResponse;

    #[test]
    fn test_deserialize_staking_history() {
        let response =
            serde_json::from_str::<StakingHistoryResponse>(r#"{"data":{"sum":42}}"#)
                .expect("response can be deserialized");
        assert_eq!(response.data.map(|data| data.sum), Some(42.0));

        let response = serde_json::from_str::<StakingHistoryResponse>(r#"{}"#)
            .expect("response can be deserialized");
        assert!(response.data.is_none());

        let response = serde_json::from_str::<StakingHistoryResponse>(r#"{"data":null}"#)
            .expect("response can be deserialized");
        assert!(response.data.is_none());
    }

    #[test]
    fn test_deserialize_fractional_sum() {
        let response =
            serde_json::from_str::<StakingHistoryResponse>(r#"{"data":{"sum":13.37,"list":[]}}"#)
                .expect("response can be deserialized");
        assert_eq!(response.data.map(|data| data.sum), Some(13.37));
    }
}
