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

use log::warn;
use stats_common::error::BoxError;
use std::{error::Error as StdError, time::Duration};
use thiserror::Error;
use tokio::{sync::Mutex, time::timeout};

/// Dialer for a single endpoint; a seam so failover can be tested without a
/// live node.
#[trait_variant::make(Send)]
pub trait Connector
where
    Self: Send + Sync + 'static,
{
    type Connection: Clone + Send + Sync + 'static;
    type Error: StdError + Send + Sync + 'static;

    async fn connect(&self, endpoint: &str) -> Result<Self::Connection, Self::Error>;
}

/// Owns the single live connection to one of an ordered list of endpoints.
/// The connection is established lazily, cycling through the endpoints on
/// failure, and is discarded and replaced, never repaired in place.
pub struct ConnectionManager<C>
where
    C: Connector,
{
    connector: C,
    endpoints: Vec<String>,
    connect_timeout: Duration,
    max_sweeps: usize,
    live: Mutex<Option<C::Connection>>,
}

impl<C> ConnectionManager<C>
where
    C: Connector,
{
    pub fn new(
        connector: C,
        endpoints: Vec<String>,
        connect_timeout: Duration,
        max_sweeps: usize,
    ) -> Result<Self, EmptyEndpoints> {
        if endpoints.is_empty() {
            return Err(EmptyEndpoints);
        }

        Ok(Self {
            connector,
            endpoints,
            connect_timeout,
            max_sweeps: max_sweeps.max(1),
            live: Mutex::new(None),
        })
    }

    /// Return the live connection, establishing one starting at the first
    /// endpoint if there is none yet. The fast path performs no network
    /// activity.
    pub async fn ensure_connected(&self) -> Result<C::Connection, ConnectionError> {
        let mut live = self.live.lock().await;
        if let Some(connection) = live.as_ref() {
            return Ok(connection.clone());
        }

        let connection = self.sweep(0).await?;
        *live = Some(connection.clone());

        Ok(connection)
    }

    /// Establish a fresh connection starting at the given endpoint index,
    /// superseding any live one.
    pub async fn connect_from(&self, preferred: usize) -> Result<C::Connection, ConnectionError> {
        let mut live = self.live.lock().await;
        live.take();

        let connection = self.sweep(preferred % self.endpoints.len()).await?;
        *live = Some(connection.clone());

        Ok(connection)
    }

    /// Drop the live connection so the next call re-establishes one.
    pub async fn invalidate(&self) {
        self.live.lock().await.take();
    }

    /// Try endpoints in failover order, index advancing modulo the endpoint
    /// count. Per-endpoint failures are logged only; a completed set of
    /// sweeps is a terminal error.
    async fn sweep(&self, start: usize) -> Result<C::Connection, ConnectionError> {
        let len = self.endpoints.len();
        let attempts = self.max_sweeps.saturating_mul(len);

        let mut index = start;
        let mut last_error = None;

        for _ in 0..attempts {
            let endpoint = self.endpoints[index].as_str();

            let result = match timeout(self.connect_timeout, self.connector.connect(endpoint)).await
            {
                Ok(result) => result.map_err(BoxError::from),
                Err(elapsed) => Err(BoxError::from(elapsed)),
            };

            match result {
                Ok(connection) => return Ok(connection),

                Err(error) => {
                    let next = (index + 1) % len;
                    warn!(
                        endpoint,
                        next_endpoint = self.endpoints[next].as_str(),
                        error:%;
                        "cannot connect, trying next endpoint"
                    );
                    last_error = Some(error);
                    index = next;
                }
            }
        }

        Err(ConnectionError::Exhausted {
            attempts,
            source: last_error.expect("at least one connect attempt was made"),
        })
    }
}

/// The configured endpoint list is empty.
#[derive(Debug, Error)]
#[error("endpoint list must not be empty")]
pub struct EmptyEndpoints;

/// Error establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("all endpoints exhausted after {attempts} connect attempts")]
    Exhausted {
        attempts: usize,
        #[source]
        source: BoxError,
    },
}

#[cfg(test)]
mod tests {
    use crate::infra::subxt_node::connection::{ConnectionError, ConnectionManager, Connector};
    use assert_matches::assert_matches;
    use std::{
        io,
        sync::{Arc, Mutex},
        time::Duration,
    };

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

    fn endpoints(n: usize) -> Vec<String> {
        (0..n).map(|n| format!("ws://node-{n}")).collect()
    }

    #[tokio::test]
    async fn test_failover_order() {
        // First two endpoints down, third up: attempts must go 0, 1, 2 and
        // end with a live connection to the third.
        let connector = FakeConnector::failing_first(2);
        let manager =
            ConnectionManager::new(connector.clone(), endpoints(4), CONNECT_TIMEOUT, 3)
                .expect("manager can be created");

        let connection = manager
            .ensure_connected()
            .await
            .expect("connection can be established");
        assert_eq!(connection, "ws://node-2");
        assert_eq!(
            connector.attempted(),
            vec!["ws://node-0", "ws://node-1", "ws://node-2"]
        );

        // Fast path: no further connect attempts.
        let connection = manager
            .ensure_connected()
            .await
            .expect("live connection is returned");
        assert_eq!(connection, "ws://node-2");
        assert_eq!(connector.attempted().len(), 3);
    }

    #[tokio::test]
    async fn test_failover_wraps_around() {
        let connector = FakeConnector::failing_first(1);
        let manager =
            ConnectionManager::new(connector.clone(), endpoints(4), CONNECT_TIMEOUT, 3)
                .expect("manager can be created");

        let connection = manager
            .connect_from(3)
            .await
            .expect("connection can be established");
        assert_eq!(connection, "ws://node-0");
        assert_eq!(connector.attempted(), vec!["ws://node-3", "ws://node-0"]);
    }

    #[tokio::test]
    async fn test_all_endpoints_exhausted() {
        let connector = FakeConnector::failing_first(usize::MAX);
        let manager =
            ConnectionManager::new(connector.clone(), endpoints(3), CONNECT_TIMEOUT, 2)
                .expect("manager can be created");

        let result = manager.ensure_connected().await;
        assert_matches!(result, Err(ConnectionError::Exhausted { attempts: 6, .. }));
        assert_eq!(connector.attempted().len(), 6);
    }

    #[tokio::test]
    async fn test_invalidate_reconnects() {
        let connector = FakeConnector::failing_first(0);
        let manager =
            ConnectionManager::new(connector.clone(), endpoints(2), CONNECT_TIMEOUT, 3)
                .expect("manager can be created");

        manager
            .ensure_connected()
            .await
            .expect("connection can be established");
        manager.invalidate().await;
        manager
            .ensure_connected()
            .await
            .expect("connection can be re-established");

        assert_eq!(connector.attempted(), vec!["ws://node-0", "ws://node-0"]);
    }

    #[tokio::test]
    async fn test_empty_endpoints() {
        let result =
            ConnectionManager::new(FakeConnector::failing_first(0), vec![], CONNECT_TIMEOUT, 3);
        assert!(result.is_err());
    }

    #[derive(Clone)]
    struct FakeConnector {
        fail_first: usize,
        attempted: Arc<Mutex<Vec<String>>>,
    }

    impl FakeConnector {
        fn failing_first(fail_first: usize) -> Self {
            Self {
                fail_first,
                attempted: Arc::new(Mutex::new(vec![])),
            }
        }

        fn attempted(&self) -> Vec<String> {
            self.attempted.lock().expect("mutex is not poisoned").clone()
        }
    }

    impl Connector for FakeConnector {
        type Connection = String;
        type Error = io::Error;

        async fn connect(&self, endpoint: &str) -> Result<Self::Connection, Self::Error> {
            let mut attempted = self.attempted.lock().expect("mutex is not poisoned");
            attempted.push(endpoint.to_string());

            if attempted.len() <= self.fail_first {
                Err(io::Error::other("connection refused"))
            } else {
                Ok(endpoint.to_string())
            }
        }
    }
}
