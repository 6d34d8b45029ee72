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

use log::error;
use std::panic;

#[tokio::main]
async fn main() {
    stats_common::telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    use anyhow::Context;
    use log::info;
    use stats_api::{
        application,
        config::Config,
        domain::staking::StakingService,
        infra,
        infra::{api::AxumApi, subscan::SubscanClient, subxt_node::SubxtNode},
    };
    use stats_common::config::ConfigExt;
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler can be registered");

    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");
    let Config {
        staking_config,
        infra_config,
    } = config;
    let infra::Config {
        node_config,
        api_config,
        subscan_config,
    } = infra_config;

    let node = SubxtNode::new(node_config).context("create chain node client")?;
    let staking = StakingService::new(node.clone(), staking_config);
    let rewards = SubscanClient::new(subscan_config).context("create staking indexer client")?;
    let api = AxumApi::new(api_config, node, staking, rewards);

    application::run(api, sigterm)
        .await
        .context("run staking stats API application")
}
