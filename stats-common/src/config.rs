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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::de::DeserializeOwned;
use std::env;

const CONFIG_FILE_ENV_VAR: &str = "CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Extension methods for loading a configuration from a YAML file merged
/// with `APP__` prefixed environment variables, `__` separating sections.
/// The file path defaults to `config.yaml` and can be overridden via the
/// `CONFIG_FILE` environment variable.
pub trait ConfigExt
where
    Self: DeserializeOwned,
{
    fn load() -> Result<Self, figment::Error> {
        let config_file =
            env::var(CONFIG_FILE_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Figment::new()
            .merge(Yaml::file(config_file))
            .merge(Env::prefixed("APP__").split("__"))
            .extract()
    }
}

impl<T> ConfigExt for T where T: DeserializeOwned {}

#[cfg(test)]
mod tests {
    use crate::config::ConfigExt;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Config {
        api: ApiConfig,
    }

    #[derive(Debug, Deserialize)]
    struct ApiConfig {
        url: String,
        port: u16,
    }

    #[test]
    fn test_load() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
                api:
                  url: "http://localhost"
                  port: 8088
                "#,
            )?;
            jail.set_env("APP__API__PORT", "4242");

            let config = Config::load().expect("config can be loaded");
            assert_eq!(config.api.url, "http://localhost");
            assert_eq!(config.api.port, 4242);

            Ok(())
        });
    }
}
