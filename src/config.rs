// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{error::Error, fs};

/// Optional external URL-reputation collaborator, invoked as a
/// subprocess once per request before dispatch.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Main configuration structure loaded from a YAML file.
/// Defines all tunable behavior of the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Application identifier, used for namespacing the cert directory and logs.
    pub app_id: String,

    /// Port the forward-proxy listener binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Port the admin/metrics HTTP server binds to.
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Maximum number of entries the GDSF cache holds.
    pub cache_capacity: usize,

    /// Ceiling on a single cached response's size, in bytes.
    #[serde(default = "default_max_entry_size_bytes")]
    pub max_entry_size_bytes: u64,

    /// Per-attempt timeout for origin fetches and per-socket client deadlines.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Number of full fetch attempts before giving up on an origin.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: usize,

    /// Per-socket send/recv deadline applied by the dispatcher.
    #[serde(default = "default_connect_deadline_secs")]
    pub connect_deadline_secs: u64,

    /// Directory where per-host leaf certificate/key pairs are cached.
    #[serde(default = "default_tls_cert_dir")]
    pub tls_cert_dir: String,

    /// Path to the locally trusted CA certificate.
    #[serde(default = "default_ca_cert_path")]
    pub ca_cert_path: String,

    /// Path to the CA's private key.
    #[serde(default = "default_ca_key_path")]
    pub ca_key_path: String,

    /// External URL classifier; when absent, every URL is treated as safe.
    pub classifier: Option<ClassifierConfig>,
}

fn default_listen_port() -> u16 {
    3040
}

fn default_admin_port() -> u16 {
    3041
}

fn default_max_entry_size_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

fn default_fetch_retries() -> usize {
    3
}

fn default_connect_deadline_secs() -> u64 {
    5
}

fn default_tls_cert_dir() -> String {
    "certs".to_string()
}

fn default_ca_cert_path() -> String {
    "mitmproxyCA.crt".to_string()
}

fn default_ca_key_path() -> String {
    "mitmproxyCA.key".to_string()
}

/// Global, lazily-initialized config object shared across the application.
pub static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    /// Parses configuration from a YAML file.
    ///
    /// # Arguments
    /// - `path`: File path to the config YAML (e.g., "config.yaml").
    ///
    /// # Returns
    /// - `Ok(Config)` if parsing is successful.
    /// - `Err(Box<dyn Error>)` if the file is missing, malformed, or invalid.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        let parsed: Config = serde_yaml::from_str(&contents)?;

        if parsed.app_id.trim().is_empty() {
            return Err("app_id is required and cannot be empty.".into());
        }
        if parsed.cache_capacity == 0 {
            return Err("cache_capacity must be a positive integer.".into());
        }
        if parsed.max_entry_size_bytes == 0 {
            return Err("max_entry_size_bytes must be a positive integer.".into());
        }
        if parsed.fetch_retries == 0 {
            return Err("fetch_retries must be a positive integer.".into());
        }
        if parsed.listen_port == parsed.admin_port {
            return Err("listen_port and admin_port must differ.".into());
        }

        Ok(parsed)
    }
}
