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

//! Resolves a hostname to an ordered list of endpoints. Address family is
//! unspecified; the system resolver's order is preserved, and callers try
//! endpoints in that order.

use std::net::SocketAddr;

use crate::error::ProxyError;

pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ProxyError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| ProxyError::DnsFailure(host.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(ProxyError::DnsFailure(host.to_string()));
    }
    Ok(addrs)
}
