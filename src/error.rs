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

use thiserror::Error;

/// Error taxonomy shared by every component. The dispatcher is the only
/// place that matches on these variants to decide what the client sees.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed request")]
    MalformedRequest,

    #[error("DNS resolution failed for {0}")]
    DnsFailure(String),

    #[error("could not connect to any resolved endpoint for {0}")]
    ConnectFailure(String),

    #[error("operation timed out")]
    Timeout,

    #[error("partial read from origin")]
    PartialRead,

    #[error("certificate minting failed for {0}: {1}")]
    CertMintFailure(String, String),

    #[error("TLS handshake failed")]
    TlsHandshakeFailure,

    #[error("upstream fetch failed for {0}: {1}")]
    UpstreamFetchFailure(String, String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}
