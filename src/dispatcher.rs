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

//! Accepts TCP connections and spawns one worker per connection. Each
//! worker drains header bytes into a geometrically growing buffer,
//! classifies the target, then routes to the `CONNECT`/MITM path or the
//! plain-HTTP path. There is no bounded worker pool: the proxy spawns
//! and detaches a task per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::certs::CertStore;
use crate::classify::{self, ClassifyOutcome};
use crate::config::Config;
use crate::fetcher::FetchParams;
use crate::mitm;
use crate::plain_http;
use crate::request::{self, Request};
use crate::responses;

const INITIAL_HEADER_BUF: usize = 1024;
const MAX_HEADER_BYTES: usize = 8192;
const LISTEN_BACKLOG: u32 = 10;

pub struct Dispatcher {
    config: Arc<Config>,
    cache: Arc<Cache>,
    certs: Arc<CertStore>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, cache: Arc<Cache>, certs: Arc<CertStore>) -> Self {
        Dispatcher {
            config,
            cache,
            certs,
        }
    }

    pub async fn run(self) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen_port));
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        #[cfg(unix)]
        socket.set_reuseport(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        info!("proxy listening on {addr}");

        loop {
            let (stream, peer) = listener.accept().await?;
            let config = self.config.clone();
            let cache = self.cache.clone();
            let certs = self.certs.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &config, &cache, &certs).await {
                    debug!("connection from {peer} closed: {e}");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    config: &Config,
    cache: &Arc<Cache>,
    certs: &CertStore,
) -> Result<(), crate::error::ProxyError> {
    let deadline = Duration::from_secs(config.connect_deadline_secs);
    let buf = timeout(deadline, read_headers(&mut stream)).await.map_err(|_| {
        crate::error::ProxyError::Timeout
    })??;

    let req = match request::parse(&buf) {
        Ok(req) => req,
        Err(_) => return Ok(()),
    };

    let fetch_params = FetchParams {
        timeout: Duration::from_secs(config.fetch_timeout_secs),
        retries: config.fetch_retries,
        max_entry_size_bytes: config.max_entry_size_bytes,
    };

    if let ClassifyOutcome::Blocked { label, score, reason } =
        classify::classify(&target_url(&req), config.classifier.as_ref()).await
    {
        warn!("blocked {} ({label}, score {score}): {reason}", req.host);
        let page = responses::block_page(&target_url(&req), &label, &reason);
        use tokio::io::AsyncWriteExt;
        let _ = stream.write_all(&page).await;
        return Ok(());
    }

    if req.is_connect() {
        let port = req.connect_port.unwrap_or(443);
        mitm::handle(stream, &req.host, port, certs, cache, &fetch_params).await
    } else {
        plain_http::handle(&mut stream, &req, cache, &fetch_params).await
    }
}

fn target_url(req: &Request) -> String {
    if req.is_connect() {
        format!("https://{}/", req.host)
    } else {
        format!("http://{}{}", req.host, req.path)
    }
}

async fn read_headers(stream: &mut TcpStream) -> Result<Vec<u8>, crate::error::ProxyError> {
    let mut buf = vec![0u8; INITIAL_HEADER_BUF];
    let mut total = 0usize;

    loop {
        if total == buf.len() {
            if buf.len() >= MAX_HEADER_BYTES {
                return Err(crate::error::ProxyError::MalformedRequest);
            }
            buf.resize((buf.len() * 2).min(MAX_HEADER_BYTES), 0);
        }

        let n = stream
            .read(&mut buf[total..])
            .await
            .map_err(crate::error::ProxyError::Io)?;
        if n == 0 {
            return Err(crate::error::ProxyError::MalformedRequest);
        }
        total += n;

        if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
            buf.truncate(total);
            return Ok(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_for_get_uses_host_and_path() {
        let req = request::parse(b"GET http://example.com/x HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        assert_eq!(target_url(&req), "http://example.com/x");
    }

    #[test]
    fn target_url_for_connect_uses_https_scheme() {
        let req = request::parse(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target_url(&req), "https://example.com/");
    }
}
