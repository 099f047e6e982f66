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

//! Serves one plain-HTTP `GET` request by combining the request parser,
//! the GDSF cache, and the origin fetcher. Any other method gets an
//! immediate 500; any fetch failure gets the canned 500.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::cache::Cache;
use crate::error::ProxyError;
use crate::fetcher::{self, FetchParams};
use crate::request::Request;
use crate::responses;

pub async fn handle(
    stream: &mut TcpStream,
    req: &Request,
    cache: &Arc<Cache>,
    fetch_params: &FetchParams,
) -> Result<(), ProxyError> {
    if !req.is_get() {
        return write_all(stream, responses::INTERNAL_SERVER_ERROR).await;
    }

    if let Some(bytes) = cache.lookup(&req.host, &req.path) {
        return write_all(stream, &bytes).await;
    }

    match fetcher::fetch(&req.host, &req.path, fetch_params).await {
        Ok((bytes, latency)) => {
            cache.insert(req.host.clone(), req.path.clone(), bytes.clone(), bytes.len() as u64, latency);
            write_all(stream, &bytes).await
        }
        Err(e) => {
            let upstream_err = ProxyError::UpstreamFetchFailure(req.host.clone(), e.to_string());
            write_all(stream, responses::INTERNAL_SERVER_ERROR).await?;
            Err(upstream_err)
        }
    }
}

async fn write_all(stream: &mut TcpStream, bytes: &[u8]) -> Result<(), ProxyError> {
    stream.write_all(bytes).await.map_err(ProxyError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn spawn_origin(body: &'static [u8]) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            sock.write_all(body).await.unwrap();
            sock.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn cold_get_then_warm_get_hits_cache() {
        let origin_addr = spawn_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi").await;
        let cache = Arc::new(Cache::create(5));
        let params = FetchParams {
            timeout: std::time::Duration::from_secs(5),
            retries: 1,
            max_entry_size_bytes: 1 << 20,
        };

        let raw = format!(
            "GET http://{}/ HTTP/1.1\r\nHost: {}\r\n\r\n",
            origin_addr, origin_addr
        );
        let req = request::parse(raw.as_bytes()).unwrap();

        let client_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client_listener.local_addr().unwrap();
        let server_task = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(client_addr).await.unwrap();
                handle(&mut stream, &req, &cache, &params).await.unwrap();
                let mut out = Vec::new();
                stream.read_to_end(&mut out).await.ok();
            })
        };
        let (mut accepted, _) = client_listener.accept().await.unwrap();
        let mut got = Vec::new();
        accepted.read_to_end(&mut got).await.ok();
        server_task.await.unwrap();

        assert!(got.ends_with(b"hi"));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.misses(), 1);
    }
}
