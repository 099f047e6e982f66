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

//! Fetches a response from an origin over plain HTTP. Up to
//! `fetch_retries` attempts, each trying every resolved endpoint in
//! order, each endpoint bounded by `fetch_timeout_secs` for connect,
//! send, and every individual recv. The read buffer grows geometrically
//! from 4 KiB; a zero-byte successful read counts as a failed attempt.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ProxyError;
use crate::resolver;

const INITIAL_BUF: usize = 4096;

pub struct FetchParams {
    pub timeout: Duration,
    pub retries: usize,
    pub max_entry_size_bytes: u64,
}

/// Fetches `path` from `host` over HTTP on port 80. Returns the raw
/// response bytes and the wall-clock seconds the successful attempt
/// took, measured from just before the attempt to the last byte read.
pub async fn fetch(host: &str, path: &str, params: &FetchParams) -> Result<(Vec<u8>, f64), ProxyError> {
    let addrs = resolver::resolve(host, 80).await?;

    let attempts = params.retries.max(1);
    for _ in 0..attempts {
        let start = Instant::now();
        for addr in &addrs {
            match try_endpoint(*addr, host, path, params).await {
                Ok(bytes) => return Ok((bytes, start.elapsed().as_secs_f64())),
                Err(_) => continue,
            }
        }
    }

    metrics::counter!("proxy_fetch_failures_total").increment(1);
    Err(ProxyError::ConnectFailure(host.to_string()))
}

async fn try_endpoint(
    addr: SocketAddr,
    host: &str,
    path: &str,
    params: &FetchParams,
) -> Result<Vec<u8>, ProxyError> {
    let mut stream = timeout(params.timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::Timeout)?
        .map_err(|_| ProxyError::ConnectFailure(host.to_string()))?;

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: mitmcache-proxy/1.0\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    );

    timeout(params.timeout, stream.write_all(request.as_bytes()))
        .await
        .map_err(|_| ProxyError::Timeout)?
        .map_err(ProxyError::Io)?;

    read_to_end(&mut stream, params).await
}

async fn read_to_end(
    stream: &mut TcpStream,
    params: &FetchParams,
) -> Result<Vec<u8>, ProxyError> {
    let mut buf = vec![0u8; INITIAL_BUF];
    let mut total = 0usize;

    loop {
        if total == buf.len() {
            let new_len = buf.len() * 2;
            if new_len as u64 > params.max_entry_size_bytes {
                return Err(ProxyError::PartialRead);
            }
            buf.resize(new_len, 0);
        }

        let n = match timeout(params.timeout, stream.read(&mut buf[total..])).await {
            Ok(Ok(n)) => n,
            Ok(Err(_)) if total > 0 => return Err(ProxyError::PartialRead),
            Ok(Err(e)) => return Err(ProxyError::Io(e)),
            Err(_) if total == 0 => return Err(ProxyError::Timeout),
            Err(_) => return Err(ProxyError::PartialRead),
        };

        if n == 0 {
            break;
        }
        total += n;
    }

    if total == 0 {
        return Err(ProxyError::PartialRead);
    }

    buf.truncate(total);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn fetches_a_small_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = tokio::io::AsyncReadExt::read(&mut sock, &mut buf).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi")
                .await
                .unwrap();
            sock.shutdown().await.unwrap();
        });

        let params = FetchParams {
            timeout: Duration::from_secs(5),
            retries: 1,
            max_entry_size_bytes: 1 << 20,
        };
        let bytes = try_endpoint(addr, "localhost", "/", &params).await.unwrap();
        assert!(bytes.ends_with(b"hi"));
    }

    #[tokio::test]
    async fn zero_byte_read_is_a_failed_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let params = FetchParams {
            timeout: Duration::from_secs(5),
            retries: 1,
            max_entry_size_bytes: 1 << 20,
        };
        let result = try_endpoint(addr, "localhost", "/", &params).await;
        assert!(result.is_err());
    }
}
