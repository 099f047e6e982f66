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

//! Splits a complete header block into method/target/version/headers and
//! derives the `(host, path)` cache key from either an absolute-form
//! target, a `CONNECT host:port` target, or a relative target plus the
//! `Host:` header.

use crate::error::ProxyError;

const MAX_METHOD_LEN: usize = 15;
const MAX_TARGET_LEN: usize = 511;
const MAX_VERSION_LEN: usize = 15;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub host: String,
    pub path: String,
    /// Present only when the target was `CONNECT host:port`.
    pub connect_port: Option<u16>,
    pub len: usize,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Parses a complete header block (ending in `\r\n\r\n`). Assumes the
/// caller (the dispatcher) already accumulated the full block.
pub fn parse(buf: &[u8]) -> Result<Request, ProxyError> {
    let text = std::str::from_utf8(buf).map_err(|_| ProxyError::MalformedRequest)?;
    let header_end = text
        .find("\r\n\r\n")
        .ok_or(ProxyError::MalformedRequest)?;
    let head = &text[..header_end];
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ProxyError::MalformedRequest)?;
    let mut tokens = request_line.split_whitespace();
    let method = tokens.next().ok_or(ProxyError::MalformedRequest)?;
    let target = tokens.next().ok_or(ProxyError::MalformedRequest)?;
    let version = tokens.next().ok_or(ProxyError::MalformedRequest)?;
    if tokens.next().is_some() {
        return Err(ProxyError::MalformedRequest);
    }
    if method.len() > MAX_METHOD_LEN
        || target.len() > MAX_TARGET_LEN
        || version.len() > MAX_VERSION_LEN
    {
        return Err(ProxyError::MalformedRequest);
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(ProxyError::MalformedRequest)?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let (host, path, connect_port) = derive_host_and_path(method, target, &headers)?;

    Ok(Request {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        host,
        path,
        connect_port,
        len: header_end + 4,
    })
}

fn derive_host_and_path(
    method: &str,
    target: &str,
    headers: &[(String, String)],
) -> Result<(String, String, Option<u16>), ProxyError> {
    if let Some(rest) = strip_scheme(target) {
        let (host, path) = split_authority(rest);
        return Ok((host.to_ascii_lowercase(), normalize_path(path), None));
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        let (host, port) = match target.rsplit_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().map_err(|_| ProxyError::MalformedRequest)?),
            None => (target, 443),
        };
        if host.is_empty() {
            return Err(ProxyError::MalformedRequest);
        }
        return Ok((host.to_ascii_lowercase(), String::new(), Some(port)));
    }

    let path = normalize_path(target);
    let host = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.as_str())
        .ok_or(ProxyError::MalformedRequest)?;
    Ok((host.to_ascii_lowercase(), path, None))
}

fn strip_scheme(target: &str) -> Option<&str> {
    target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
}

fn split_authority(rest: &str) -> (&str, &str) {
    match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
