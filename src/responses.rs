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

//! Canned byte-exact responses the dispatcher writes directly to the
//! client socket, bypassing the cache and the fetcher entirely.

pub const INTERNAL_SERVER_ERROR: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n\
Content-Type: text/html\r\n\
Content-Length: 53\r\n\
\r\n\
<html><body><h1>500 Internal Server Error</h1></body></html>";

pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Served in place of fetched content when the external classifier
/// labels a URL unsafe. Status 200 so the client renders it as a normal
/// page rather than treating it as a transport failure.
pub fn block_page(url: &str, label: &str, reason: &str) -> Vec<u8> {
    let body = format!(
        "<html><body><h1>Blocked</h1><p>The requested URL was classified as <b>{label}</b>.</p>\
<p>{reason}</p><p><code>{url}</code></p></body></html>"
    );
    let mut resp = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    resp.extend_from_slice(body.as_bytes());
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_server_error_is_byte_exact() {
        assert_eq!(
            INTERNAL_SERVER_ERROR,
            b"HTTP/1.1 500 Internal Server Error\r\n\
Content-Type: text/html\r\n\
Content-Length: 53\r\n\
\r\n\
<html><body><h1>500 Internal Server Error</h1></body></html>" as &[u8]
        );
    }

    #[test]
    fn block_page_content_length_matches_body() {
        let page = block_page("http://bad.example/x", "malware", "matched signature 42");
        let text = String::from_utf8(page).unwrap();
        let header_len: usize = text
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let body = text.split("\r\n\r\n").nth(1).unwrap();
        assert_eq!(header_len, body.len());
    }
}
