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

use axum::{response::IntoResponse, Json};
use serde::Serialize;

use crate::cache::CACHE;

#[derive(Serialize)]
pub struct CacheEntryStatus {
    pub host: String,
    pub path: String,
    pub size_bytes: u64,
    pub frequency: u64,
    pub latency_secs: f64,
    pub score: f64,
}

#[derive(Serialize)]
pub struct CacheStatus {
    pub capacity: usize,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub entries: Vec<CacheEntryStatus>,
}

/// GET /admin/api/status — a diagnostic dump of the GDSF cache, ordered
/// head to tail. Not a stable interface.
pub async fn get_cache_status() -> impl IntoResponse {
    let cache = CACHE.get().expect("CACHE must be initialized");

    let entries = cache
        .snapshot()
        .into_iter()
        .map(|e| CacheEntryStatus {
            host: e.host,
            path: e.path,
            size_bytes: e.size,
            frequency: e.frequency,
            latency_secs: e.latency,
            score: e.score,
        })
        .collect();

    Json(CacheStatus {
        capacity: cache.capacity(),
        size: cache.size(),
        hits: cache.hits(),
        misses: cache.misses(),
        entries,
    })
}
