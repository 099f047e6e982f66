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

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::cache::CACHE;

#[derive(Serialize)]
struct SuccessResponse {
    message: String,
}

/// DELETE /admin/api/cache — clears the in-memory GDSF cache. There is
/// no persistent backend to invalidate; persistence is out of scope.
pub async fn invalidate_handler() -> impl IntoResponse {
    let cache = CACHE.get().expect("CACHE must be initialized");
    let count = cache.size();
    cache.destroy();
    tracing::info!("cleared {count} entries from the cache");

    let body = Json(SuccessResponse {
        message: format!("cleared {count} entries from the cache"),
    });

    (StatusCode::OK, body)
}
