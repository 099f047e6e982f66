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

use std::net::SocketAddr;
use std::process::exit;
use std::sync::Arc;

use axum::{routing::delete, routing::get, Router};
use hyper::Server;

use clap::Parser; // CLI argument parsing (via `--config`)
use tracing::{error, info}; // Structured logging macros
use tracing_subscriber::EnvFilter; // Log filtering via LOG_LEVEL

use mitmcache_proxy::admin::clean::invalidate_handler;
use mitmcache_proxy::admin::status::get_cache_status;
use mitmcache_proxy::cache::{Cache, CACHE};
use mitmcache_proxy::certs::CertStore;
use mitmcache_proxy::config::{Config, CONFIG};
use mitmcache_proxy::dispatcher::Dispatcher;
use metrics_exporter_prometheus::PrometheusBuilder;

use hyper::http::{header, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// ----------------------------
/// CLI ARGUMENT STRUCTURE
/// ----------------------------
/// Defines CLI arguments that can be passed to the binary,
/// such as the path to the configuration file.
/// Defaults to "config.yaml" if not provided.
#[derive(Parser, Debug)]
#[command(
    name = "mitmcache-proxy",
    version = "0.1.0",
    author = "Matías Salinas Contreras <support@fenden.com>",
    about = "Forward HTTP/HTTPS caching proxy with MITM HTTPS interception",
    long_about = Some(
        "mitmcache-proxy is a forward caching proxy that intercepts HTTPS via \
        dynamically minted, CA-signed certificates and serves both legs from a \
        Greedy-Dual Size Frequency cache.\n\n\
        Author: Matías Salinas Contreras <support@fenden.com>\n\
        Version: 0.1.0"
    )
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

/// ----------------------------
/// LOGGING INITIALIZATION
/// ----------------------------
/// Initializes structured logging using the `LOG_LEVEL` environment variable.
/// Falls back to "info" if not set. Avoids using `RUST_LOG` to provide
/// a more consistent developer experience.
fn init_logging(app_id: &str) {
    let filter = EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter) // Uses LOG_LEVEL to filter verbosity
        .with_target(false) // Hides the module path in each log line
        .compact() // Compact single-line logs (less verbose)
        .init();

    info!("logging initialized for app_id: {app_id}");
}

/// ---------------------------
/// APPLICATION ENTRY POINT
/// ---------------------------
/// Loads configuration, wires up the cache and certificate store, starts
/// the forward-proxy dispatcher, and serves the admin/metrics surface —
/// all concurrently, on two separate ports.
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    // 1. Parse CLI arguments (e.g., --config=config.prod.yaml)
    let args = Args::parse();

    // 2. Load configuration from YAML file
    let config = match Config::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config from '{}': {e}", args.config);
            exit(1);
        }
    };

    // 3. Initialize the logger using app_id for context, then metrics.
    init_logging(&config.app_id);
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Initialize the cache and the certificate store before CONFIG is
    //    consumed, since both read values out of it up front.
    let cache = Arc::new(Cache::create(config.cache_capacity));
    CACHE.set(cache.clone()).expect("CACHE was already initialized");

    let cert_store = match CertStore::load_or_create(
        config.tls_cert_dir.clone(),
        &config.ca_cert_path,
        &config.ca_key_path,
    ) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to initialize the certificate store: {e}");
            exit(1);
        }
    };

    // 5. Set global CONFIG (OnceCell) for use across modules.
    CONFIG.set(config).expect("CONFIG was already initialized");
    let config = CONFIG.get().expect("CONFIG must be initialized");

    // 6. Build the admin/metrics router.
    let cors = CorsLayer::new()
        .allow_origin("http://localhost:4321".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let admin_router = Router::new()
        .route("/admin/api/cache", delete(invalidate_handler))
        .route("/admin/api/status", get(get_cache_status))
        .route("/metrics", get(move || async move { handle.render() }))
        .layer(cors);

    let admin_addr = SocketAddr::from(([0, 0, 0, 0], config.admin_port));
    info!("admin + metrics listening at http://{admin_addr}");
    let admin_server = Server::bind(&admin_addr).serve(admin_router.into_make_service());

    // 7. Run the forward-proxy dispatcher and the admin server concurrently.
    let dispatcher = Dispatcher::new(Arc::new(config.clone()), cache, cert_store);

    let (dispatcher_result, admin_result) = tokio::join!(dispatcher.run(), admin_server);

    if let Err(e) = dispatcher_result {
        error!("dispatcher exited with error: {e}");
    }
    if let Err(e) = admin_result {
        error!("admin server exited with error: {e}");
    }
}
