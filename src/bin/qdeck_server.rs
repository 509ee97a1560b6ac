// src/bin/qdeck_server.rs
//
// qdeck-server: HTTP control plane for a Sidekiq-style Redis job-queue
// engine.
//
// This binary is intentionally focused on:
// - wiring the management services to a Redis backend
// - serving the JSON API and the SSE live feed
// - graceful shutdown of open live streams
//
// Example:
//   qdeck-server --redis redis://127.0.0.1:6379 --critical-queues mailers,billing

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use qdeck::config::ManagerConfig;
use qdeck::routes::{manager_routes, ManagerContext};
use qdeck::store::RedisBackend;

#[derive(Parser, Debug)]
#[command(name = "qdeck-server", version, about = "Queue management control plane")]
struct Args {
    /// Redis connection URL (also supports env QDECK_REDIS_URL / REDIS_URL)
    #[arg(long, env = "QDECK_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis: String,

    /// Listen address
    #[arg(long, env = "QDECK_BIND", default_value = "127.0.0.1:8287")]
    bind: String,

    /// Base path the management surface is mounted under
    #[arg(long, default_value = "/queue_manager")]
    base_path: String,

    /// Comma-separated queues exempt from pause/clear/delete
    #[arg(long, default_value = "")]
    critical_queues: String,

    /// Queue priorities, comma-separated name:priority pairs:
    ///   critical:10,default:1
    #[arg(long, default_value = "")]
    priorities: String,

    /// Delay between live-feed polls, in milliseconds
    #[arg(long, default_value_t = 5000)]
    refresh_interval_ms: u64,
}

fn parse_critical(spec: &str) -> HashSet<String> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_priorities(spec: &str) -> HashMap<String, u32> {
    spec.split(',')
        .filter_map(|raw| {
            let s = raw.trim();
            if s.is_empty() {
                return None;
            }
            let (name, priority) = s.split_once(':')?;
            Some((name.trim().to_string(), priority.trim().parse().ok()?))
        })
        .collect()
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (local convenience)
    if let Ok(path) = dotenvy::dotenv() {
        println!("Loaded .env from: {}", path.display());
    }

    // Tracing (respects RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Support REDIS_URL if the user didn't set QDECK_REDIS_URL explicitly.
    let redis_url = std::env::var("QDECK_REDIS_URL")
        .or_else(|_| std::env::var("REDIS_URL"))
        .unwrap_or_else(|_| args.redis.clone());

    let config = ManagerConfig {
        critical_queues: parse_critical(&args.critical_queues),
        queue_priorities: parse_priorities(&args.priorities),
        refresh_interval_ms: args.refresh_interval_ms,
        ..ManagerConfig::default()
    };
    config.validate()?;

    info!(redis = %redis_url, bind = %args.bind, base = %args.base_path, "Starting qdeck-server");

    let backend = Arc::new(RedisBackend::connect(&redis_url).await?);
    let context = web::Data::new(ManagerContext::new(config, backend));

    let app_context = context.clone();
    let base_path = args.base_path.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_context.clone())
            .service(web::scope(&base_path).configure(manager_routes))
    })
    .bind(&args.bind)?
    .run();

    let result = server.await;

    // Let any connected live-stream clients wind down cleanly.
    context.close_live_streams();
    info!("qdeck-server exited");

    Ok(result?)
}
