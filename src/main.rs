use clap::Parser;
use tracing_subscriber::EnvFilter;

use redkv::{Backend, Server, StoreConfig};

#[derive(Parser)]
#[command(name = "redkv")]
#[command(about = "Redis-compatible front end over a typed key-value layer")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "REDKV_ADDR", default_value = "127.0.0.1:6380")]
    addr: String,

    /// Naive backend: memory or redis
    #[arg(short, long, env = "REDKV_BACKEND", default_value = "memory")]
    backend: String,

    /// Upstream server for the redis backend
    #[arg(long, env = "REDKV_REDIS_URL")]
    redis_url: Option<String>,

    /// Namespace every key as PREFIX:key
    #[arg(long, env = "REDKV_PREFIX")]
    prefix: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let backend = Backend::from_str(&args.backend)
        .filter(Backend::is_available)
        .ok_or_else(|| anyhow::anyhow!("unknown or unavailable backend: {}", args.backend))?;

    let config = StoreConfig {
        backend,
        redis_url: args.redis_url,
        key_prefix: args.prefix,
    };
    let kv = config.open()?;
    tracing::info!("Opened {} backend", backend.as_str());

    let server = Server::new(kv);
    tokio::select! {
        res = server.run(&args.addr) => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
