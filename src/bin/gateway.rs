//! Federation gateway server
//!
//! Reads a JSON config listing the downstream services, introspects them,
//! merges their schemas, and serves the unified graph over HTTP.
//!
//! ```json
//! {
//!   "listen": "0.0.0.0:8080",
//!   "services": [
//!     {"name": "accounts", "url": "http://localhost:4001/graphql"},
//!     {"name": "reviews", "url": "http://localhost:4002/graphql"}
//!   ]
//! }
//! ```

use std::sync::Arc;

use anyhow::Context;
use graphql_federation_gateway::{Gateway, HttpServiceClient};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default = "default_listen")]
    listen: String,
    services: Vec<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    name: String,
    url: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: gateway <config.json>")?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config file {}", path))?;
    let config: Config = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path))?;

    let mut builder = Gateway::builder();
    for service in config.services {
        builder = builder.add_service(service.name, Arc::new(HttpServiceClient::new(service.url)));
    }

    let gateway = builder.build().await.context("building gateway")?;
    gateway
        .serve(&config.listen)
        .await
        .context("serving gateway")?;

    Ok(())
}
