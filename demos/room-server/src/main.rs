//! Standalone Encore room server.
//!
//! ```text
//! ENCORE_ADDR=0.0.0.0:8080 RUST_LOG=encore=debug,info cargo run -p room-server
//! ```
//!
//! Stops on Ctrl-C, closing every open room with reason `server_shutdown`.

use encore::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("ENCORE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());

    let server = EncoreServer::builder()
        .bind(&addr)
        .registry_config(RegistryConfig::default())
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "room server listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
