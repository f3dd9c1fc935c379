use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

// The entry point for `cargo run -p memory-server [addr]`. The `tuneloop memory-server`
// subcommand calls the same `run_server`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => SocketAddr::from(([0, 0, 0, 0], memory_server::DEFAULT_PORT)),
    };
    memory_server::run_server(addr).await?;
    Ok(())
}
