use std::path::PathBuf;

use bytes::Bytes;
use clap::Parser;
use dotenv::dotenv;
use framewire::{setup_local_tracing, Client, Handler, NetResult, Server, ServerConfig};
use tokio::{runtime, signal};
use tracing::{info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

struct EchoHandler;

impl Handler for EchoHandler {
    async fn client_connected(&self, client: Client) {
        info!(client = client.id(), peer = ?client.peer_addr(), "client connected");
    }

    async fn client_communicated(&self, payload: Bytes, client: Client) {
        info!(
            client = client.id(),
            bytes = payload.len(),
            "echoing message"
        );
        if let Err(e) = client.send(&payload).await {
            warn!(client = client.id(), error = %e, "echo failed");
        }
    }

    async fn client_disconnected(&self, client: Client) {
        info!(client = client.id(), "client disconnected");
    }
}

fn main() -> NetResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    if std::env::var("RUST_LOG").is_err() {
        let level = match commandline.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    setup_local_tracing()?;

    let config = match commandline.conf.as_ref() {
        Some(path) => ServerConfig::from_file(PathBuf::from(path))?,
        None => ServerConfig {
            port: 9000,
            ..ServerConfig::default()
        },
    };

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(config))
}

async fn run(config: ServerConfig) -> NetResult<()> {
    let server = Server::bind(config, EchoHandler).await?;
    info!("echo server listening on {}", server.local_addr());

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    server.close().await;
    Ok(())
}
