pub use config::ServerConfig;
pub use error::{NetError, NetResult};
pub use server::{Client, Handler, Server};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod config;
mod error;
mod server;
mod shutdown;
mod tracing_config;
