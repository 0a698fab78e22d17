use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Local SQLite database path (e.g., "classroom.db")
    /// Can also be set using the DATABASE_URL environment variable.
    /// Default value: classroom.db
    #[arg(long, env = "DATABASE_URL", default_value = "classroom.db")]
    pub database_url: String,

    /// Database connection pool size
    /// Can also be set using the DB_POOL_MAX_SIZE environment variable.
    /// Default value: 10
    #[arg(long, env = "DB_POOL_MAX_SIZE", default_value = "10")]
    pub db_pool_max_size: u32,

    /// Server listen address and port (e.g., "127.0.0.1:3000")
    /// Can also be set using the SERVER_ADDRESS environment variable.
    /// Default value: 127.0.0.1:3000
    #[arg(long, env = "SERVER_ADDRESS", default_value = "127.0.0.1:3000")]
    pub server_address: SocketAddr,

    /// Base URL of the remote store gateway (e.g., "https://store.example.org/")
    /// When set, all storage goes through the gateway instead of the local database.
    /// Can also be set using the REMOTE_STORE_URL environment variable.
    #[arg(long, env = "REMOTE_STORE_URL")]
    pub remote_store_url: Option<Url>,

    /// Shared secret sent to (or expected by) the remote store gateway
    /// Can also be set using the REMOTE_STORE_SECRET environment variable.
    #[arg(long, env = "REMOTE_STORE_SECRET", hide_env_values = true)]
    pub remote_store_secret: Option<String>,

    /// Upper bound for a single storage call, in seconds
    /// Can also be set using the STORAGE_TIMEOUT_SECS environment variable.
    /// Default value: 10
    #[arg(long, env = "STORAGE_TIMEOUT_SECS", default_value = "10")]
    pub storage_timeout_secs: u64,

    /// Lifetime of password reset tokens, in seconds
    /// Can also be set using the RESET_TOKEN_TTL_SECS environment variable.
    /// Default value: 3600
    #[arg(long, env = "RESET_TOKEN_TTL_SECS", default_value = "3600")]
    pub reset_token_ttl_secs: i64,

    /// Log level (e.g., "info")
    /// Can also be set using the RUST_LOG environment variable.
    /// Default value: info
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the classroom API (default)
    Serve,

    /// Serve the remote store gateway over the local database
    Gateway {
        /// Gateway listen address and port
        /// Can also be set using the GATEWAY_ADDRESS environment variable.
        /// Default value: 127.0.0.1:4000
        #[arg(long, env = "GATEWAY_ADDRESS", default_value = "127.0.0.1:4000")]
        address: SocketAddr,
    },
}
