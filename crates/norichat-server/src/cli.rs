use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "norichat-server", about = "NoriChat chat server")]
pub struct Args {
    /// Path to the SQLite database file
    #[arg(long, default_value = "norichat.db")]
    pub db: PathBuf,

    /// TCP port serving both the HTTP API and the WebSocket gateway
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// HMAC secret for signing JWTs (falls back to NORICHAT_JWT_SECRET)
    #[arg(long)]
    pub jwt_secret: Option<String>,
}
