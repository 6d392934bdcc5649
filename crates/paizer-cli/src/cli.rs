use std::path::PathBuf;

use clap::Parser;

/// Real-time chat relay for raw TCP and WebSocket clients.
///
/// Flags left unset fall back to the config file, then to built-in
/// defaults.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address both listeners bind to [default: 0.0.0.0].
    #[arg(long)]
    pub host: Option<String>,

    /// Port for raw line-oriented TCP clients [default: 32768].
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Port for WebSocket clients [default: 32769].
    #[arg(long)]
    pub ws_port: Option<u16>,

    /// Do not start the WebSocket listener.
    #[arg(long)]
    pub no_websocket: bool,

    /// TOML file with listener and timing settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,
}
