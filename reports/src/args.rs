use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    Server(ServerArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// HTTP port for the report proxy.
    #[arg(long, env = "PORT", default_value_t = 6176)]
    pub port: u16,

    /// Path of the stored auth token (written by `hayloft-auth login`).
    #[arg(long, env = "AUTH_STATE_PATH", default_value = "data/auth.json")]
    pub state: String,

    /// Base URL of the anisette provider.
    #[arg(long, env = "ANISETTE_URL", default_value = "http://anisette:6969")]
    pub anisette_url: String,
}
