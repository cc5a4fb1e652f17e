use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in and store the search-party token for the report proxy.
    Login(LoginArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct LoginArgs {
    /// Apple ID email; prompted for when absent.
    #[arg(long, env = "APPLEID_EMAIL")]
    pub username: Option<String>,

    /// Apple ID password; prompted for when absent.
    #[arg(long, env = "APPLEID_PWD", hide_env_values = true)]
    pub password: Option<String>,

    /// Base URL of the anisette provider.
    #[arg(long, env = "ANISETTE_URL", default_value = "http://anisette:6969")]
    pub anisette_url: String,

    /// Where the obtained token is persisted.
    #[arg(long, env = "AUTH_STATE_PATH", default_value = "data/auth.json")]
    pub state: String,

    /// Re-run the login even when a stored token exists.
    #[arg(long)]
    pub force: bool,
}
