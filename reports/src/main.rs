use anyhow::{Result, bail};
use clap::Parser;
use hayloft_auth::AnisetteClient;
use hayloft_common::{shutdown::shutdown_signal, state};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub mod app;
pub mod args;
pub mod fetch;
pub mod server;
pub mod tag;

use args::Commands;

#[tokio::main]
async fn main() -> Result<()> {
    hayloft_common::init();
    let cli = args::Cli::parse();
    match cli.command {
        Commands::Server(args) => run_server(args).await,
    }
}

async fn run_server(args: args::ServerArgs) -> Result<()> {
    let Some(auth) = state::load(Path::new(&args.state))? else {
        bail!(
            "no auth token at {}; run `hayloft-auth login` first",
            args.state
        );
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_clone.cancel();
    });

    let anisette = AnisetteClient::new(args.anisette_url.clone());
    let app = app::App::new(cancel.clone(), auth, anisette);
    server::run(cancel, args.port, app).await
}
