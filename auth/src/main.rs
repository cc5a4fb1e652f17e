use anyhow::Result;
use clap::Parser;
use hayloft_auth::{AnisetteClient, CodePrompt, Credentials, DeviceIdentity};
use hayloft_common::state::{self, AuthState};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::path::PathBuf;

mod args;

use args::Commands;

#[tokio::main]
async fn main() -> Result<()> {
    hayloft_common::init();
    let cli = args::Cli::parse();
    match cli.command {
        Commands::Login(args) => login(args).await,
    }
}

async fn login(args: args::LoginArgs) -> Result<()> {
    let state_path = PathBuf::from(&args.state);

    if !args.force {
        if let Some(existing) = state::load(&state_path)? {
            println!(
                "{} {} {}",
                "🔑 Token for dsid".green(),
                existing.dsid.green().dimmed(),
                "already stored; pass --force to regenerate.".green()
            );
            return Ok(());
        }
    }

    let username = match args.username {
        Some(u) => u,
        None => prompt_line("Apple ID: ")?,
    };
    let password = match args.password {
        Some(p) => p,
        None => prompt_line("Password: ")?,
    };

    // One device identity per process; attempts share it read-only.
    let device = DeviceIdentity::generate();
    let anisette = AnisetteClient::new(args.anisette_url.clone());
    let creds = Credentials { username, password };

    println!(
        "{}{}",
        "🔐 Authenticating via anisette at ".green(),
        anisette.url().green().dimmed()
    );

    match hayloft_auth::authenticate(&anisette, &device, &creds, &StdinPrompt).await {
        Ok(token) => {
            state::store(
                &state_path,
                &AuthState {
                    dsid: token.account_id,
                    search_party_token: token.search_party_token,
                },
            )?;
            println!(
                "{}{}",
                "✅ Login complete; token stored at ".green(),
                args.state.green().dimmed()
            );
            Ok(())
        }
        Err(e) if e.is_retryable() => {
            eprintln!("auth infrastructure error (retrying the login may help): {e}");
            Err(e.into())
        }
        Err(e) => {
            eprintln!("authentication failed: {e}");
            Err(e.into())
        }
    }
}

struct StdinPrompt;

impl CodePrompt for StdinPrompt {
    fn read_code(&self, prompt: &str) -> io::Result<String> {
        prompt_line(prompt)
    }
}

fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
