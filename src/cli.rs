//! CLI interface for the relay.
//!
//! - `modqueue-relay [run] [--once]` — announce the modqueue into Discord.
//! - `modqueue-relay authorize` — one-time interactive Reddit authorization.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Url;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::discord::DiscordWebhook;
use crate::reddit::RedditClient;
use crate::relay::{ChatSink, Relay};
use crate::store::ReportStore;

/// Relay a subreddit's moderation queue into a Discord channel.
#[derive(Debug, Parser)]
#[command(name = "modqueue-relay", version)]
pub struct Cli {
    /// Config file (defaults to `<config dir>/modqueue-relay/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file (defaults to `<data dir>/modqueue-relay/relay.sqlite`).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the modqueue and keep Discord in sync. The default command.
    Run {
        /// Run a single reconciliation tick and exit.
        #[arg(long)]
        once: bool,
    },

    /// Authorize the relay against Reddit and store the refresh token.
    ///
    /// Interactive: prints a URL to open, then asks for the returned code.
    Authorize,
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli) -> Result<(), String> {
    let config_path = Config::path(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let config = Config::load(&config_path).map_err(|e| e.to_string())?;

    let db_path = match cli.database {
        Some(path) => path,
        None => ReportStore::default_path().ok_or("could not determine data directory")?,
    };
    let store = ReportStore::open(&db_path)
        .map_err(|e| format!("failed to open {}: {e}", db_path.display()))?;

    match cli.command.unwrap_or(Command::Run { once: false }) {
        Command::Run { once } => cmd_run(&config, &store, once),
        Command::Authorize => cmd_authorize(&config, &store),
    }
}

fn cmd_run(config: &Config, store: &ReportStore, once: bool) -> Result<(), String> {
    let refresh_token = store
        .refresh_token()
        .map_err(|e| format!("failed to read refresh token: {e}"))?
        .ok_or("no Reddit refresh token stored; run `modqueue-relay authorize` first")?;

    let reddit = RedditClient::new(&config.reddit)
        .map_err(|e| e.to_string())?
        .with_refresh_token(refresh_token);
    let discord = DiscordWebhook::new(&config.discord.webhook, &config.reddit.user_agent)
        .map_err(|e| e.to_string())?;

    discord
        .send_text("Service started.")
        .map_err(|e| format!("failed to announce startup: {e}"))?;
    info!(subreddit = %config.reddit.subreddit, "relay started");

    let mut relay = Relay::new(reddit, &discord, store, config.poll.schedule());
    if once {
        relay.tick().map_err(|e| e.to_string())?;
        return Ok(());
    }
    relay.run()
}

fn cmd_authorize(config: &Config, store: &ReportStore) -> Result<(), String> {
    if !io::stdin().is_terminal() {
        return Err("authorize is interactive; run it from a terminal".to_string());
    }

    let mut reddit = RedditClient::new(&config.reddit).map_err(|e| e.to_string())?;
    let state = Uuid::new_v4().simple().to_string();
    let url = reddit.authorize_url(&state).map_err(|e| e.to_string())?;

    println!("Open this URL and approve access:\n\n  {url}\n");
    print!("Paste the full URL you were redirected to: ");
    io::stdout().flush().map_err(|e| e.to_string())?;

    let mut redirect = String::new();
    io::stdin()
        .lock()
        .read_line(&mut redirect)
        .map_err(|e| format!("failed to read redirect: {e}"))?;
    let code = code_from_redirect(redirect.trim(), &state)?;

    let refresh_token = reddit.exchange_code(&code).map_err(|e| e.to_string())?;
    store
        .set_refresh_token(&refresh_token)
        .map_err(|e| format!("failed to store refresh token: {e}"))?;

    println!("Authorized. Start the relay with `modqueue-relay run`.");
    Ok(())
}

/// Extracts the authorization code from Reddit's redirect.
///
/// The redirect must carry the `state` the authorization URL was built with.
fn code_from_redirect(redirect: &str, state: &str) -> Result<String, String> {
    let url = Url::parse(redirect).map_err(|e| format!("invalid redirect url: {e}"))?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(format!("authorization denied: {error}"));
    }
    if param("state").as_deref() != Some(state) {
        return Err("redirect state does not match; start over".to_string());
    }
    match param("code") {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err("redirect has no code".to_string()),
    }
}
