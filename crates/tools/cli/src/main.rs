//! Avanza command line client
//!
//! Credentials come from the environment (or `.env`):
//! `AVANZA_USERNAME`, `AVANZA_PASSWORD` and `AVANZA_TOTP_SECRET`.
//!
//! Usage:
//!   avanza login
//!   avanza overview
//!   avanza positions
//!   avanza call GET /_mobile/account/overview
//!   avanza subscribe quotes 19002 5361

use anyhow::{Context, Result};
use avanza_client::{Avanza, PushEvent, PushMessage};
use clap::{Parser, Subcommand};
use common::{ChannelType, HttpMethod};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "avanza")]
#[command(about = "Avanza account access from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print the session summary
    Login,
    /// Account overview
    Overview,
    /// Positions across all accounts
    Positions,
    /// Raw authenticated request
    Call {
        /// GET, POST, PUT or DELETE
        method: HttpMethod,
        /// Route including any query string
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Print push messages until interrupted
    Subscribe {
        /// Push channel, e.g. quotes or orderdepths
        channel: ChannelType,
        /// Order book or account ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("avanza_client=info,auth=info,feeds=info")),
        )
        .init();

    let cli = Cli::parse();
    let avanza = Avanza::from_env().await.context("login failed")?;

    match cli.command {
        Commands::Login => {
            if let Some(session) = avanza.session().await {
                println!("Logged in as customer {}", session.customer_id);
                println!("Session idle deadline: {}", session.idle_deadline());
            }
        }
        Commands::Overview => print_json(&avanza.overview().await?)?,
        Commands::Positions => print_json(&avanza.positions().await?)?,
        Commands::Call { method, path, body } => {
            let body: Option<Value> = body
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("--body is not valid JSON")?;
            print_json(&avanza.call(method, &path, body.as_ref()).await?)?;
        }
        Commands::Subscribe { channel, ids } => {
            let mut events = avanza.push_events();
            let print = |msg: &PushMessage| {
                println!("{} {} {}", msg.channel, msg.identifier, msg.data);
                Ok::<(), anyhow::Error>(())
            };
            let mut handles = Vec::new();
            if ids.len() > 1 && channel.supports_multiple_ids() {
                handles.push(avanza.subscribe_to_ids(channel, &ids, print).await?);
            } else {
                for id in &ids {
                    handles.push(avanza.subscribe_to_id(channel, id, print).await?);
                }
            }
            info!("Subscribed to {} {} id(s), Ctrl-C to stop", channel, ids.len());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(PushEvent::ConnectionLost { reason }) => {
                            warn!("Push connection lost: {}", reason);
                            break;
                        }
                        Ok(PushEvent::Closed) | Err(_) => break,
                        Ok(PushEvent::Connected) => {}
                    },
                }
            }

            for handle in &handles {
                avanza.unsubscribe(handle);
            }
        }
    }

    avanza.logout().await;
    Ok(())
}
