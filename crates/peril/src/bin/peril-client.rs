//! Peril client shell.
//!
//! Usage: `peril-client [username]`. Without an argument the username is
//! read from the first input line.

use std::io::Write;

use peril::shell::{parse_client_command, ClientCommand, CLIENT_HELP};
use peril::{PerilClient, PerilConfig};
use peril_broker::AmqpBroker;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let username = match std::env::args().nth(1) {
        Some(name) => name,
        None => {
            prompt("Username: ");
            match lines.next_line().await {
                Ok(Some(line)) => line.trim().to_string(),
                _ => std::process::exit(1),
            }
        }
    };

    let config = PerilConfig::from_env();
    let broker = match AmqpBroker::connect(&config.amqp_url).await {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to the broker");
            std::process::exit(1);
        }
    };
    let client = match PerilClient::start(&broker, &config, &username).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to start the client");
            std::process::exit(1);
        }
    };

    println!("Welcome to Peril, {username}.");
    println!("{CLIENT_HELP}");

    loop {
        prompt("> ");
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read input");
                break;
            }
        };
        match parse_client_command(&line) {
            Ok(None) => {}
            Ok(Some(ClientCommand::Spawn { territory, units })) => {
                match client.spawn(&territory, units).await {
                    Ok(()) => println!("Spawned {units} units in {territory}."),
                    Err(e) => println!("error: {e}"),
                }
            }
            Ok(Some(ClientCommand::Move { from, to, units })) => {
                match client.move_units(&from, to, units).await {
                    Ok(mv) => println!(
                        "Moved {units} units from {} to {}.",
                        mv.territories_from,
                        mv.territories_to.join(", ")
                    ),
                    Err(e) => println!("error: {e}"),
                }
            }
            Ok(Some(ClientCommand::Status)) => match client.status().await {
                Ok(state) => {
                    if state.is_paused() {
                        println!("The game is paused.");
                    }
                    if state.territories().is_empty() {
                        println!("You hold no territories.");
                    }
                    for (territory, units) in state.territories() {
                        println!("  {territory}: {units}");
                    }
                    for (territory, holding) in state.world() {
                        println!("  {territory}: {} ({})", holding.units, holding.owner);
                    }
                }
                Err(e) => println!("error: {e}"),
            },
            Ok(Some(ClientCommand::Help)) => println!("{CLIENT_HELP}"),
            Ok(Some(ClientCommand::Quit)) => break,
            Err(e) => println!("{e}"),
        }
    }

    println!("Goodbye.");
    if let Err(e) = client.shutdown().await {
        tracing::warn!(error = %e, "unclean shutdown");
    }
    if let Err(e) = broker.close().await {
        tracing::debug!(error = %e, "closing broker connection failed");
    }
}
