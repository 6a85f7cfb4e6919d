//! Peril server shell: pause, resume, archive game logs.

use std::io::Write;

use peril::shell::{parse_server_command, ServerCommand, SERVER_HELP};
use peril::{FileLogSink, PerilConfig, PerilServer};
use peril_broker::AmqpBroker;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = PerilConfig::from_env();
    let broker = match AmqpBroker::connect(&config.amqp_url).await {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to the broker");
            std::process::exit(1);
        }
    };
    let sink = FileLogSink::new(&config.game_log_path);
    let server = match PerilServer::start(&broker, &config, sink).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start the server");
            std::process::exit(1);
        }
    };

    println!("Peril server started. Game logs go to {}.", config.game_log_path.display());
    println!("{SERVER_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read input");
                break;
            }
        };
        match parse_server_command(&line) {
            Ok(None) => {}
            Ok(Some(ServerCommand::Pause)) => match server.pause().await {
                Ok(()) => println!("Game paused."),
                Err(e) => println!("error: {e}"),
            },
            Ok(Some(ServerCommand::Resume)) => match server.resume().await {
                Ok(()) => println!("Game resumed."),
                Err(e) => println!("error: {e}"),
            },
            Ok(Some(ServerCommand::Help)) => println!("{SERVER_HELP}"),
            Ok(Some(ServerCommand::Quit)) => break,
            Err(e) => println!("{e}"),
        }
    }

    println!("Shutting down.");
    if let Err(e) = server.shutdown().await {
        tracing::warn!(error = %e, "unclean shutdown");
    }
    if let Err(e) = broker.close().await {
        tracing::debug!(error = %e, "closing broker connection failed");
    }
}
