//! STOMP session command line client

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use stomp_session::chat::ChatRoom;
use stomp_session::config::SessionConfig;
use stomp_session::observability::{init_default_logging, init_logging, LogFormat};
use stomp_session::session::{PublishOptions, ReadError, Session, SessionHandle, SessionState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn, Level};

/// Long-lived STOMP client session
#[derive(Parser)]
#[command(name = "stomp-session")]
#[command(about = "Resilient STOMP 1.2 client session")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker URL, overriding the configuration file
    #[arg(long, env = "STOMP_URL")]
    url: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe and print every message as a JSON line
    Run {
        /// Extra topics on top of the configured ones
        #[arg(short, long = "topic")]
        topics: Vec<String>,
    },
    /// Publish a single message
    Send {
        destination: String,
        body: String,
        /// Wait for the broker's receipt
        #[arg(long)]
        receipt: bool,
        /// Receipt deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Join a chat room and send stdin lines as messages
    Chat {
        room_id: String,
        #[arg(long)]
        sender: String,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match (cli.verbose, std::env::var("LOG_LEVEL").is_ok()) {
        (0, _) | (_, true) => init_default_logging(),
        (1, false) => init_logging(Level::DEBUG, LogFormat::Compact, false),
        (_, false) => init_logging(Level::TRACE, LogFormat::Compact, false),
    }

    let config = match load_configuration(&cli.config, cli.url.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { topics } => run(config, topics).await,
        Commands::Send {
            destination,
            body,
            receipt,
            timeout_ms,
        } => send(config, &destination, body, receipt, timeout_ms).await,
        Commands::Chat { room_id, sender } => chat(config, &room_id, &sender).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
    url: Option<&str>,
) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            SessionConfig::load_from_file(path)?
        }
        None => {
            let default_paths = ["stomp-session.toml", "config/stomp-session.toml"];
            let found = default_paths
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists());

            match (found, url) {
                (Some(path), _) => {
                    info!("Loading configuration from: {}", path.display());
                    SessionConfig::load_from_file(&path)?
                }
                (None, Some(url)) => SessionConfig::for_endpoint(url),
                (None, None) => {
                    return Err(
                        "no configuration file found; pass -c/--config, --url or create stomp-session.toml"
                            .into(),
                    )
                }
            }
        }
    };

    if let Some(url) = url {
        config.broker.url = url.to_string();
    }
    config.validate()?;
    if let Err(e) = config.get_credential() {
        warn!("{}; the session holds until it is set", e);
    }
    Ok(config)
}

async fn run(
    mut config: SessionConfig,
    topics: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.session.topics.extend(topics);
    if config.session.topics.is_empty() {
        return Err("no topics to subscribe to; add [session].topics or pass --topic".into());
    }

    let session = Session::open(config)?;
    let mut messages = session.messages();

    let outcome = tokio::select! {
        reason = shutdown_signal() => {
            info!("Received {}, shutting down gracefully...", reason);
            Ok(())
        }
        failed = wait_for_failure(&session) => Err(failed),
        _ = async {
            loop {
                match messages.recv().await {
                    Ok(message) => {
                        let line = json!({
                            "sequence": message.arrival_sequence,
                            "topic": message.topic,
                            "message_id": message.message_id,
                            "body": String::from_utf8_lossy(&message.payload),
                        });
                        println!("{line}");
                    }
                    Err(ReadError::Lagged { skipped }) => {
                        error!(skipped, "Output fell behind, messages skipped");
                    }
                    Err(ReadError::Closed) => break,
                }
            }
        } => Ok(()),
    };

    session.close().await;
    info!(metrics = %serde_json::to_string(&session.metrics())?, "Session finished");
    outcome.map_err(Into::into)
}

async fn send(
    config: SessionConfig,
    destination: &str,
    body: String,
    receipt: bool,
    timeout_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let connect_timeout = config.session.connect_timeout();
    let session = Session::open(config)?;

    let result = async {
        tokio::time::timeout(connect_timeout * 2, session.ready())
            .await
            .map_err(|_| "timed out waiting for the session to become ready")??;

        let mut options = PublishOptions {
            want_receipt: receipt,
            timeout: None,
        };
        if let Some(ms) = timeout_ms {
            options = options.timeout(Duration::from_millis(ms));
        }
        session.publish(destination, body, options).await?;
        info!(destination, receipt, "Message published");
        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .await;

    session.close().await;
    result
}

async fn chat(
    config: SessionConfig,
    room_id: &str,
    sender: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config)?;
    session.ready().await?;

    let mut room = ChatRoom::join(&session, room_id, sender, |message, _| {
        let who = message.sender.as_deref().unwrap_or("?");
        match message.content.as_deref() {
            Some(content) => println!("[{who}] {content}"),
            None => println!("* {who} joined"),
        }
    })
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            reason = shutdown_signal() => {
                info!("Received {}, leaving room", reason);
                break Ok(());
            }
            failed = wait_for_failure(&session) => break Err(failed),
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if let Err(e) = room.send(&line).await {
                        error!("Message not sent: {}", e);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    room.leave().await?;
    session.close().await;
    outcome.map_err(Into::into)
}

fn handle_config_command(
    config: SessionConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolves with the error once the session reaches `Failed`
async fn wait_for_failure(session: &SessionHandle) -> stomp_session::SessionError {
    let mut states = session.state_changes();
    loop {
        if let SessionState::Failed(error) = &*states.borrow_and_update() {
            return error.clone();
        }
        if states.changed().await.is_err() {
            return stomp_session::SessionError::SessionClosed;
        }
    }
}

async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = signal::ctrl_c().await;
                return "SIGINT";
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        "Ctrl-C"
    }
}
