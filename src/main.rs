use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

// Tracing with console + rolling file output
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use lanchat::utils::format_size;
use lanchat::{ChatConfig, ChatConnection, ChatEvent, EventReceiver};

#[derive(Parser)]
#[command(author, version, about = "Peer-to-peer LAN chat over a single TCP socket", long_about = None)]
struct Cli {
    /// Optional path to a JSON config file
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for one peer to dial in
    Listen {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Display name announced to the peer
        #[arg(short, long)]
        name: Option<String>,

        /// Directory where received files are written
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },
    /// Dial a listening peer
    Dial {
        /// Host to connect to
        #[arg(long)]
        host: String,

        /// Port to connect to
        #[arg(short, long)]
        port: Option<u16>,

        /// Display name announced to the peer
        #[arg(short, long)]
        name: Option<String>,

        /// Directory where received files are written
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },
}

// Function to initialize tracing and file logging
// Returns a WorkerGuard that must be kept alive for logs to be written
fn init_logging(log_file_prefix: &str) -> Result<WorkerGuard, Box<dyn Error>> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", log_file_prefix);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false); // Don't use ANSI codes in files

    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn apply_overrides(
    mut config: ChatConfig,
    port: Option<u16>,
    name: Option<String>,
    download_dir: Option<PathBuf>,
) -> ChatConfig {
    if let Some(p) = port {
        config.port = p;
    }
    if let Some(n) = name {
        config.display_name = n;
    }
    if let Some(dir) = download_dir {
        config.download_dir = dir;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // This guard needs to stay in scope, otherwise logs stop writing.
    let _guard = init_logging("lanchat").map_err(|e| anyhow::anyhow!("logging setup failed: {e}"))?;

    let cli = Cli::parse();
    let base_config = ChatConfig::load_or_default(cli.config.as_deref());

    let (connection, events, config) = match cli.command {
        Commands::Listen { port, name, download_dir } => {
            let config = apply_overrides(base_config, port, name, download_dir);
            prepare(&config)?;
            println!("Listening on port {}...", config.port);
            let (connection, events) = ChatConnection::listen(&config).await?;
            (connection, events, config)
        }
        Commands::Dial { host, port, name, download_dir } => {
            let config = apply_overrides(base_config, port, name, download_dir);
            prepare(&config)?;
            println!("Dialing {}:{}...", host, config.port);
            let (connection, events) = ChatConnection::connect(&host, &config).await?;
            (connection, events, config)
        }
    };

    run_chat(connection, events, &config).await
}

fn prepare(config: &ChatConfig) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    config.ensure_directories()?;
    Ok(())
}

async fn run_chat(
    connection: ChatConnection,
    mut events: EventReceiver,
    config: &ChatConfig,
) -> anyhow::Result<()> {
    info!(name = %config.display_name, "session started");
    connection.announce_name(&config.display_name).await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::Message(text) => println!("peer> {text}"),
                ChatEvent::FileReceived { name, path, size } => {
                    println!(
                        "[file] {} ({}) saved to {}",
                        name,
                        format_size(size),
                        path.display()
                    );
                }
                ChatEvent::Status(status) => println!("[status] {status}"),
            }
        }
    });

    println!("Connected. Type a message, /send <path> to transfer a file, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(path) = line.strip_prefix("/send ") {
            if let Err(e) = connection.send_file(path.trim()).await {
                error!("file send failed: {e}");
                println!("[error] {e}");
            }
            continue;
        }
        if let Err(e) = connection.send(&line).await {
            error!("send failed: {e}");
            println!("[error] {e}");
            break;
        }
    }

    connection.close().await;
    let _ = printer.await;
    println!("Disconnected.");
    Ok(())
}
