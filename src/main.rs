//! Noterer - Main Server
//!
//! Conversational note taking over a Neo4j knowledge graph.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use noterer::neo4j::{GraphStore, Neo4jClient};
use noterer::{Config, LogDestination, LogFormat};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "noterer")]
#[command(about = "Conversational note-taking server")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "NOTERER_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config.yaml and SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config.yaml and SERVER_HOST)
        #[arg(long)]
        host: Option<String>,
    },

    /// Create constraints and indexes, and seed the philosophical categories
    SetupDb {
        /// Also write the sample philosophy note
        #[arg(long)]
        with_samples: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Config problems are reported on stderr before the real subscriber exists
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new("warn"))
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        Config::from_yaml_and_env(cli.config.as_deref())
    })?;

    init_tracing(&config)?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            if let Some(host) = host {
                config.server_host = host;
            }
            noterer::start_server(config).await
        }
        Commands::SetupDb { with_samples } => run_setup(config, with_samples).await,
    }
}

/// Install the global subscriber from the `logging` section.
///
/// `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},tower_http=debug,neo4rs=warn",
            config.logging.level
        ))
    });

    let destination = config.logging.destination();
    let writer = match &destination {
        LogDestination::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogDestination::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogDestination::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };
    let ansi = matches!(destination, LogDestination::Stdout | LogDestination::Stderr);

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(ansi),
            )
            .init(),
    }
    Ok(())
}

async fn run_setup(config: Config, with_samples: bool) -> Result<()> {
    tracing::info!("Setting up database at {}", config.neo4j_uri);

    // Connecting creates constraints and indexes
    let client = Neo4jClient::new(
        &config.neo4j_uri,
        &config.neo4j_user,
        &config.neo4j_password,
        config.neo4j_timeout,
    )
    .await?;

    let seeded = client.seed_categories().await?;
    tracing::info!("{} categories seeded", seeded);

    if with_samples {
        if client.seed_samples().await? {
            tracing::info!("Sample note created");
        } else {
            tracing::info!("Sample note already present");
        }
    }

    tracing::info!("Database setup complete");
    Ok(())
}
