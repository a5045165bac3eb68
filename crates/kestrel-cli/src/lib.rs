//! # Kestrel CLI
//!
//! Command-line access to Kestrel work queues.
//!
//! This module provides CLI commands for:
//! - Reading items, with the transactional verbs and blocking waits
//! - Writing and deleting items
//! - Draining queues
//! - Inspecting server and queue statistics
//!
//! Servers come from `--servers` or from a YAML configuration file selected
//! with `--config`, `--env` and `--namespace`.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use kestrel_client::{
    Blocking, Client, ClientConfig, ConfigSet, ConfigurationError, QueueError, ReadOptions,
    ServerStats,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Kestrel CLI - work queue client
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read, write and inspect Kestrel work queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KESTREL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment section of the configuration file
    #[arg(short, long, default_value = "development", env = "KESTREL_ENV")]
    pub env: String,

    /// Namespace section of the configuration file
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Servers as host:port, overriding the configuration file
    #[arg(short, long, value_delimiter = ',', env = "KESTREL_SERVERS")]
    pub servers: Vec<String>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Read one item from a queue
    Get {
        queue: String,

        /// Begin a reliable read
        #[arg(long)]
        open: bool,

        /// End a reliable read
        #[arg(long)]
        close: bool,

        /// Cancel a reliable read
        #[arg(long, conflicts_with = "open")]
        abort: bool,

        /// Read without removing the item
        #[arg(long)]
        peek: bool,

        /// Milliseconds the server may wait for an item
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Keep reading until an item arrives
        #[arg(short, long)]
        block: bool,
    },

    /// Append an item to a queue
    Set {
        queue: String,

        value: String,

        /// Expiry in seconds, 0 for none
        #[arg(short, long, default_value = "0")]
        expiry: u32,
    },

    /// Delete a queue
    Delete { queue: String },

    /// Show the head of a queue without removing it
    Peek { queue: String },

    /// Discard every item of a queue
    Flush { queue: String },

    /// Show the statistics of one queue
    Stat {
        queue: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show merged server statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the queues known to the servers
    Queues,
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Queue '{queue}' is empty")]
    Empty { queue: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Io(_) => 4,
            Self::CommandFailed { .. } => 5,
            Self::Empty { .. } => 6,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::CommandFailed {
            message: format!("failed to format output: {}", error),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli.log_level, cli.json_logs)?;

    let config = client_config(&cli)?;
    info!(servers = ?config.servers, "Connecting");
    let mut client = Client::from_config(&config)?;

    let mut stdout = std::io::stdout();
    execute_command(&cli.command, &mut client, &mut stdout).await
}

/// Install the tracing subscriber. Logs go to stderr.
///
/// `RUST_LOG` takes precedence over `log_level`.
pub fn initialize_logging(log_level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    installed.map_err(|e| CliError::CommandFailed {
        message: format!("failed to initialize logging: {}", e),
    })
}

/// Resolve the client settings from the command line
pub fn client_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    if !cli.servers.is_empty() {
        let config = ClientConfig::new(cli.servers.clone());
        config.validate()?;
        return Ok(config);
    }

    let path = cli.config.as_ref().ok_or_else(|| CliError::InvalidArgument {
        arg: "--config".to_string(),
        message: "either --config or --servers is required".to_string(),
    })?;

    if !path.is_file() {
        return Err(CliError::InvalidArgument {
            arg: "--config".to_string(),
            message: format!("configuration file not found: {}", path.display()),
        });
    }

    let set = ConfigSet::load(path)?.with_environment(cli.env.clone());
    debug!(
        path = %path.display(),
        environment = %set.environment(),
        namespace = ?cli.namespace,
        "Loaded configuration"
    );

    let config = match &cli.namespace {
        Some(namespace) => set.namespace(namespace)?,
        None => set.default_config()?,
    };
    Ok(config)
}

// ============================================================================
// Command Execution
// ============================================================================

/// Run `command` against `client`, writing results to `out`
pub async fn execute_command<W: Write + Send>(
    command: &Commands,
    client: &mut Client,
    out: &mut W,
) -> Result<(), CliError> {
    match command {
        Commands::Get {
            queue,
            open,
            close,
            abort,
            peek,
            timeout,
            block,
        } => {
            let options = ReadOptions {
                open: *open,
                close: *close,
                abort: *abort,
                peek: *peek,
                timeout: *timeout,
                raw: false,
            };
            execute_get_command(client, queue, &options, *block, out).await
        }
        Commands::Set {
            queue,
            value,
            expiry,
        } => execute_set_command(client, queue, value, *expiry).await,
        Commands::Delete { queue } => {
            client.delete(queue).await?;
            Ok(())
        }
        Commands::Peek { queue } => {
            let value = client.peek(queue).await?;
            write_item(out, queue, value)
        }
        Commands::Flush { queue } => {
            let discarded = client.flush(queue).await?;
            writeln!(out, "{}", discarded)?;
            Ok(())
        }
        Commands::Stat { queue, format } => execute_stat_command(client, queue, *format, out).await,
        Commands::Stats { format } => {
            let stats = client.stats().await?;
            write_stats(out, &stats, *format)
        }
        Commands::Queues => {
            for queue in client.available_queues().await? {
                writeln!(out, "{}", queue)?;
            }
            Ok(())
        }
    }
}

async fn execute_get_command<W: Write + Send>(
    client: &mut Client,
    queue: &str,
    options: &ReadOptions,
    block: bool,
    out: &mut W,
) -> Result<(), CliError> {
    let value = if block {
        let mut blocking = Blocking::new(&mut *client);
        Some(blocking.get(queue, options).await?)
    } else {
        client.get(queue, options).await?
    };

    write_item(out, queue, value)
}

async fn execute_set_command(
    client: &mut Client,
    queue: &str,
    value: &str,
    expiry: u32,
) -> Result<(), CliError> {
    let stored = client
        .set(queue, Bytes::copy_from_slice(value.as_bytes()), expiry)
        .await?;

    if stored {
        Ok(())
    } else {
        Err(CliError::CommandFailed {
            message: format!("server did not store the item on '{}'", queue),
        })
    }
}

async fn execute_stat_command<W: Write + Send>(
    client: &mut Client,
    queue: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<(), CliError> {
    let Some(stats) = client.stat(queue).await? else {
        return Err(CliError::CommandFailed {
            message: format!("no statistics for queue '{}'", queue),
        });
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?,
        OutputFormat::Text => {
            for (name, value) in &stats {
                writeln!(out, "{} {}", name, value)?;
            }
        }
    }
    Ok(())
}

fn write_item<W: Write>(out: &mut W, queue: &str, value: Option<Bytes>) -> Result<(), CliError> {
    let Some(value) = value else {
        return Err(CliError::Empty {
            queue: queue.to_string(),
        });
    };

    out.write_all(&value)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn write_stats<W: Write>(
    out: &mut W,
    stats: &ServerStats,
    format: OutputFormat,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(stats)?)?;
        }
        OutputFormat::Text => {
            for (name, value) in &stats.stats {
                writeln!(out, "{} {}", name, value)?;
            }
            for (queue, queue_stats) in &stats.queues {
                writeln!(out)?;
                writeln!(out, "queue {}", queue)?;
                for (name, value) in queue_stats {
                    writeln!(out, "  {} {}", name, value)?;
                }
            }
        }
    }
    Ok(())
}
