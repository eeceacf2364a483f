use clap::{Parser, Subcommand, ValueEnum};
use skein_client::MalformedFramePolicy;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Handling of stdio lines that are not valid JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MalformedLines {
    /// Log and continue with the next line
    Skip,
    /// Stop reading from the backend
    Terminate,
}

impl From<MalformedLines> for MalformedFramePolicy {
    fn from(lines: MalformedLines) -> Self {
        match lines {
            MalformedLines::Skip => MalformedFramePolicy::Skip,
            MalformedLines::Terminate => MalformedFramePolicy::Terminate,
        }
    }
}

#[derive(Parser)]
#[command(name = "skein")]
#[command(about = "skein - inspect accounts and events of a JSON-RPC account backend")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// WebSocket endpoint of the backend (overrides config file)
    #[arg(short, long, global = true, env = "SKEIN_URL")]
    pub url: Option<String>,

    /// Spawn this command and talk to it over stdio instead of WebSocket
    #[arg(long, global = true, value_name = "COMMAND")]
    pub stdio: Option<String>,

    /// What to do with stdio lines that are not JSON (overrides config file)
    #[arg(long, global = true, value_enum)]
    pub malformed_lines: Option<MalformedLines>,

    /// Config file path (TOML)
    #[arg(short = 'C', long, global = true, env = "SKEIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Set log level (off, error, warn, info, debug, trace)
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// `--log-level` wins over `--verbose`; the default is `warn`.
    pub fn effective_log_level(&self) -> LogLevel {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level,
            (None, true) => LogLevel::Debug,
            (None, false) => LogLevel::Warn,
        }
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// List the accounts known to the backend
    Accounts {
        /// Print one JSON object per account
        #[arg(long)]
        json: bool,
    },

    /// Print backend events as JSON lines until interrupted
    Tail {
        /// Only events of this account
        #[arg(short, long)]
        account: Option<u32>,

        /// Only events of this type (e.g. IncomingMsg)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        kind: Option<String>,

        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Call a backend method and print its result
    Call {
        /// Method name, e.g. get_all_account_ids
        method: String,

        /// JSON parameters
        #[arg(default_value = "[]")]
        params: String,
    },
}
