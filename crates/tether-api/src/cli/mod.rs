//! CLI command definitions for the `tether` binary.
//!
//! Uses clap derive macros for argument parsing. Session commands follow a
//! noun-verb pattern (e.g., `tether sessions list --ip 10.0.0.5`).

pub mod config;
pub mod message;
pub mod session;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tether_observe::LogFormat;

/// Observe and steer remote chat sessions.
#[derive(Parser)]
#[command(name = "tether", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value = "pretty", env = "TETHER_LOG_FORMAT")]
    pub log_format: LogFormatArg,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "TETHER_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server and background workers.
    Serve {
        /// Port to listen on (defaults to `server.port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `server.host`).
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage sessions on a remote chat server.
    Sessions {
        #[command(subcommand)]
        action: SessionsCommand,
    },

    /// Send a message through the outbound queue and wait for delivery.
    Send {
        /// Chat server IP.
        #[arg(long)]
        ip: String,

        /// Session id on the chat server.
        #[arg(long)]
        sid: String,

        /// Message text.
        text: String,
    },

    /// Print live snapshots of a session until Ctrl+C.
    Watch {
        /// Chat server IP.
        #[arg(long)]
        ip: String,

        /// Session id on the chat server.
        #[arg(long)]
        sid: String,
    },

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List sessions.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        ip: String,
    },

    /// Create a session.
    Create {
        #[arg(long)]
        ip: String,

        /// Optional session title.
        #[arg(long)]
        title: Option<String>,
    },

    /// Delete a session.
    #[command(alias = "rm")]
    Delete {
        #[arg(long)]
        ip: String,

        sid: String,
    },

    /// Publish a session and print its share URL.
    Share {
        #[arg(long)]
        ip: String,

        sid: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::parse_from(["tether", "send", "--ip", "10.0.0.5", "--sid", "ses_1", "hello"]);
        match cli.command {
            Commands::Send { ip, sid, text } => {
                assert_eq!(ip, "10.0.0.5");
                assert_eq!(sid, "ses_1");
                assert_eq!(text, "hello");
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_parse_sessions_share_with_global_flags() {
        let cli = Cli::parse_from(["tether", "sessions", "share", "--ip", "::1", "ses_9", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                action: SessionsCommand::Share { .. }
            }
        ));
    }
}
