//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Service identifier shared by advertisers and scanners (UUID or short form)
    #[arg(long, global = true)]
    pub service_id: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long, global = true)]
    pub duration: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Advertise an identity to nearby scanners
    Advertise {
        /// Identity to publish; defaults to the configured identity
        identity: Option<String>,
    },
    /// Scan for nearby advertisers and print their identities
    Discover,
    /// Advertise and discover at the same time
    Run {
        /// Identity to publish; defaults to the configured identity
        identity: Option<String>,
    },
    /// Run named devices against an in-memory radio
    Simulate {
        /// Device names; each advertises its own name
        #[arg(default_values_t = ["alice".to_string(), "bob".to_string(), "carol".to_string()])]
        peers: Vec<String>,

        /// Devices that refuse every connection
        #[arg(long)]
        flaky: Vec<String>,

        /// Devices whose identity reads back as invalid UTF-8
        #[arg(long)]
        garbled: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_global_flags() {
        let cli = Cli::parse_from([
            "nearcast",
            "run",
            "alice",
            "--service-id",
            "FEED",
            "--duration",
            "5",
            "-v",
        ]);
        assert_eq!(
            cli.command,
            Commands::Run {
                identity: Some("alice".to_string())
            }
        );
        assert_eq!(cli.service_id.as_deref(), Some("FEED"));
        assert_eq!(cli.duration, Some(5));
        assert!(cli.verbose);
    }

    #[test]
    fn test_simulate_defaults_to_three_peers() {
        let cli = Cli::parse_from(["nearcast", "simulate"]);
        match cli.command {
            Commands::Simulate { peers, flaky, .. } => {
                assert_eq!(peers, vec!["alice", "bob", "carol"]);
                assert!(flaky.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_advertise_identity_is_optional() {
        let cli = Cli::parse_from(["nearcast", "advertise"]);
        assert_eq!(cli.command, Commands::Advertise { identity: None });
        assert!(Cli::try_parse_from(["nearcast", "launch"]).is_err());
    }
}
