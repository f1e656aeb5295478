//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use rtransfer_engine::config::{DEFAULT_RETRIES, DEFAULT_RETRY_WAIT, DEFAULT_THREADS};

#[derive(Parser, Debug)]
#[command(
    name = "rtransfer",
    version,
    about = "Transfer local repositories from a source server to a target server"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate matching repositories, then replay changes made meanwhile.
    Transfer(TransferArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Server id of the source, as configured in the config file
    pub source_server: String,

    /// Server id of the target
    pub target_server: String,

    /// Repositories to transfer; `*` and `?` wildcards are allowed
    pub repo_filter: String,

    /// Skip files whose checksum already exists in the target filestore
    #[arg(long)]
    pub filestore: bool,

    /// Worker threads, also the maximum number of chunks in flight
    #[arg(long, default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// Consecutive failed status requests tolerated before giving up
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Wait before retrying a failed status request, in milliseconds
    #[arg(long = "retry-wait-time", default_value_t = DEFAULT_RETRY_WAIT.as_millis() as u64)]
    pub retry_wait_time: u64,

    /// Config file (defaults to ~/.config/rtransfer/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<TransferArgs, clap::Error> {
        let cli = Cli::try_parse_from(std::iter::once("rtransfer").chain(args.iter().copied()))?;
        match cli.command {
            Command::Transfer(args) => Ok(args),
        }
    }

    #[test]
    fn positionals_and_defaults() {
        let args = parse(&["transfer", "src", "tgt", "*-local"]).unwrap();
        assert_eq!(args.source_server, "src");
        assert_eq!(args.target_server, "tgt");
        assert_eq!(args.repo_filter, "*-local");
        assert!(!args.filestore);
        assert_eq!(args.threads, 16);
        assert_eq!(args.retries, 3);
        assert_eq!(args.retry_wait_time, 5000);
        assert!(args.config.is_none());
    }

    #[test]
    fn flags() {
        let args = parse(&[
            "transfer",
            "src",
            "tgt",
            "lib-*",
            "--filestore",
            "--threads",
            "4",
            "--retries=10",
            "--retry-wait-time",
            "250",
            "--config",
            "/etc/rtransfer.toml",
        ])
        .unwrap();
        assert!(args.filestore);
        assert_eq!(args.threads, 4);
        assert_eq!(args.retries, 10);
        assert_eq!(args.retry_wait_time, 250);
        assert_eq!(args.config, Some(PathBuf::from("/etc/rtransfer.toml")));
    }

    #[test]
    fn exactly_three_positionals() {
        assert!(parse(&["transfer", "src", "tgt"]).is_err());
        assert!(parse(&["transfer", "src", "tgt", "lib-*", "extra"]).is_err());
    }
}
