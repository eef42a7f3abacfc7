// KeyProbe - Weak Password Auditor
// CLI command interface

use crate::config::Overrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "keyprobe",
    about = "KeyProbe - Local Weak Password Auditor",
    version,
    long_about = "Audits local accounts for weak passwords. Accounts with a login shell are read from the host registries, a short list of username-derived passwords is generated for each, and every candidate is tried through su in a pseudo-terminal."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Optional path to a JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Shell registry to read instead of /etc/shells
    #[arg(long)]
    pub shells: Option<PathBuf>,

    /// Account registry to read instead of /etc/passwd
    #[arg(long)]
    pub passwd: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe every account that has a login shell
    ///
    /// A probe counts as a match only when the check command's output is
    /// followed by the prompt marker (`probe.prompt_marker`, default `%`).
    /// A stock `su -c whoami` prints the username and exits without any
    /// marker, so against a real su set `"accept_output_on_exit": true` in
    /// the `probe` section of the config file to classify the output
    /// printed before su exits.
    Audit {
        #[command(flatten)]
        sources: SourceArgs,

        /// Only audit these users (may be repeated)
        #[arg(short, long = "user")]
        users: Vec<String>,

        /// Seconds to wait for each prompt
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Maximum number of concurrent su sessions
        #[arg(short, long)]
        workers: Option<usize>,

        /// Run even with an effective uid of 0
        #[arg(long, default_value_t = false)]
        allow_root: bool,
    },

    /// List discovered shells and accounts without probing
    Accounts {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Print the password candidates generated for a username
    Candidates {
        /// The username to expand
        username: String,

        /// Optional path to a JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl SourceArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            shells_file: self.shells.clone(),
            accounts_file: self.passwd.clone(),
            ..Overrides::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_arguments() {
        let cli = Cli::parse_from([
            "keyprobe", "--debug", "audit", "--shells", "/tmp/shells", "-u", "alice", "-u", "bob", "-t", "3", "-w", "8",
        ]);
        assert!(cli.debug);
        match cli.command {
            Commands::Audit { sources, users, timeout, workers, allow_root } => {
                let overrides = sources.overrides();
                assert_eq!(overrides.shells_file, Some(PathBuf::from("/tmp/shells")));
                assert_eq!(overrides.accounts_file, None);
                assert_eq!(users, vec!["alice", "bob"]);
                assert_eq!(timeout, Some(3));
                assert_eq!(workers, Some(8));
                assert!(!allow_root);
            }
            _ => panic!("expected audit command"),
        }
    }

    #[test]
    fn test_candidates_arguments() {
        let cli = Cli::parse_from(["keyprobe", "candidates", "alice"]);
        assert!(!cli.debug);
        assert!(matches!(cli.command, Commands::Candidates { ref username, config: None } if username == "alice"));
    }

    #[test]
    fn test_audit_long_help_mentions_exit_output_setting() {
        use clap::CommandFactory;
        let mut command = Cli::command();
        let audit = command.find_subcommand_mut("audit").unwrap();
        let help = audit.render_long_help().to_string();
        assert!(help.contains("accept_output_on_exit"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
