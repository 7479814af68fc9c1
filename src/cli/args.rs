//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--config <path>`: Read settings from this file

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::schema::MAX_TIMEOUT_SECS;
use crate::forge::GitProvider;

/// forgeops - Repository chores for end-to-end test runs on GitHub, GitLab and Forgejo
#[derive(Parser, Debug)]
#[command(name = "forgeops")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Settings file (default: $FORGEOPS_CONFIG, then the standard locations)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Provider and repository shared by the repository commands.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Provider: gh, gl, fj (or github, gitlab, forgejo)
    #[arg(short, long, value_parser = parse_provider)]
    pub provider: GitProvider,

    /// Repository as owner/name; a bare name uses the configured organization
    pub repo: String,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered providers and whether each is enabled
    #[command(after_help = "\
EXAMPLES:
    # Show every provider with its organization and token variable
    forgeops providers

    # Preview a selection without exporting E2E_GIT_PROVIDERS
    forgeops providers --only gh,gl")]
    Providers {
        /// Allow-list to evaluate instead of E2E_GIT_PROVIDERS
        #[arg(long, value_name = "PREFIXES")]
        only: Option<String>,
    },

    /// Print whether a branch exists
    BranchExists {
        #[command(flatten)]
        target: RepoArgs,

        /// Branch name
        branch: String,
    },

    /// Delete a branch (a missing branch is reported, not an error)
    DeleteBranch {
        #[command(flatten)]
        target: RepoArgs,

        /// Branch name
        branch: String,
    },

    /// List open pull requests
    ListPrs {
        #[command(flatten)]
        target: RepoArgs,
    },

    /// Delete the first webhook whose URL contains HOST
    CleanupWebhooks {
        #[command(flatten)]
        target: RepoArgs,

        /// Substring of the webhook URL, usually the cluster domain
        host: String,
    },

    /// Delete a repository if it exists
    DeleteRepo {
        #[command(flatten)]
        target: RepoArgs,
    },

    /// Wait for a CI status on a commit and print its final state
    #[command(after_help = "\
EXAMPLES:
    # Wait up to 10 minutes per phase for the build check on a commit
    forgeops status -p gh octo-org/app 1a2b3c build-on-push

    # Poll faster with a shorter deadline
    forgeops status -p gl konflux-qe/app 1a2b3c build --interval 1 --timeout 120")]
    Status {
        #[command(flatten)]
        target: RepoArgs,

        /// Commit SHA
        sha: String,

        /// Status name, or a substring of it
        name: String,

        /// Seconds to wait in each phase (appear, then complete)
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
        timeout: Option<u64>,

        /// Seconds between checks
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}

fn parse_provider(s: &str) -> Result<GitProvider, String> {
    GitProvider::parse(s).ok_or_else(|| {
        format!(
            "unknown provider '{}', expected one of: {}",
            s,
            GitProvider::all()
                .iter()
                .map(|p| p.prefix())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_status() {
        let cli = Cli::try_parse_from([
            "forgeops", "--debug", "status", "-p", "gl", "group/app", "abc", "build", "--timeout",
            "30",
        ])
        .unwrap();
        assert!(cli.debug);
        match cli.command {
            Command::Status {
                target, timeout, ..
            } => {
                assert_eq!(target.provider, GitProvider::GitLab);
                assert_eq!(target.repo, "group/app");
                assert_eq!(timeout, Some(30));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn status_timeout_is_bounded() {
        let parse = |secs: &str| {
            Cli::try_parse_from([
                "forgeops", "status", "-p", "gh", "app", "abc", "build", "--timeout", secs,
            ])
        };
        assert!(parse("600").is_ok());
        assert!(parse("0").is_err());
        assert!(parse("18446744073709551615").is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = Cli::try_parse_from(["forgeops", "list-prs", "-p", "bb", "app"]).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }
}
