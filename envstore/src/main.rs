//! Review and manage agent environments stored alongside a git repository.
//!
//! Environments are created and updated by an agent front end through the
//! library; this binary covers what a human needs afterwards: listing them,
//! reading their history and bringing their work into the current branch.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use envstore::Repository;
use envstore::exit_codes;
use envstore::io::config::{default_config_path, load_config};

#[derive(Parser)]
#[command(
    name = "envstore",
    version,
    about = "Git-backed storage for agent environments"
)]
struct Cli {
    /// Repository to operate on (any path inside it).
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Store config file (defaults to ~/.config/container-use/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List environment ids.
    List,
    /// Show the commit log of an environment.
    Log {
        id: String,
        /// Include diffs.
        #[arg(short, long)]
        patch: bool,
    },
    /// Show changes made by an environment relative to HEAD.
    Diff { id: String },
    /// Check out the environment branch in the repository.
    Checkout { id: String },
    /// Merge an environment into the current branch, keeping its commits.
    Merge { id: String },
    /// Stage an environment's changes on the current branch without committing.
    Apply { id: String },
    /// Delete an environment's branch and worktree.
    Delete { id: String },
}

fn main() {
    envstore::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::for_error(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;
    let repo = Repository::open(&config, &cli.repo)?;

    match cli.command {
        Command::List => {
            for id in repo.list()? {
                println!("{id}");
            }
        }
        Command::Log { id, patch } => print!("{}", repo.log(&id, patch)?),
        Command::Diff { id } => print!("{}", repo.diff(&id)?),
        Command::Checkout { id } => {
            let branch = repo.checkout(&id)?;
            println!("Switched to branch '{branch}'");
        }
        Command::Merge { id } => {
            repo.merge(&id)?;
            println!("Merged {id} into the current branch");
        }
        Command::Apply { id } => {
            repo.apply(&id)?;
            println!("Staged changes from {id}; review and commit them");
        }
        Command::Delete { id } => {
            repo.delete(&id)?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}
