//! ghkv command-line client for GitHub-backed record stores.
//!
//! Supports:
//! - Class, table and record management
//! - Moving files and folders inside the repository
//! - Repository lifecycle (info/create/rename/delete)
//! - Webhook management
//!
//! # Usage
//!
//! ```bash
//! # Create a class and a table
//! ghkv --repo records class create users
//! ghkv --repo records table create users active
//!
//! # Insert, read and search records (values are JSON, or plain strings)
//! ghkv --repo records record insert users active alice '{"age": 36}'
//! ghkv --repo records record get users active
//! ghkv --repo records record search users active alice
//!
//! # Try things out without touching GitHub
//! ghkv --memory class list
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ghkv_core::config::DEFAULT_CONFIG_FILE;
use ghkv_core::GhkvConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ghkv")]
#[command(author = "ghkv Contributors")]
#[command(version)]
#[command(about = "Key-value document store on a GitHub repository")]
struct Cli {
    /// Config file (default: ./ghkv.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Repository name
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Repository owner (default: the token's user)
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Branch to read from and commit to
    #[arg(short, long, global = true)]
    branch: Option<String>,

    /// Use a throwaway in-memory store instead of GitHub
    #[arg(long, global = true)]
    memory: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage classes (top-level folders)
    Class {
        #[command(subcommand)]
        action: ClassAction,
    },

    /// Manage tables (JSON documents inside a class)
    Table {
        #[command(subcommand)]
        action: TableAction,
    },

    /// Manage records inside a table
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Move a file or folder
    Mv {
        /// Source path
        src: String,
        /// Destination path
        dst: String,
    },

    /// Manage the backing repository
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Manage repository webhooks
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },
}

#[derive(Subcommand, Debug)]
enum ClassAction {
    /// Create a class (no-op if it exists)
    Create { name: String },
    /// Remove a class and all of its tables
    Remove { name: String },
    /// List classes
    List,
    /// Rename a class
    Rename { name: String, new_name: String },
}

#[derive(Subcommand, Debug)]
enum TableAction {
    /// Create an empty table (no-op if it exists)
    Create { class: String, name: String },
    /// Remove a table
    Remove { class: String, name: String },
    /// List the tables of a class
    List { class: String },
}

#[derive(Subcommand, Debug)]
enum RecordAction {
    /// Add a record
    Insert {
        class: String,
        table: String,
        name: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },
    /// Replace an existing record
    Update {
        class: String,
        table: String,
        name: String,
        value: String,
    },
    /// Remove a record
    Remove {
        class: String,
        table: String,
        name: String,
    },
    /// Print every record of a table
    Get { class: String, table: String },
    /// Print one record
    Search {
        class: String,
        table: String,
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum RepoAction {
    /// Show repository details
    Info,
    /// Create a repository owned by the token's user
    Create {
        name: String,
        /// Make the repository public
        #[arg(long)]
        public: bool,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Delete the repository
    Delete {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Rename the repository
    Rename { new_name: String },
}

#[derive(Subcommand, Debug)]
enum HookAction {
    /// List webhooks
    List,
    /// Add a webhook
    Create {
        /// Payload URL
        url: String,
        /// Event to subscribe to (repeatable, default: push)
        #[arg(short, long = "event")]
        events: Vec<String>,
        /// Secret used to sign deliveries
        #[arg(long)]
        secret: Option<String>,
        /// Create the hook disabled
        #[arg(long)]
        inactive: bool,
    },
    /// Remove a webhook
    Delete { id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug { "ghkv=debug" } else { "ghkv=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_target(false)
        .init();

    let config = load_config(&cli)?;
    let ctx = commands::Context::new(config, cli.memory);

    match cli.command {
        Commands::Class { action } => commands::class(&ctx, action).await,
        Commands::Table { action } => commands::table(&ctx, action).await,
        Commands::Record { action } => commands::record(&ctx, action).await,
        Commands::Mv { src, dst } => commands::mv(&ctx, &src, &dst).await,
        Commands::Repo { action } => commands::repo(&ctx, action).await,
        Commands::Hook { action } => commands::hook(&ctx, action).await,
    }
}

/// Config file, then environment, then command-line flags
fn load_config(cli: &Cli) -> Result<GhkvConfig> {
    let mut config = match &cli.config {
        Some(path) => GhkvConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GhkvConfig::load_or_default(&PathBuf::from(DEFAULT_CONFIG_FILE))?,
    };
    config.apply_env();

    if let Some(repo) = &cli.repo {
        config.github.repository = repo.clone();
    }
    if let Some(owner) = &cli.owner {
        config.github.owner = Some(owner.clone());
    }
    if let Some(branch) = &cli.branch {
        config.github.branch = branch.clone();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_record_insert() {
        let cli = Cli::try_parse_from([
            "ghkv", "--memory", "record", "insert", "C", "T", "k1", "{\"a\":1}",
        ])
        .unwrap();
        assert!(cli.memory);
        match cli.command {
            Commands::Record {
                action:
                    RecordAction::Insert {
                        class,
                        table,
                        name,
                        value,
                    },
            } => {
                assert_eq!((class.as_str(), table.as_str(), name.as_str()), ("C", "T", "k1"));
                assert_eq!(value, "{\"a\":1}");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ghkv", "class", "list", "--branch", "dev"]).unwrap();
        assert_eq!(cli.branch.as_deref(), Some("dev"));
    }

    #[test]
    fn test_hook_events_repeat() {
        let cli = Cli::try_parse_from([
            "ghkv", "hook", "create", "https://example.com", "-e", "push", "-e", "issues",
        ])
        .unwrap();
        match cli.command {
            Commands::Hook {
                action: HookAction::Create { events, inactive, .. },
            } => {
                assert_eq!(events, vec!["push", "issues"]);
                assert!(!inactive);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[github]\nrepository = \"from-file\"\nbranch = \"data\"\nowner = \"octocat\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from(["ghkv", "--config", path, "--repo", "from-flag", "class", "list"])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.github.repository, "from-flag");
        assert_eq!(config.github.owner.as_deref(), Some("octocat"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let cli = Cli::try_parse_from(["ghkv", "--config", missing.to_str().unwrap(), "class", "list"])
            .unwrap();
        assert!(load_config(&cli).is_err());
    }
}
