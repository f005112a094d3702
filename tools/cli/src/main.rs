//! StorageKit CLI - Command line access to provider-alias storage.
//!
//! Every location argument is an `alias://path` URI resolved through the
//! configured providers.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use storagekit_config::{load_from_env, load_from_yaml_path, StorageConfig, DEFAULT_CONFIG_ENV};
use storagekit_storage::local::local_path_from_uri;
use storagekit_storage::{Listing, Metadata, OpenMode, StorageClient};

const APP_NAME: &str = "storagekit";

#[derive(Parser)]
#[command(name = "storagekit")]
#[command(about = "StorageKit - Provider-alias storage access")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: the file named by STORAGEKIT_CONFIG).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured provider aliases.
    Providers,

    /// Show the physical location an alias URI resolves to.
    Resolve {
        /// Alias URI (alias://path).
        uri: String,
    },

    /// List a directory.
    Ls {
        uri: String,

        /// Show size, type and modification time.
        #[arg(short, long)]
        long: bool,
    },

    /// List entries matching a wildcard pattern.
    Glob {
        /// Pattern URI, e.g. data://logs/*.csv
        pattern: String,

        /// Show size, type and modification time.
        #[arg(short, long)]
        long: bool,
    },

    /// Show metadata for a path.
    Stat { uri: String },

    /// Exit with status 0 if a path exists, 1 otherwise.
    Exists { uri: String },

    /// Write a file's content to stdout.
    Cat { uri: String },

    /// Upload a local file or directory.
    Put {
        local: PathBuf,
        uri: String,

        /// Upload directories recursively.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Download a file or directory.
    Get {
        uri: String,
        local: PathBuf,

        /// Download directories recursively.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Copy between any two locations.
    Cp {
        src: String,
        dst: String,

        /// Copy directories recursively.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Remove a file or directory.
    Rm {
        uri: String,

        /// Remove directories and their contents.
        #[arg(short, long)]
        recursive: bool,
    },

    /// Create a directory and its parents.
    Mkdir {
        uri: String,

        /// Fail if the directory already exists.
        #[arg(long)]
        no_exist_ok: bool,
    },

    /// Generate shell completions.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_deref())?;
    let client = StorageClient::new(config);

    match cli.command {
        Commands::Providers => cmd_providers(&client),
        Commands::Resolve { uri } => cmd_resolve(&client, &uri),
        Commands::Ls { uri, long } => cmd_ls(&client, &uri, long).await,
        Commands::Glob { pattern, long } => cmd_glob(&client, &pattern, long).await,
        Commands::Stat { uri } => cmd_stat(&client, &uri).await,
        Commands::Exists { uri } => return cmd_exists(&client, &uri).await,
        Commands::Cat { uri } => cmd_cat(&client, &uri).await,
        Commands::Put {
            local,
            uri,
            recursive,
        } => cmd_put(&client, &local, &uri, recursive).await,
        Commands::Get {
            uri,
            local,
            recursive,
        } => cmd_get(&client, &uri, &local, recursive).await,
        Commands::Cp {
            src,
            dst,
            recursive,
        } => cmd_cp(&client, &src, &dst, recursive).await,
        Commands::Rm { uri, recursive } => cmd_rm(&client, &uri, recursive).await,
        Commands::Mkdir { uri, no_exist_ok } => cmd_mkdir(&client, &uri, !no_exist_ok).await,
        Commands::Completions { .. } => Ok(()),
    }?;

    Ok(ExitCode::SUCCESS)
}

/// Load configuration from `--config`, or from the environment.
fn load_config(path: Option<&Path>) -> Result<StorageConfig> {
    match path {
        Some(path) => load_from_yaml_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => load_from_env(DEFAULT_CONFIG_ENV).with_context(|| {
            format!(
                "Failed to load config (set {} or pass --config)",
                DEFAULT_CONFIG_ENV
            )
        }),
    }
}

/// Accept plain paths and file:// URIs for local arguments.
fn local_arg(path: &Path) -> PathBuf {
    local_path_from_uri(&path.to_string_lossy())
}

fn print_entry(meta: &Metadata, long: bool) {
    if !long {
        println!("{}", meta.name);
        return;
    }

    let modified = meta
        .modified
        .map(|m| m.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    if meta.is_directory {
        println!("  [DIR]  {:>12}  {}  {}/", "-", modified, meta.name);
    } else {
        let size = meta.size.map(|s| s.to_string()).unwrap_or_default();
        println!("  [FILE] {:>12}  {}  {}", size, modified, meta.name);
    }
}

fn print_listing(listing: &Listing, long: bool) {
    match listing {
        Listing::Names(names) => names.iter().for_each(|name| println!("{}", name)),
        Listing::Detailed(entries) => entries.iter().for_each(|meta| print_entry(meta, long)),
    }
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
}

/// List configured aliases with their base locations.
fn cmd_providers(client: &StorageClient) -> Result<()> {
    for (alias, provider) in client.config().providers() {
        println!("{:<16} {}", alias, provider.base_uri());
    }
    Ok(())
}

fn cmd_resolve(client: &StorageClient, uri: &str) -> Result<()> {
    let location = client
        .resolve(uri)
        .with_context(|| format!("Failed to resolve {}", uri))?;

    println!("{}", location.physical_uri);
    for (key, value) in &location.options {
        println!("  {} = {}", key, value);
    }
    Ok(())
}

async fn cmd_ls(client: &StorageClient, uri: &str, long: bool) -> Result<()> {
    let listing = client
        .list(uri, long)
        .await
        .with_context(|| format!("Failed to list {}", uri))?;

    if listing.is_empty() {
        println!("Directory is empty.");
    } else {
        print_listing(&listing, long);
    }
    Ok(())
}

async fn cmd_glob(client: &StorageClient, pattern: &str, long: bool) -> Result<()> {
    let listing = client
        .glob(pattern, long)
        .await
        .with_context(|| format!("Failed to expand {}", pattern))?;

    print_listing(&listing, long);
    Ok(())
}

async fn cmd_stat(client: &StorageClient, uri: &str) -> Result<()> {
    let meta = client
        .info(uri)
        .await
        .with_context(|| format!("Failed to stat {}", uri))?;

    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

async fn cmd_exists(client: &StorageClient, uri: &str) -> Result<ExitCode> {
    let exists = client
        .exists(uri)
        .await
        .with_context(|| format!("Failed to check {}", uri))?;

    println!("{}", exists);
    Ok(if exists {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_cat(client: &StorageClient, uri: &str) -> Result<()> {
    let mut file = client
        .open(uri, OpenMode::Read)
        .await
        .with_context(|| format!("Failed to open {}", uri))?;

    let mut stdout = tokio::io::stdout();
    tokio::io::copy(&mut file, &mut stdout)
        .await
        .with_context(|| format!("Failed to read {}", uri))?;
    Ok(())
}

async fn cmd_put(client: &StorageClient, local: &Path, uri: &str, recursive: bool) -> Result<()> {
    let local = local_arg(local);
    info!("Uploading {} to {}", local.display(), uri);

    client
        .upload(&local, uri, recursive)
        .await
        .with_context(|| format!("Failed to upload {}", local.display()))?;

    println!("Uploaded {} -> {}", local.display(), uri);
    Ok(())
}

async fn cmd_get(client: &StorageClient, uri: &str, local: &Path, recursive: bool) -> Result<()> {
    let local = local_arg(local);
    info!("Downloading {} to {}", uri, local.display());

    client
        .download(uri, &local, recursive)
        .await
        .with_context(|| format!("Failed to download {}", uri))?;

    println!("Downloaded {} -> {}", uri, local.display());
    Ok(())
}

async fn cmd_cp(client: &StorageClient, src: &str, dst: &str, recursive: bool) -> Result<()> {
    client
        .copy(src, dst, recursive)
        .await
        .with_context(|| format!("Failed to copy {} to {}", src, dst))?;

    println!("Copied {} -> {}", src, dst);
    Ok(())
}

async fn cmd_rm(client: &StorageClient, uri: &str, recursive: bool) -> Result<()> {
    info!("Removing: {}", uri);

    client
        .remove(uri, recursive)
        .await
        .with_context(|| format!("Failed to remove {}", uri))?;

    println!("Removed: {}", uri);
    Ok(())
}

async fn cmd_mkdir(client: &StorageClient, uri: &str, exist_ok: bool) -> Result<()> {
    client
        .makedirs(uri, exist_ok)
        .await
        .with_context(|| format!("Failed to create directory {}", uri))?;

    println!("Directory created: {}", uri);
    Ok(())
}
