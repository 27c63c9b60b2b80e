//! CLI commands for memocache using clap.
//!
//! The binary only inspects and clears persisted caches; memoization itself
//! happens in-process through the library.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::backend::{FileCache, SqliteCache};
use crate::config::{load_settings, Settings, SqliteSettings};

/// memocache - inspect and maintain function result caches.
#[derive(Parser)]
#[command(name = "memocache")]
#[command(version)]
#[command(about = "Inspect and maintain memocache stores", long_about = None)]
pub struct Commands {
    /// Settings file (JSON)
    #[arg(long, global = true, env = "MEMOCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// More logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// SQLite store commands
    #[command(subcommand)]
    Sqlite(SqliteCommand),

    /// File store commands
    #[command(subcommand)]
    Files(FilesCommand),

    /// Print the effective settings
    Settings,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SqliteTarget {
    /// Database file (default: from settings)
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Table name (default: from settings)
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Subcommand)]
pub enum SqliteCommand {
    /// Entry count and database location
    Stats {
        #[command(flatten)]
        target: SqliteTarget,
    },

    /// List stored keys
    Keys {
        #[command(flatten)]
        target: SqliteTarget,

        /// Maximum keys to print
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Delete every entry in the table
    Clear {
        #[command(flatten)]
        target: SqliteTarget,
    },
}

#[derive(Subcommand)]
pub enum FilesCommand {
    /// Entry count and directory location
    Stats {
        /// Cache directory (default: from settings)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Delete every entry file
    Clear {
        /// Cache directory (default: from settings)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

impl Commands {
    /// Run the command.
    pub fn run(&self) -> Result<()> {
        let settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => Settings::default(),
        };

        match &self.command {
            Command::Sqlite(cmd) => cmd_sqlite(&settings, cmd),
            Command::Files(cmd) => cmd_files(&settings, cmd),
            Command::Settings => cmd_settings(&settings),
        }
    }
}

// Command implementations

fn sqlite_settings(settings: &Settings, target: &SqliteTarget) -> Result<SqliteSettings> {
    let mut sqlite = match &target.path {
        Some(path) => SqliteSettings {
            path: path.clone(),
            ..settings.sqlite.clone()
        },
        None => settings.sqlite()?,
    };
    if let Some(table) = &target.table {
        sqlite.table = table.clone();
    }
    // Maintenance commands never start from a blank table.
    sqlite.discard_existing = false;
    sqlite.quiet = true;
    Ok(sqlite)
}

fn open_existing(sqlite: SqliteSettings) -> Result<SqliteCache> {
    if !sqlite.path.exists() {
        bail!("No database at {}", sqlite.path.display());
    }
    Ok(SqliteCache::open(sqlite)?)
}

fn cmd_sqlite(settings: &Settings, cmd: &SqliteCommand) -> Result<()> {
    match cmd {
        SqliteCommand::Stats { target } => {
            let cache = open_existing(sqlite_settings(settings, target)?)?;
            let size = std::fs::metadata(&cache.settings().path)
                .map(|m| m.len())
                .unwrap_or(0);
            println!("Database: {}", cache.settings().path.display());
            println!("Table:    {}", cache.settings().table);
            println!("Entries:  {}", cache.len());
            println!("Size:     {} bytes", size);
        }
        SqliteCommand::Keys { target, limit } => {
            let cache = open_existing(sqlite_settings(settings, target)?)?;
            let keys = cache.keys();
            println!("Keys ({}):", keys.len());
            for key in keys.iter().take(*limit) {
                println!("  {}", key);
            }
            if keys.len() > *limit {
                println!("  ... {} more", keys.len() - limit);
            }
        }
        SqliteCommand::Clear { target } => {
            let mut cache = open_existing(sqlite_settings(settings, target)?)?;
            let removed = cache.clear()?;
            println!("Removed {} entries from {}", removed, cache.settings().table);
        }
    }
    Ok(())
}

fn files_dir(settings: &Settings, dir: &Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(settings.file_dir()?),
    }
}

fn open_dir(dir: &Path) -> Result<FileCache> {
    if !dir.is_dir() {
        bail!("No cache directory at {}", dir.display());
    }
    Ok(FileCache::new(dir)?)
}

fn cmd_files(settings: &Settings, cmd: &FilesCommand) -> Result<()> {
    match cmd {
        FilesCommand::Stats { dir } => {
            let cache = open_dir(&files_dir(settings, dir)?)?;
            println!("Directory: {}", cache.dir().display());
            println!("Entries:   {}", cache.len()?);
        }
        FilesCommand::Clear { dir } => {
            let mut cache = open_dir(&files_dir(settings, dir)?)?;
            let removed = cache.clear()?;
            println!("Removed {} entries from {}", removed, cache.dir().display());
        }
    }
    Ok(())
}

fn cmd_settings(settings: &Settings) -> Result<()> {
    let effective = Settings {
        cache_dir: Some(settings.cache_dir()?),
        file: crate::config::FileSettings {
            dir: Some(settings.file_dir()?),
        },
        sqlite: settings.sqlite()?,
    };
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}
