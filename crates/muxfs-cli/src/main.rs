//! muxfs command-line tool.
//!
//! Loads a mount manifest, runs one namespace operation, then commits every
//! mount that buffers its changes.
//!
//! Usage:
//!   muxfs --config mounts.ron mounts
//!   muxfs --config mounts.ron ls /assets
//!   muxfs --config mounts.ron cp /assets/logo.png /scratch/logo.png --overwrite
//!
//! Without `--config` the namespace is a single in-memory backend at `/`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use muxfs_core::{DirEntry, EntryKind, MemoryBackend, Vfs, VfsConfig};

/// Operate on a multiplexed virtual filesystem.
#[derive(Parser, Debug)]
#[command(name = "muxfs")]
#[command(about = "Run one operation against a muxfs namespace")]
struct Args {
    /// RON mount manifest
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List mount points
    Mounts,
    /// List a directory
    Ls { path: String },
    /// Print a file to stdout
    Cat { path: String },
    /// Describe one entry
    Stat { path: String },
    /// Copy a file or directory
    Cp {
        from: String,
        to: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Move a file or directory
    Mv {
        from: String,
        to: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Create a directory and its parents
    Mkdir { path: String },
    /// Remove a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let vfs = open(args.config.as_ref())?;

    run(&vfs, args.command)?;

    for mount in vfs.list_mount_points() {
        if mount.capabilities.requires_commit() {
            vfs.commit(&mount.path)
                .with_context(|| format!("committing {}", mount.path))?;
        }
    }
    Ok(())
}

fn open(config: Option<&PathBuf>) -> Result<Vfs> {
    let span = tracing::info_span!("muxfs");
    match config {
        Some(path) => {
            let config = VfsConfig::load(path)
                .with_context(|| format!("loading manifest {}", path.display()))?;
            Ok(config.build_with_span(span)?)
        }
        None => {
            let vfs = Vfs::with_span(span);
            vfs.mount("/", MemoryBackend::new(), false)?;
            Ok(vfs)
        }
    }
}

fn run(vfs: &Vfs, command: Command) -> Result<()> {
    match command {
        Command::Mounts => {
            for mount in vfs.list_mount_points() {
                println!("{:<24} {:<12} {}", mount.path.as_str(), mount.backend, mount.capabilities);
            }
        }
        Command::Ls { path } => {
            for entry in vfs.list_directory(path.as_str())? {
                print_entry(&entry);
            }
        }
        Command::Cat { path } => {
            let data = vfs.read_all(path.as_str())?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Command::Stat { path } => {
            let entry = vfs.metadata(path.as_str())?;
            println!("path:        {}", entry.path);
            println!("kind:        {}", entry.kind);
            println!("size:        {}", entry.size);
            println!("backend:     {}", entry.backend);
            println!("properties:  {:?}", entry.properties);
            if let Some(physical) = vfs.physical_path(path.as_str())? {
                println!("physical:    {}", physical.display());
            }
        }
        Command::Cp { from, to, overwrite } => {
            if vfs.metadata(from.as_str())?.is_dir() {
                vfs.copy_directory(from.as_str(), to.as_str())?;
            } else {
                vfs.copy_file(from.as_str(), to.as_str(), overwrite)?;
            }
        }
        Command::Mv { from, to, overwrite } => {
            if vfs.metadata(from.as_str())?.is_dir() {
                vfs.move_directory(from.as_str(), to.as_str())?;
            } else {
                vfs.move_file(from.as_str(), to.as_str(), overwrite)?;
            }
        }
        Command::Mkdir { path } => vfs.create_directory(path.as_str())?,
        Command::Rm { path, recursive } => {
            if vfs.metadata(path.as_str())?.is_dir() {
                vfs.delete_directory(path.as_str(), recursive)?;
            } else {
                vfs.delete_file(path.as_str())?;
            }
        }
    }
    Ok(())
}

fn print_entry(entry: &DirEntry) {
    let marker = match entry.kind {
        EntryKind::File => '-',
        EntryKind::Directory => 'd',
        EntryKind::MountPoint => 'm',
    };
    println!("{} {:>10} {:<12} {}", marker, entry.size, entry.backend, entry.path);
}
