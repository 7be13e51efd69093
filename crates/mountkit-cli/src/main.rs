//! Mountkit CLI - inspect and copy across mounted filesystems
//!
//! Usage:
//!   mountkit --mount data=/var/data ls data://
//!   mountkit --mount data=/var/data cat data://config.toml
//!   mountkit --mount a=/src --mount b=/dst mirror a:// b:// --delete

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use mountkit::bridge::{CallContext, ProtocolRegistry, StatFlags, StreamBridge};
use mountkit::{Filesystem, MemoryFs, MirrorOptions, Router};

/// Mountkit - virtual filesystem toolkit
#[derive(Parser, Debug)]
#[command(name = "mountkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mount a local directory under a prefix, e.g. --mount data=/var/data
    #[arg(long = "mount", value_name = "PREFIX=DIR")]
    mounts: Vec<String>,

    /// Mount an empty in-memory filesystem under a prefix
    #[arg(long = "memory", value_name = "PREFIX")]
    memory: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        path: String,
        /// Include nested entries
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print a file's contents
    Cat { path: String },
    /// Write contents to a file
    Write { path: String, contents: String },
    /// Copy a file, possibly across mounts
    Cp { from: String, to: String },
    /// Mirror a directory tree, possibly across mounts
    Mirror {
        from: String,
        to: String,
        /// Remove target entries absent from the origin
        #[arg(long)]
        delete: bool,
        /// Overwrite policy for existing target files
        #[arg(long, value_parser = ["always", "never", "newer"], default_value = "newer")]
        overwrite: String,
    },
    /// Print a stat record as JSON
    Stat {
        path: String,
        /// Suppress the diagnostic for missing paths
        #[arg(long)]
        quiet: bool,
    },
    /// Show mounted prefixes
    Mounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let router = Arc::new(Router::new());

    for spec in &args.mounts {
        let (prefix, dir) = spec
            .split_once('=')
            .with_context(|| format!("invalid mount spec (want PREFIX=DIR): {spec}"))?;
        if !std::path::Path::new(dir).is_dir() {
            bail!("mount location is not a directory: {dir}");
        }
        router.mount_path(prefix, dir).await?;
    }
    for prefix in &args.memory {
        router.mount(prefix.clone(), Arc::new(MemoryFs::new()))?;
    }

    match args.command {
        Command::Ls { path, recursive } => {
            let entries = router.list_dir(&path, recursive).await?;
            for entry in entries {
                let kind = if entry.kind.is_dir() { "d" } else { "-" };
                let modified: DateTime<Local> = entry.modified.into();
                let tag = entry.filesystem.as_deref().unwrap_or("-");
                println!(
                    "{} {:>10} {} {} [{}]",
                    kind,
                    entry.size,
                    modified.format("%Y-%m-%d %H:%M"),
                    entry.path,
                    tag
                );
            }
        }
        Command::Cat { path } => {
            let contents = router.read(&path).await?;
            let mut stdout = std::io::stdout();
            std::io::Write::write_all(&mut stdout, &contents)?;
        }
        Command::Write { path, contents } => {
            router.write(&path, contents.as_bytes()).await?;
        }
        Command::Cp { from, to } => {
            router.copy(&from, &to).await?;
        }
        Command::Mirror {
            from,
            to,
            delete,
            overwrite,
        } => {
            let overwrite = match overwrite.as_str() {
                "always" => Some(true),
                "never" => Some(false),
                _ => None,
            };
            let options = MirrorOptions::new().delete(delete).overwrite(overwrite);
            router.mirror(&from, &to, options).await?;
        }
        Command::Stat { path, quiet } => {
            let registry = Arc::new(ProtocolRegistry::new());
            for prefix in router.mounts() {
                registry.register(router.filesystem(&prefix)?, prefix, None);
            }
            let bridge = StreamBridge::new(registry);
            let flags = if quiet {
                StatFlags::quiet()
            } else {
                StatFlags::loud()
            };
            let record = bridge
                .stat_path(&path, flags, &CallContext::new())
                .await
                .with_context(|| format!("failed to stat {path}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Mounts => {
            for prefix in router.mounts() {
                println!("{prefix}");
            }
        }
    }

    Ok(())
}
