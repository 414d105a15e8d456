//! Command-line interface for objfile
//!
//! # Usage Examples
//!
//! ```bash
//! # Upload through a MinIO endpoint with 8 MiB parts
//! objfile --endpoint-url http://localhost:9000 --force-path-style \
//!   --part-size 8388608 \
//!   put ./events.parquet s3://lake/events.parquet
//!
//! # Copy between two objects
//! objfile get s3://lake/events.parquet s3://backup/events.parquet
//!
//! # Read 4 bytes at offset 1024
//! objfile cat s3://lake/events.parquet --offset 1024 --length 4
//! ```
//!
//! Set `RUST_LOG=debug` to see every ranged request and uploaded part.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use objfile::{ByteWindow, Location, Objfile, S3Opts};
use objfile_s3::{AwsObjectStore, OperationContext};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "objfile")]
#[command(about = "Copy, inspect and range-read S3 objects")]
#[command(long_about = None)]
struct Cli {
    #[command(flatten)]
    s3_opts: S3Opts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file to an object
    Put {
        /// Local file to read
        local: String,

        /// Destination URI (s3://bucket/key)
        uri: String,
    },

    /// Download an object to a local file (or another object)
    Get {
        /// Source URI (s3://bucket/key)
        uri: String,

        /// Destination path or URI
        local: String,
    },

    /// Print a byte range of an object to stdout
    Cat {
        /// Source URI (s3://bucket/key) or local path
        uri: String,

        /// Byte offset to start at
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Maximum number of bytes to print
        #[arg(long)]
        length: Option<u64>,

        /// Count the offset back from the end of the object
        #[arg(long)]
        from_end: bool,
    },

    /// Print the size of an object
    Stat {
        /// Object URI (s3://bucket/key)
        uri: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = cli.s3_opts.to_config()?;
    let store = AwsObjectStore::from_config(&config)
        .await
        .context("Failed to create S3 client")?;

    let cancel = CancellationToken::new();
    let ctx =
        OperationContext::with_cancellation(tokio::runtime::Handle::current(), cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight requests");
            cancel.cancel();
        }
    });

    let objfile = Objfile::new(Arc::new(store), ctx);

    // File handles block on the runtime, so they run on a blocking thread
    tokio::task::spawn_blocking(move || run_command(&objfile, cli.command))
        .await
        .context("Command task panicked")?
}

fn run_command(objfile: &Objfile, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Put { local, uri } => {
            let from = Location::Local(local.into());
            let to = Location::parse(&uri)?;
            objfile.copy(&from, &to)?;
        }
        Commands::Get { uri, local } => {
            let from = Location::parse(&uri)?;
            let to = Location::parse(&local)?;
            objfile.copy(&from, &to)?;
        }
        Commands::Cat {
            uri,
            offset,
            length,
            from_end,
        } => {
            let from = Location::parse(&uri)?;
            let window = ByteWindow {
                offset,
                length,
                from_end,
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            objfile.cat(&from, window, &mut out)?;
            std::io::Write::flush(&mut out)?;
        }
        Commands::Stat { uri } => {
            let Location::S3 { bucket, key } = Location::parse(&uri)? else {
                anyhow::bail!("stat expects an s3:// URI, got {uri}");
            };
            match objfile.stat(&bucket, &key) {
                Some(size) => println!("{size}"),
                None => anyhow::bail!("Could not determine the size of {uri}"),
            }
        }
    }
    Ok(())
}
