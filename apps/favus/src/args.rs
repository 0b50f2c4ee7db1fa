use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Favus - reliable multipart uploads to S3-compatible stores.
#[derive(Debug, Parser)]
#[command(name = "favus", version, about)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a file using a multipart session.
    Upload {
        /// Local file to upload.
        #[arg(short, long)]
        file: PathBuf,
        /// Target bucket (falls back to config, env, then a prompt).
        #[arg(short, long)]
        bucket: Option<String>,
        /// Object key (falls back to config, then a prompt).
        #[arg(short, long)]
        key: Option<String>,
        /// Gzip the file to a temp copy before uploading.
        #[arg(long)]
        compress: bool,
    },

    /// Resume an interrupted multipart session from its status file.
    Resume {
        /// Status file written during the original upload.
        #[arg(long, value_name = "PATH")]
        status_file: Option<PathBuf>,
        /// Original file path, used with --upload-id to derive the
        /// status file location.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Upload id of the interrupted session.
        #[arg(short = 'u', long)]
        upload_id: Option<String>,
    },

    /// Delete an object from the bucket.
    Delete {
        #[arg(short, long)]
        bucket: Option<String>,
        #[arg(short, long)]
        key: Option<String>,
    },

    /// List in-progress multipart sessions in the bucket.
    LsUploads {
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Abort every in-progress multipart session in the bucket.
    KillOrphans {
        #[arg(short, long)]
        bucket: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List objects in the bucket.
    LsObjects {
        #[arg(short, long)]
        bucket: Option<String>,
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Run the local event bridge agent in the foreground.
    Ui {
        /// Loopback address to serve on.
        #[arg(long, default_value = favus_protocol::DEFAULT_AGENT_ADDR)]
        addr: String,
        /// Upstream WebSocket endpoint (or FAVUS_WS_ENDPOINT).
        #[arg(long)]
        ws_endpoint: Option<String>,
        /// API key for the upstream (or FAVUS_WS_API_KEY).
        #[arg(long)]
        api_key: Option<String>,
    },
}
