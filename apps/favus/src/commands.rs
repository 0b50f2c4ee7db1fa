//! Subcommand implementations over the uploader engine and the agent.

use std::path::PathBuf;

use anyhow::{bail, Context};

use favus_agent::{Agent, AgentConfig};
use favus_status::status_file_path;
use favus_uploader::{new_client, Config, Uploader};

use crate::args::{Cli, Command};
use crate::{progress, prompt};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Upload {
            file,
            bucket,
            key,
            compress,
        } => upload(config, file, bucket, key, compress).await,
        Command::Resume {
            status_file,
            file,
            upload_id,
        } => resume(config, status_file, file, upload_id).await,
        Command::Delete { bucket, key } => delete(config, bucket, key).await,
        Command::LsUploads { bucket } => ls_uploads(config, bucket).await,
        Command::KillOrphans { bucket, yes } => kill_orphans(config, bucket, yes).await,
        Command::LsObjects { bucket, prefix } => ls_objects(config, bucket, prefix).await,
        Command::Ui {
            addr,
            ws_endpoint,
            api_key,
        } => ui(addr, ws_endpoint, api_key).await,
    }
}

/// File → env overlay. Flag and prompt layers are applied per command.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env_overlay();
    Ok(config)
}

fn resolve_bucket(config: &mut Config, flag: Option<String>) -> anyhow::Result<()> {
    if let Some(bucket) = flag {
        config.bucket = bucket;
    }
    if config.bucket.trim().is_empty() {
        config.bucket = prompt::required("Enter S3 bucket name")?;
    }
    Ok(())
}

async fn build_uploader(config: Config) -> Uploader {
    let client = new_client(&config.region).await;
    Uploader::new(client, config)
}

/// Wires Ctrl-C to the engine's cancellation token.
fn wire_ctrl_c(uploader: &Uploader) {
    let cancel = uploader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, cancelling upload");
            cancel.cancel();
        }
    });
}

async fn upload(
    mut config: Config,
    file: PathBuf,
    bucket: Option<String>,
    key: Option<String>,
    compress: bool,
) -> anyhow::Result<()> {
    resolve_bucket(&mut config, bucket)?;
    if let Some(key) = key {
        config.key = key;
    }
    if config.key.trim().is_empty() {
        config.key = prompt::required("Enter S3 object key")?;
    }
    config.compress |= compress;

    if !file.exists() {
        bail!("file not found: {}", file.display());
    }

    let key = config.key.clone();
    let bucket = config.bucket.clone();
    let mut uploader = build_uploader(config).await;
    wire_ctrl_c(&uploader);

    let bars = uploader
        .take_events()
        .map(|rx| tokio::spawn(progress::render(rx)));

    let result = uploader.upload_file(&file, &key).await;
    if let Some(handle) = bars {
        let _ = handle.await;
    }
    result?;

    println!("uploaded {} to s3://{bucket}/{key}", file.display());
    Ok(())
}

async fn resume(
    config: Config,
    status_file: Option<PathBuf>,
    file: Option<PathBuf>,
    upload_id: Option<String>,
) -> anyhow::Result<()> {
    let status_path = match status_file {
        Some(path) => path,
        None => {
            let file = match file {
                Some(f) => f,
                None => bail!("either --status-file or --file with --upload-id is required"),
            };
            let upload_id = match upload_id.or_else(|| config.upload_id.clone()) {
                Some(id) => id,
                None => prompt::required("Enter upload id")?,
            };
            status_file_path(&std::env::temp_dir(), &file, &upload_id)
        }
    };
    if !status_path.exists() {
        bail!("status file not found: {}", status_path.display());
    }

    let mut uploader = build_uploader(config).await;
    wire_ctrl_c(&uploader);

    let bars = uploader
        .take_events()
        .map(|rx| tokio::spawn(progress::render(rx)));

    let result = uploader.resume(&status_path).await;
    if let Some(handle) = bars {
        let _ = handle.await;
    }
    result?;

    println!("resume completed");
    Ok(())
}

async fn delete(
    mut config: Config,
    bucket: Option<String>,
    key: Option<String>,
) -> anyhow::Result<()> {
    resolve_bucket(&mut config, bucket)?;
    let key = match key {
        Some(k) => k,
        None => prompt::required("Enter S3 object key")?,
    };
    let bucket = config.bucket.clone();
    let uploader = build_uploader(config).await;
    uploader.delete_object(&key).await?;
    println!("deleted s3://{bucket}/{key}");
    Ok(())
}

async fn ls_uploads(mut config: Config, bucket: Option<String>) -> anyhow::Result<()> {
    resolve_bucket(&mut config, bucket)?;
    let uploader = build_uploader(config).await;
    let uploads = uploader.list_in_progress().await?;
    if uploads.is_empty() {
        println!("no in-progress multipart uploads");
        return Ok(());
    }
    for upload in uploads {
        println!(
            "{}\t{}\t{}",
            upload.key,
            upload.upload_id,
            upload.initiated.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn kill_orphans(mut config: Config, bucket: Option<String>, yes: bool) -> anyhow::Result<()> {
    resolve_bucket(&mut config, bucket)?;
    let uploader = build_uploader(config).await;

    let uploads = uploader.list_in_progress().await?;
    if uploads.is_empty() {
        println!("no in-progress multipart uploads");
        return Ok(());
    }
    println!("found {} in-progress upload(s)", uploads.len());
    if !yes && !prompt::confirm("abort all of them?", false)? {
        println!("aborted nothing");
        return Ok(());
    }

    let aborted = uploader.abort_orphans().await?;
    println!("aborted {aborted} upload(s)");
    Ok(())
}

async fn ls_objects(
    mut config: Config,
    bucket: Option<String>,
    prefix: Option<String>,
) -> anyhow::Result<()> {
    resolve_bucket(&mut config, bucket)?;
    let uploader = build_uploader(config).await;
    let objects = uploader.list_objects(prefix.as_deref()).await?;
    if objects.is_empty() {
        println!("no objects found");
        return Ok(());
    }
    for object in objects {
        println!(
            "{:>12}  {}  {}",
            object.size,
            object.last_modified.as_deref().unwrap_or("-"),
            object.key
        );
    }
    Ok(())
}

async fn ui(
    addr: String,
    ws_endpoint: Option<String>,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let ws_endpoint = ws_endpoint
        .or_else(|| std::env::var("FAVUS_WS_ENDPOINT").ok())
        .filter(|v| !v.trim().is_empty());
    let Some(ws_endpoint) = ws_endpoint else {
        bail!("an upstream endpoint is required: pass --ws-endpoint or set FAVUS_WS_ENDPOINT");
    };
    let api_key = api_key
        .or_else(|| std::env::var("FAVUS_WS_API_KEY").ok())
        .unwrap_or_default();

    let agent = Agent::start(AgentConfig {
        addr,
        ws_endpoint,
        api_key,
    })
    .await?;
    println!("agent listening on {}", agent.local_addr());

    tokio::select! {
        _ = agent.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            agent.stop().await;
        }
    }
    println!("agent stopped");
    Ok(())
}
