use std::path::Path;

use aline_media::check_ffmpeg;
use aline_models::LabelMapping;
use aline_worker::{ChannelMean, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "aline-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("aline-selfcheck: ffmpeg at {}", ffmpeg.display());

    let labels = LabelMapping::from_file(&config.label_mapping_path).map_err(|e| {
        anyhow::anyhow!(
            "label mapping {} unusable: {}",
            config.label_mapping_path.display(),
            e
        )
    })?;
    println!("aline-selfcheck: {} labels", labels.len());

    if let Some(path) = &config.channel_mean_path {
        let mean = ChannelMean::from_file(path).map_err(|e| anyhow::anyhow!("{}", e))?;
        println!("aline-selfcheck: channel mean {:?}", mean.0);
    }

    println!("aline-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let marker = path.join(".selfcheck");
    tokio::fs::write(&marker, b"ok").await?;
    tokio::fs::remove_file(&marker).await?;
    Ok(())
}
