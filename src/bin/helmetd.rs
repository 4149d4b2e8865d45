//! helmetd - helmet compliance analysis service
//!
//! This daemon:
//! 1. Loads the detector once at startup
//! 2. Serves the analysis API
//! 3. Stores produced videos under the configured video directory

use anyhow::{anyhow, Context, Result};
use std::sync::{mpsc, Arc};

use helmet_watch::{
    api::{ApiConfig, ApiServer},
    build_backend, FileMedia, HelmetdConfig, VideoAnalyzer,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = HelmetdConfig::load()?;
    std::fs::create_dir_all(&config.video_dir).with_context(|| {
        format!("create video directory {}", config.video_dir.display())
    })?;

    let detector = build_backend(&config.detector)?;
    let analyzer = Arc::new(VideoAnalyzer::new(
        detector,
        Arc::new(FileMedia),
        config.video_dir.clone(),
    ));

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_upload_bytes: config.max_upload_bytes,
        jpeg_quality: config.jpeg_quality,
    };
    let api_handle = ApiServer::new(api_config, analyzer).spawn()?;
    log::info!("helmet api listening on {}", api_handle.addr);
    log::info!(
        "helmetd running. videos stored in {}",
        config.video_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("helmetd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
