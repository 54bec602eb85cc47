//! Application state for the preview server

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::compiler::TypstCompiler;

/// Settings needed to build [`AppState`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub typst_bin: PathBuf,
    pub work_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub timeout_ms: u64,
    pub max_upload_bytes: usize,
}

pub struct AppState {
    pub compiler: TypstCompiler,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build the state, creating the upload directory if it is missing.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create upload directory {}",
                    config.upload_dir.display()
                )
            })?;

        tracing::info!("Upload directory: {}", config.upload_dir.display());

        let compiler = TypstCompiler::new(config.typst_bin, &config.work_dir, config.timeout_ms);
        tracing::info!(
            "Compiling {} -> {}",
            compiler.source_path().display(),
            compiler.output_path().display()
        );

        Ok(Self {
            compiler,
            upload_dir: config.upload_dir,
            static_dir: config.static_dir,
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}
