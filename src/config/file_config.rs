use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub log_level: Option<String>,

    // Feature configs
    pub pipeline: Option<PipelineConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub default_ttl_secs: Option<u64>,
    pub restore_window_secs: Option<u64>,
    pub restore_delay_ms: Option<u64>,
    pub boot_restore_delay_secs: Option<u64>,
    pub max_restore_count: Option<usize>,
    pub max_shade_notifications: Option<usize>,
    pub foreground_timeout_ms: Option<u64>,
    pub scheduled_work_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
