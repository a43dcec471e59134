#[cfg(test)]
#[path = "../tests/unit/config_loader_test.rs"]
mod config_loader_test;

use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path};

/// Dense checkpoint description read from `config.json`.
///
/// The vocabulary is fixed by the byte-level tokenizer (see
/// [`crate::model_exporter`]), so only the network dimensions are
/// configurable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExportConfig {
    pub dim: usize,
    pub hidden_dim: usize,
    pub n_layers: usize,
}

/// Loads the conversion configuration from `config.json` in the model dir.
pub fn load_export_config(model_dir: &Path) -> Result<ExportConfig> {
    let config_path = model_dir.join("config.json");
    let mut file = File::open(&config_path)
        .with_context(|| format!("Failed to open config.json at {}", config_path.display()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let config: ExportConfig = serde_json::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("Failed to parse config.json: {}", err))?;

    if config.dim == 0 || config.hidden_dim == 0 || config.n_layers == 0 {
        anyhow::bail!("Invalid model configuration: all dimensions must be positive: {config:?}");
    }

    info!("Model configuration loaded:");
    info!("   • Dimensions: {}", config.dim);
    info!("   • Hidden dimensions: {}", config.hidden_dim);
    info!("   • Layers: {}", config.n_layers);

    Ok(config)
}
