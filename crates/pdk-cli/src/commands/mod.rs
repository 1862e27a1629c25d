//! CLI command implementations.

pub mod run;
pub mod validate;

use std::path::Path;

use pdk_config::SystemConfig;

/// Loads the system config from `path` if given, falling back to built-in
/// defaults. Parsing config files, merging multiple sources, and env
/// overlays are an external collaborator's job (SPEC_FULL.md §1 Non-goals);
/// this only deserializes a single JSON document.
pub(crate) fn load_system_config(path: Option<&str>) -> anyhow::Result<SystemConfig> {
    match path {
        None => Ok(SystemConfig::default()),
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path, e))?;
            let config: SystemConfig = serde_json::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path, e))?;
            Ok(config)
        }
    }
}

/// Loads a fully-resolved [`pdk_core::pipeline::Pipeline`] from `path`.
///
/// The two provider YAML parsers are an external collaborator
/// (SPEC_FULL.md §1 Non-goals); this crate only consumes their output,
/// which we take as a JSON document matching `Pipeline`'s own shape —
/// the same contract a real parser binary would hand off over a pipe.
pub(crate) fn load_pipeline(path: impl AsRef<Path>) -> anyhow::Result<pdk_core::pipeline::Pipeline> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read pipeline file {}: {}", path.display(), e))?;
    let pipeline = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse pipeline file {}: {}", path.display(), e))?;
    Ok(pipeline)
}
