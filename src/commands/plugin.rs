// plugin.rs - Bot plugins
// A plugin is a directory with a plugin.json manifest and its own commands/
// tree. Commands imported from that tree keep a weak reference back to it.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::CommandError;

pub const PLUGIN_MANIFEST: &str = "plugin.json";
pub const PLUGIN_COMMANDS_DIR: &str = "commands";

#[derive(Debug, Deserialize)]
struct PluginManifest {
    id: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotPlugin {
    pub id: String,
    pub dir: PathBuf,
    pub capabilities: HashSet<String>,
}

impl BotPlugin {
    pub fn new(id: &str, dir: impl Into<PathBuf>, capabilities: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            dir: dir.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn commands_dir(&self) -> PathBuf {
        self.dir.join(PLUGIN_COMMANDS_DIR)
    }

    pub fn provides(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// First dependency this plugin cannot satisfy
    pub fn missing_dependency<'a>(&self, dependencies: &'a [String]) -> Option<&'a str> {
        dependencies
            .iter()
            .find(|dependency| !self.provides(dependency))
            .map(String::as_str)
    }
}

/// Read every `<dir>/<plugin>/plugin.json`. Broken manifests are logged and skipped.
pub async fn discover_plugins(dir: &Path) -> Vec<BotPlugin> {
    let mut plugins = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            log::info!("[PLUGINS] No plugins loaded from {}: {}", dir.display(), e);
            return plugins;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                log::warn!("[PLUGINS] Failed to list {}: {}", dir.display(), e);
                break;
            }
        };

        let plugin_dir = entry.path();
        if !plugin_dir.is_dir() {
            continue;
        }

        match load_plugin(&plugin_dir).await {
            Ok(plugin) => {
                log::info!("[PLUGINS] Found plugin '{}' at {}", plugin.id, plugin_dir.display());
                plugins.push(plugin);
            }
            Err(e) => log::error!("[PLUGINS] Skipping {}: {}", plugin_dir.display(), e),
        }
    }

    plugins.sort_by(|a, b| a.id.cmp(&b.id));
    plugins
}

async fn load_plugin(plugin_dir: &Path) -> Result<BotPlugin, CommandError> {
    let manifest_path = plugin_dir.join(PLUGIN_MANIFEST);
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|e| CommandError::io(&manifest_path, e))?;
    let manifest: PluginManifest =
        serde_json::from_str(&raw).map_err(|source| CommandError::Definition {
            path: manifest_path.clone(),
            source,
        })?;

    Ok(BotPlugin {
        id: manifest.id,
        dir: plugin_dir.to_path_buf(),
        capabilities: manifest.capabilities.into_iter().collect(),
    })
}
