use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::descriptor;
use crate::discover::DiscoveredModule;

/// One persisted entry of `.env/plugins.json`, the list the host app reads
/// at start-up to know which plugin modules to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRegistration {
    /// Display label, the exported symbol name.
    pub label: String,
    /// Plugin source root relative to the host root.
    pub root: String,
    /// `<file>#<symbol>`.
    pub module: String,
    /// Static asset folder relative to the plugins root.
    pub assets_path: String,
}

impl PluginRegistration {
    pub fn from_module(pm: &DiscoveredModule) -> Self {
        Self {
            label: pm.module.clone(),
            root: pm.root(),
            module: format!("{}#{}", pm.file, pm.module),
            assets_path: format!("{}/public/assets", pm.src_root),
        }
    }

    /// Symbol half of `module`. Not validated: a value without `#` yields an
    /// empty string.
    pub fn path(&self) -> &str {
        self.module.split('#').nth(1).unwrap_or("")
    }
}

/// Reads the registration list back from `<host_root>/.env/plugins.json`.
pub fn load_registrations(host_root: &Path) -> Result<Vec<PluginRegistration>> {
    let path = host_root.join(descriptor::PLUGIN_REGISTRY);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let list = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(list)
}
