use anyhow::{Context as _, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

// Well-known descriptor names, all relative to the host root. The emulator
// reads the first four and writes the runtime copies under `.env/`; the build
// and compile descriptors are rewritten in place.
pub const BUILD_DESCRIPTOR: &str = "angular.json";
pub const COMPILE_DESCRIPTOR: &str = "tsconfig.emulator.json";
pub const ENVIRONMENT: &str = ".env/environment.json";
pub const PROXY: &str = ".env/proxy.conf.json";
pub const ENVIRONMENT_RUNTIME: &str = ".env/environment.runtime.json";
pub const PROXY_RUNTIME: &str = ".env/proxy.conf.runtime.json";
pub const PLUGIN_REGISTRY: &str = ".env/plugins.json";

/// Loads a JSON descriptor. A missing file is absent configuration, not an
/// error; unreadable or unparsable content is.
pub fn load_json(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Writes a descriptor pretty-printed (two-space indent), creating parent
/// directories as needed. Key order is whatever the value carries.
pub fn store_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let loaded = load_json(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_json(&path).is_err());
    }

    #[test]
    fn store_creates_parent_dirs_and_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env").join("environment.runtime.json");
        let value = json!({"zebra": 1, "alpha": {"nested": true}});
        store_json(&path, &value).unwrap();
        let loaded = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn rewrite_preserves_key_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("angular.json");
        fs::write(&path, r#"{"zulu": 1, "alpha": 2, "mike": 3}"#).unwrap();
        let value = load_json(&path).unwrap().unwrap();
        store_json(&path, &value).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let positions: Vec<usize> = ["zulu", "alpha", "mike"]
            .iter()
            .map(|k| text.find(k).unwrap())
            .collect();
        assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    }
}
