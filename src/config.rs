// src/config.rs

/// Optional `perigee.toml` next to the host descriptors. CLI flags win over
/// anything set here.
pub const FILE_NAME: &str = "perigee.toml";

#[derive(Debug, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct EmulatorConfig {
    /// Relative path under the host root containing the plugin folders.
    pub plugins_root: Option<String>,

    /// Plugin folders to register, in registration order.
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Control-plane endpoint to proxy to, when not taken from the active
    /// auth profile.
    pub endpoint: Option<String>,
}

impl Config {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(&path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// Loads `perigee.toml` from `dir`; a missing file is an empty config.
    pub fn load_from_dir<P: AsRef<std::path::Path>>(dir: P) -> anyhow::Result<Self> {
        let path = dir.as_ref().join(FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(path)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn loads_emulator_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(
            &path,
            r#"
[emulator]
plugins_root = "packages"
plugins = ["alpha", "beta"]
"#,
        )
        .unwrap();

        let cfg = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(cfg.emulator.plugins_root.as_deref(), Some("packages"));
        assert_eq!(cfg.emulator.plugins, vec!["alpha", "beta"]);
        assert_eq!(cfg.emulator.endpoint, None);
    }

    #[test]
    fn missing_file_is_empty_config() {
        let dir = tempdir().unwrap();
        let cfg = Config::load_from_dir(dir.path()).unwrap();
        assert!(cfg.emulator.plugins.is_empty());
        assert_eq!(cfg.emulator.plugins_root, None);
    }
}
