use anyhow::{Context as _, Result};
use serde_json::Value;
use std::path::Path;

use crate::descriptor;

/// Module entry point of one plugin folder, as declared by that folder's own
/// build descriptor. Values are descriptor-style relative paths (forward
/// slashes), not filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredModule {
    /// Path under the host root containing all plugin folders.
    pub plugins_root: String,
    /// Plugin folder with `/src` appended, e.g. `myplugin/src`.
    pub src_root: String,
    /// Module file relative to the project source prefix, extension stripped.
    pub file: String,
    /// Exported symbol name.
    pub module: String,
}

impl DiscoveredModule {
    /// Plugin source root relative to the host root.
    pub fn root(&self) -> String {
        format!("{}/{}", self.plugins_root, self.src_root)
    }
}

/// Resolves a plugin folder to its module entry point.
///
/// Reads `<host_root>/<plugins_root>/<folder>/angular.json`, follows the
/// declared default project to its `architect.build.options.modulePath`
/// (shaped `<prefix>/<file>#<symbol>`), drops the fixed project-source
/// prefix, and splits file from symbol. No check that the module file
/// actually exists.
pub fn discover_module(
    host_root: &Path,
    plugins_root: &str,
    folder: &str,
) -> Result<DiscoveredModule> {
    let descriptor_path = host_root
        .join(plugins_root)
        .join(folder)
        .join(descriptor::BUILD_DESCRIPTOR);
    let build = descriptor::load_json(&descriptor_path)?
        .with_context(|| format!("{folder}: no build descriptor at {}", descriptor_path.display()))?;

    let default_project = build
        .get("defaultProject")
        .and_then(Value::as_str)
        .with_context(|| format!("{folder}: build descriptor declares no default project"))?;

    let module_path = build
        .get("projects")
        .and_then(|v| v.get(default_project))
        .and_then(|v| v.get("architect"))
        .and_then(|v| v.get("build"))
        .and_then(|v| v.get("options"))
        .and_then(|v| v.get("modulePath"))
        .and_then(Value::as_str)
        .with_context(|| {
            format!("{folder}: project '{default_project}' has no architect.build.options.modulePath")
        })?;

    // Drop the fixed project-source prefix (first path segment).
    let mut tokens = module_path.split('/');
    tokens.next();
    let remainder = tokens.collect::<Vec<_>>().join("/");

    let (file, symbol) = remainder.split_once('#').with_context(|| {
        format!("{folder}: modulePath '{module_path}' has no '#<symbol>' suffix")
    })?;

    Ok(DiscoveredModule {
        plugins_root: plugins_root.to_string(),
        src_root: format!("{folder}/src"),
        file: strip_extension(file),
        module: symbol.to_string(),
    })
}

/// Removes one trailing extension from the final path segment, if any.
fn strip_extension(file: &str) -> String {
    let segment_start = file.rfind('/').map(|i| i + 1).unwrap_or(0);
    match file[segment_start..].rfind('.') {
        Some(dot) => file[..segment_start + dot].to_string(),
        None => file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::descriptor::store_json;

    fn write_plugin_descriptor(host_root: &Path, folder: &str, module_path: &str) {
        let build = json!({
            "defaultProject": "plugin",
            "projects": {
                "plugin": {
                    "architect": {
                        "build": { "options": { "modulePath": module_path } }
                    }
                }
            }
        });
        let path = host_root
            .join("packages")
            .join(folder)
            .join("angular.json");
        store_json(&path, &build).unwrap();
    }

    #[test]
    fn resolves_module_entry_point() {
        let dir = tempdir().unwrap();
        write_plugin_descriptor(dir.path(), "myplugin", "src/app/plugin.module#PluginModule");

        let discovered = discover_module(dir.path(), "packages", "myplugin").unwrap();
        assert_eq!(
            discovered,
            DiscoveredModule {
                plugins_root: "packages".to_string(),
                src_root: "myplugin/src".to_string(),
                file: "app/plugin".to_string(),
                module: "PluginModule".to_string(),
            }
        );
        assert_eq!(discovered.root(), "packages/myplugin/src");
    }

    #[test]
    fn strips_source_extension() {
        let dir = tempdir().unwrap();
        write_plugin_descriptor(dir.path(), "alpha", "src/main.ts#MainModule");

        let discovered = discover_module(dir.path(), "packages", "alpha").unwrap();
        assert_eq!(discovered.file, "main");
        assert_eq!(discovered.module, "MainModule");
    }

    #[test]
    fn keeps_dotless_file_untouched() {
        let dir = tempdir().unwrap();
        write_plugin_descriptor(dir.path(), "alpha", "src/app/plugin#PluginModule");

        let discovered = discover_module(dir.path(), "packages", "alpha").unwrap();
        assert_eq!(discovered.file, "app/plugin");
    }

    #[test]
    fn missing_symbol_separator_is_an_error() {
        let dir = tempdir().unwrap();
        write_plugin_descriptor(dir.path(), "alpha", "src/app/plugin.module");

        let err = discover_module(dir.path(), "packages", "alpha").unwrap_err();
        assert!(err.to_string().contains("no '#<symbol>'"));
    }

    #[test]
    fn missing_descriptor_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(discover_module(dir.path(), "packages", "ghost").is_err());
    }

    #[test]
    fn missing_default_project_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("packages/alpha/angular.json");
        store_json(&path, &json!({ "projects": {} })).unwrap();

        let err = discover_module(dir.path(), "packages", "alpha").unwrap_err();
        assert!(err.to_string().contains("default project"));
    }
}
