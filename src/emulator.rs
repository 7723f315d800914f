use anyhow::{Context as _, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::info;

use crate::descriptor;
use crate::discover::{discover_module, DiscoveredModule};
use crate::plugins::PluginRegistration;

// Fixed head entries written into the build and compile descriptors.
const FAVICON_ASSET: &str = "node_modules/@perigee/host/src/favicon.ico";
const RUNTIME_CONFIG_GLOB: &str = ".env/*.json";
const HOST_SOURCE_GLOB: &str = "node_modules/@perigee/host/src/**/*.ts";

const DEV_SERVER_TOOL: &str = "ng";

/// Inputs for one synthesis run.
#[derive(Debug, Clone)]
pub struct ServeSpec {
    pub host_root: PathBuf,
    /// Relative path under the host root containing the plugin folders.
    pub plugins_root: String,
    /// Plugin folders in registration order.
    pub folders: Vec<String>,
    pub token: String,
    /// Control-plane endpoint every proxy route is pointed at.
    pub endpoint: String,
}

/// How far the mutation phase got before persistence ran.
#[derive(Debug)]
pub enum Outcome {
    Full,
    Partial { cause: anyhow::Error },
}

impl Outcome {
    pub fn is_full(&self) -> bool {
        matches!(self, Outcome::Full)
    }
}

#[derive(Debug)]
pub struct Synthesis {
    pub outcome: Outcome,
    /// What went into `.env/plugins.json`; empty when discovery never ran
    /// or failed.
    pub registrations: Vec<PluginRegistration>,
}

/// Rewrites the host configuration to register the given plugins and point
/// the dev proxy at the control plane.
///
/// The mutation phase may stop early (missing descriptor, bad plugin
/// folder); whatever state exists by then is still persisted, so the host
/// files are never left half-written. The caller inspects `outcome` to
/// decide what to do about a partial run. Only unreadable input JSON and
/// persistence failures are errors.
pub fn synthesize(spec: &ServeSpec) -> Result<Synthesis> {
    let root = &spec.host_root;
    let mut build = descriptor::load_json(&root.join(descriptor::BUILD_DESCRIPTOR))?;
    let mut compile = descriptor::load_json(&root.join(descriptor::COMPILE_DESCRIPTOR))?;
    let mut environment = descriptor::load_json(&root.join(descriptor::ENVIRONMENT))?;
    let mut proxy = descriptor::load_json(&root.join(descriptor::PROXY))?;

    let mut registrations = Vec::new();
    let outcome = match mutate(
        spec,
        &mut build,
        &mut compile,
        &mut environment,
        &mut proxy,
        &mut registrations,
    ) {
        Ok(()) => Outcome::Full,
        Err(cause) => Outcome::Partial { cause },
    };

    // Persist unconditionally, in this order.
    store_maybe(&root.join(descriptor::ENVIRONMENT_RUNTIME), &environment)?;
    store_maybe(&root.join(descriptor::PROXY_RUNTIME), &proxy)?;
    descriptor::store_json(
        &root.join(descriptor::PLUGIN_REGISTRY),
        &serde_json::to_value(&registrations)?,
    )?;
    store_maybe(&root.join(descriptor::BUILD_DESCRIPTOR), &build)?;
    store_maybe(&root.join(descriptor::COMPILE_DESCRIPTOR), &compile)?;

    Ok(Synthesis {
        outcome,
        registrations,
    })
}

fn mutate(
    spec: &ServeSpec,
    build: &mut Option<Value>,
    compile: &mut Option<Value>,
    environment: &mut Option<Value>,
    proxy: &mut Option<Value>,
    registrations: &mut Vec<PluginRegistration>,
) -> Result<()> {
    info!("setting auth token");
    let environment = environment
        .as_mut()
        .context("no runtime environment descriptor")?
        .as_object_mut()
        .context("runtime environment descriptor is not an object")?;
    environment.insert(
        "credentials".to_string(),
        json!({ "token": format!("Bearer {}", spec.token) }),
    );

    info!("updating proxy targets");
    let proxy = proxy
        .as_mut()
        .context("no dev-proxy descriptor")?
        .as_object_mut()
        .context("dev-proxy descriptor is not an object")?;
    for (route, entry) in proxy.iter_mut() {
        entry
            .as_object_mut()
            .with_context(|| format!("proxy entry '{route}' is not an object"))?
            .insert("target".to_string(), Value::String(spec.endpoint.clone()));
    }

    info!("discovering plugin modules");
    let modules: Vec<DiscoveredModule> = spec
        .folders
        .iter()
        .map(|folder| discover_module(&spec.host_root, &spec.plugins_root, folder))
        .collect::<Result<_>>()?;
    *registrations = modules.iter().map(PluginRegistration::from_module).collect();

    info!("updating build descriptor");
    let options = build
        .as_mut()
        .context("no host build descriptor")?
        .pointer_mut("/projects/emulator/architect/build/options")
        .context("host build descriptor has no emulator build options")?
        .as_object_mut()
        .context("emulator build options are not an object")?;

    let mut assets = vec![Value::String(FAVICON_ASSET.to_string())];
    assets.extend(modules.iter().map(|pm| {
        json!({
            "glob": "**/*",
            "input": format!("./{}/public", pm.root()),
            "output": format!("/{}/public", pm.src_root),
        })
    }));
    options.insert("assets".to_string(), Value::Array(assets));

    let lazy: Vec<Value> = modules
        .iter()
        .map(|pm| Value::String(format!("{}/{}", pm.root(), pm.file)))
        .collect();
    options.insert("lazyModules".to_string(), Value::Array(lazy));

    info!("updating compile includes");
    let compile = compile
        .as_mut()
        .context("no compile descriptor")?
        .as_object_mut()
        .context("compile descriptor is not an object")?;
    let mut include = vec![
        Value::String(RUNTIME_CONFIG_GLOB.to_string()),
        Value::String(HOST_SOURCE_GLOB.to_string()),
    ];
    include.extend(
        modules
            .iter()
            .map(|pm| Value::String(format!("{}/**/*.ts", pm.root()))),
    );
    compile.insert("include".to_string(), Value::Array(include));

    Ok(())
}

/// A descriptor that never loaded persists as JSON `null`.
fn store_maybe(path: &Path, value: &Option<Value>) -> Result<()> {
    descriptor::store_json(path, value.as_ref().unwrap_or(&Value::Null))
}

// ---------- dev server ----------

/// Running dev-server child with inherited stdio. Dropping the handle leaves
/// the server running.
#[derive(Debug)]
pub struct DevServer {
    child: Child,
}

impl DevServer {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Blocks until the server exits.
    pub fn wait(mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().context("failed to wait for dev server")
    }
}

/// Spawns `ng serve <extra_args..>` in the host root.
pub fn launch_dev_server(host_root: &Path, extra_args: &[String]) -> Result<DevServer> {
    spawn_dev_server(DEV_SERVER_TOOL, host_root, extra_args)
}

fn spawn_dev_server(tool: &str, host_root: &Path, extra_args: &[String]) -> Result<DevServer> {
    let child = Command::new(tool)
        .arg("serve")
        .args(extra_args)
        .current_dir(host_root)
        .spawn()
        .with_context(|| format!("failed to launch '{tool} serve' in {}", host_root.display()))?;
    info!(pid = child.id(), "dev server started");
    Ok(DevServer { child })
}
