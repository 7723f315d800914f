use anyhow::Result;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::descriptor;

const LOCK_MANIFEST: &str = "package-lock.json";
const EXCLUDED_DIRS: [&str; 4] = [".git", ".idea", "node_modules", "dist"];

pub const DEFAULT_REPORT: &str = "provenance.json";

/// Resolved-URL accumulator: deduplicating, first-encounter ordered.
#[derive(Debug, Default)]
pub struct ResolvedUrls {
    seen: HashSet<String>,
    order: Vec<String>,
}

impl ResolvedUrls {
    pub fn insert(&mut self, url: String) {
        if self.seen.insert(url.clone()) {
            self.order.push(url);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Walks `root` and collects every `resolved` URL from every lock manifest.
///
/// Unreadable entries and unparsable manifests truncate their own branch
/// only; the rest of the walk continues.
pub fn collect_resolved_urls(root: &Path) -> ResolvedUrls {
    let mut urls = ResolvedUrls::default();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !(entry.file_type().is_dir() && is_excluded(entry.file_name()))
    });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name() != LOCK_MANIFEST {
            continue;
        }
        if let Err(err) = collect_manifest(entry.path(), &mut urls) {
            warn!("skipping {}: {err:#}", entry.path().display());
        }
    }
    urls
}

fn is_excluded(name: &std::ffi::OsStr) -> bool {
    EXCLUDED_DIRS.iter().any(|dir| name == *dir)
}

fn collect_manifest(path: &Path, urls: &mut ResolvedUrls) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let manifest: Value = serde_json::from_str(&text)?;
    let Some(dependencies) = manifest.get("dependencies").and_then(Value::as_object) else {
        return Ok(());
    };
    for dep in dependencies.values() {
        if let Some(resolved) = dep.get("resolved").and_then(Value::as_str) {
            urls.insert(resolved.to_string());
        }
    }
    Ok(())
}

/// Groups URLs by host. Hosts come out sorted; paths within a host keep
/// first-encounter order.
///
/// A path is the whole URL suffix starting at the first occurrence of the
/// host token, not just the path component.
// TODO: confirm with the report consumers whether the suffix should start at
// the authority instead when the host token also appears earlier in the URL.
pub fn group_by_host(urls: &ResolvedUrls) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for url in urls.iter() {
        let Some(host) = url_host(url) else {
            warn!("skipping unparsable url: {url}");
            continue;
        };
        let suffix = match url.find(&host) {
            Some(idx) => url[idx..].to_string(),
            None => url.to_string(),
        };
        groups.entry(host).or_default().push(suffix);
    }
    groups
}

/// WHATWG host of a URL: domain or IP literal, userinfo excluded, a
/// non-default port kept.
fn url_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Fixed-schema provenance document over the grouped URLs. The identity
/// fields are static; only `artifact_repositories` varies.
pub fn build_report(groups: &BTreeMap<String, Vec<String>>) -> Value {
    let artifact_repositories: Vec<Value> = groups
        .iter()
        .map(|(host, paths)| {
            json!({
                "content": "binary",
                "protocol": "https",
                "host": host,
                "paths": paths,
            })
        })
        .collect();

    json!({
        "id": "perigee-ui-plugins",
        "root": "latest",
        "all-components": {
            "name": "ui-plugins",
            "version": env!("CARGO_PKG_VERSION"),
            "source_repositories": [{
                "content": "source",
                "protocol": "git",
                "url": "https://github.com/orbyts/perigee.git",
                "branch": "main",
            }],
            "components": {},
            "artifact_repositories": artifact_repositories,
        }
    })
}

/// Scans `root` and writes the provenance report to `out`, replacing any
/// previous report. The write is the only fatal step.
pub fn write_report(root: &Path, out: &Path) -> Result<()> {
    let urls = collect_resolved_urls(root);
    info!(urls = urls.len(), "aggregated resolved dependencies");
    let groups = group_by_host(&urls);
    let report = build_report(&groups);
    descriptor::store_json(out, &report)
}
