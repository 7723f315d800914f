use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Unauthorized-session sentinels the selector compares against. Anything
// else is an unknown reason and is handed back untouched.
pub const REASON_TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
pub const REASON_UNTRUSTED_CERT: &str = "UNTRUSTED_CERTIFICATE";

/// Live connection state carried by a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAuth {
    pub authorized: bool,
    /// Sentinel naming why the session is unauthorized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Certificate the endpoint offered, when trust is the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

/// One stored auth profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    pub alias: String,
    pub username: String,
    pub org: String,
    /// Control-plane base URL, e.g. `https://cell.example.com`.
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default)]
    pub connection: ConnectionAuth,
}

/// Every stored profile plus the active alias.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileListing {
    #[serde(default)]
    pub configurations: Vec<ControlPlaneConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

/// Capability set of the control-plane client the auth selector drives.
pub trait ControlPlaneClient {
    fn configurations(&self) -> Result<ProfileListing>;
    /// Resolved configuration of the active profile.
    fn from_current(&self) -> Result<ControlPlaneConfig>;
    /// Credential login against `base_path`. The returned profile carries no
    /// alias; the caller names it on save.
    fn login(
        &self,
        base_path: &str,
        username: &str,
        org: &str,
        password: &str,
    ) -> Result<ControlPlaneConfig>;
    /// Marks `alias` the active profile.
    fn make_current(&self, alias: &str) -> Result<()>;
    /// Persists `config` under `alias`, replacing any previous profile with
    /// that alias.
    fn save(&self, alias: &str, config: &ControlPlaneConfig) -> Result<()>;
}

/// File-backed client: profiles live in one JSON document, login is a
/// session request against the control plane.
#[derive(Debug)]
pub struct ApiClient {
    path: PathBuf,
}

impl ApiClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<user config dir>/perigee/profiles.json`.
    pub fn default_path() -> Result<PathBuf> {
        let mut dir = dirs::config_dir().context("no user config directory")?;
        dir.push("perigee");
        Ok(dir.join("profiles.json"))
    }

    fn load(&self) -> Result<ProfileListing> {
        if !self.path.exists() {
            return Ok(ProfileListing::default());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    fn persist(&self, listing: &ProfileListing) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(listing)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl ControlPlaneClient for ApiClient {
    fn configurations(&self) -> Result<ProfileListing> {
        self.load()
    }

    fn from_current(&self) -> Result<ControlPlaneConfig> {
        let listing = self.load()?;
        let current = listing.current.context("no active profile")?;
        listing
            .configurations
            .into_iter()
            .find(|c| c.alias == current)
            .with_context(|| format!("active profile '{current}' is not stored"))
    }

    fn login(
        &self,
        base_path: &str,
        username: &str,
        org: &str,
        password: &str,
    ) -> Result<ControlPlaneConfig> {
        let sessions_url = format!("{}/api/sessions", base_path.trim_end_matches('/'));
        let template = ControlPlaneConfig {
            alias: String::new(),
            username: username.to_string(),
            org: org.to_string(),
            base_path: base_path.to_string(),
            session_token: None,
            connection: ConnectionAuth::default(),
        };

        match request_session(&sessions_url, username, org, password, false) {
            Ok(token) => Ok(ControlPlaneConfig {
                session_token: Some(token),
                connection: ConnectionAuth {
                    authorized: true,
                    reason: None,
                    certificate: None,
                },
                ..template
            }),
            Err(err) if is_certificate_error(&err) => {
                // The trust decision is the caller's; retry insecurely so an
                // accepted endpoint already has a usable token stored.
                let token = request_session(&sessions_url, username, org, password, true).ok();
                Ok(ControlPlaneConfig {
                    session_token: token,
                    connection: ConnectionAuth {
                        authorized: false,
                        reason: Some(REASON_UNTRUSTED_CERT.to_string()),
                        certificate: Some(tls_failure_summary(&err)),
                    },
                    ..template
                })
            }
            Err(err) => {
                Err(err).with_context(|| format!("login against {sessions_url} failed"))
            }
        }
    }

    fn make_current(&self, alias: &str) -> Result<()> {
        let mut listing = self.load()?;
        if !listing.configurations.iter().any(|c| c.alias == alias) {
            bail!("no stored profile named '{alias}'");
        }
        listing.current = Some(alias.to_string());
        self.persist(&listing)
    }

    fn save(&self, alias: &str, config: &ControlPlaneConfig) -> Result<()> {
        let mut listing = self.load()?;
        let mut stored = config.clone();
        stored.alias = alias.to_string();
        if let Some(existing) = listing
            .configurations
            .iter_mut()
            .find(|c| c.alias == alias)
        {
            *existing = stored;
        } else {
            listing.configurations.push(stored);
        }
        self.persist(&listing)
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    token: String,
}

fn request_session(
    url: &str,
    username: &str,
    org: &str,
    password: &str,
    insecure: bool,
) -> Result<String, reqwest::Error> {
    let client = reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(insecure)
        .build()?;
    let response = client
        .post(url)
        .basic_auth(format!("{username}@{org}"), Some(password))
        .header("Accept", "application/json")
        .send()?
        .error_for_status()?;
    let body: SessionResponse = response.json()?;
    Ok(body.token)
}

/// reqwest does not classify TLS failures; look for one in the error chain.
fn is_certificate_error(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause.to_string().to_ascii_lowercase().contains("certificate") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Innermost cause, which for TLS failures names the offending certificate.
fn tls_failure_summary(err: &reqwest::Error) -> String {
    let mut summary = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        summary = cause.to_string();
        source = cause.source();
    }
    summary
}
