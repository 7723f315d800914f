use anyhow::Result;
use tracing::{info, warn};

use crate::prompt::Prompter;
use crate::sdk::{
    ControlPlaneClient, ControlPlaneConfig, REASON_TOKEN_EXPIRED, REASON_UNTRUSTED_CERT,
};

/// Lists the stored profiles and lets the user pick the one to activate.
/// Returns `None` when nothing is stored yet.
pub fn choose_profile<C, P>(client: &C, prompter: &P) -> Result<Option<ControlPlaneConfig>>
where
    C: ControlPlaneClient,
    P: Prompter,
{
    let listing = client.configurations()?;
    if listing.configurations.is_empty() {
        info!("no stored auth profiles; run login first");
        return Ok(None);
    }

    let items: Vec<String> = listing
        .configurations
        .iter()
        .map(|c| format!("{} ({}@{})", c.alias, c.username, c.org))
        .collect();
    let default = listing
        .current
        .as_deref()
        .and_then(|current| listing.configurations.iter().position(|c| c.alias == current))
        .unwrap_or(0);

    let choice = prompter.select("Select an auth profile", &items, default)?;
    client.make_current(&listing.configurations[choice].alias)?;
    Ok(Some(client.from_current()?))
}

/// Resolves the active profile, re-authenticating once when the stored
/// session has expired. Any other unauthorized reason comes back untouched.
pub fn active_config<C, P>(client: &C, prompter: &P) -> Result<ControlPlaneConfig>
where
    C: ControlPlaneClient,
    P: Prompter,
{
    let config = client.from_current()?;
    if config.connection.authorized
        || config.connection.reason.as_deref() != Some(REASON_TOKEN_EXPIRED)
    {
        return Ok(config);
    }

    info!(alias = %config.alias, "session token expired, logging in again");
    let password = prompter.password(&format!(
        "Password for {}@{} at {}",
        config.username, config.org, config.base_path
    ))?;
    let mut refreshed =
        client.login(&config.base_path, &config.username, &config.org, &password)?;
    refreshed.alias = config.alias.clone();
    client.save(&config.alias, &refreshed)?;
    Ok(refreshed)
}

/// Logs in and persists the profile under `alias`, then makes it the active
/// one.
///
/// When the endpoint offers an untrusted certificate, the user sees it and
/// decides; their decision lands in the stored session's authorized flag
/// whatever the client itself concluded. The profile is persisted in all
/// cases.
pub fn login_and_store<C, P>(
    client: &C,
    prompter: &P,
    alias: &str,
    base_path: &str,
    username: &str,
    org: &str,
    password: &str,
) -> Result<ControlPlaneConfig>
where
    C: ControlPlaneClient,
    P: Prompter,
{
    let mut config = client.login(base_path, username, org, password)?;
    config.alias = alias.to_string();

    if !config.connection.authorized
        && config.connection.reason.as_deref() == Some(REASON_UNTRUSTED_CERT)
    {
        let certificate = config
            .connection
            .certificate
            .clone()
            .unwrap_or_else(|| "(no certificate details offered)".to_string());
        let accepted = prompter.confirm(
            &format!("Untrusted certificate from {base_path}: {certificate}. Trust it?"),
            false,
        )?;
        config.connection.authorized = accepted;
        if !accepted {
            warn!(alias, "certificate rejected, storing the profile unauthorized");
        }
    }

    client.save(alias, &config)?;
    client.make_current(alias)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use anyhow::Context as _;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sdk::{ConnectionAuth, ProfileListing};

    #[derive(Default)]
    struct FakeClient {
        listing: RefCell<ProfileListing>,
        login_result: Option<ControlPlaneConfig>,
        logins: RefCell<usize>,
    }

    impl FakeClient {
        fn with_profiles(profiles: Vec<ControlPlaneConfig>, current: Option<&str>) -> Self {
            Self {
                listing: RefCell::new(ProfileListing {
                    configurations: profiles,
                    current: current.map(str::to_string),
                }),
                ..Self::default()
            }
        }
    }

    impl ControlPlaneClient for FakeClient {
        fn configurations(&self) -> Result<ProfileListing> {
            Ok(self.listing.borrow().clone())
        }

        fn from_current(&self) -> Result<ControlPlaneConfig> {
            let listing = self.listing.borrow();
            let current = listing.current.clone().context("no active profile")?;
            listing
                .configurations
                .iter()
                .find(|c| c.alias == current)
                .cloned()
                .context("active profile is not stored")
        }

        fn login(
            &self,
            _base_path: &str,
            _username: &str,
            _org: &str,
            _password: &str,
        ) -> Result<ControlPlaneConfig> {
            *self.logins.borrow_mut() += 1;
            self.login_result.clone().context("login not scripted")
        }

        fn make_current(&self, alias: &str) -> Result<()> {
            self.listing.borrow_mut().current = Some(alias.to_string());
            Ok(())
        }

        fn save(&self, alias: &str, config: &ControlPlaneConfig) -> Result<()> {
            let mut listing = self.listing.borrow_mut();
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
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedPrompter {
        selections: RefCell<Vec<usize>>,
        passwords: RefCell<Vec<String>>,
        confirms: RefCell<Vec<bool>>,
        password_prompts: RefCell<usize>,
        seen_default: RefCell<Option<usize>>,
    }

    impl Prompter for ScriptedPrompter {
        fn select(&self, _message: &str, _items: &[String], default: usize) -> Result<usize> {
            *self.seen_default.borrow_mut() = Some(default);
            self.selections
                .borrow_mut()
                .pop()
                .context("unexpected select prompt")
        }

        fn password(&self, _message: &str) -> Result<String> {
            *self.password_prompts.borrow_mut() += 1;
            self.passwords
                .borrow_mut()
                .pop()
                .context("unexpected password prompt")
        }

        fn confirm(&self, _message: &str, _default: bool) -> Result<bool> {
            self.confirms
                .borrow_mut()
                .pop()
                .context("unexpected confirm prompt")
        }
    }

    fn profile(alias: &str, authorized: bool, reason: Option<&str>) -> ControlPlaneConfig {
        ControlPlaneConfig {
            alias: alias.to_string(),
            username: "admin".to_string(),
            org: "dev-org".to_string(),
            base_path: "https://cell.example.com".to_string(),
            session_token: Some("stale".to_string()),
            connection: ConnectionAuth {
                authorized,
                reason: reason.map(str::to_string),
                certificate: None,
            },
        }
    }

    #[test]
    fn choose_with_empty_store_returns_none() {
        let client = FakeClient::default();
        let prompter = ScriptedPrompter::default();
        assert_eq!(choose_profile(&client, &prompter).unwrap(), None);
        assert_eq!(*prompter.seen_default.borrow(), None);
    }

    #[test]
    fn choose_defaults_to_active_alias_and_activates_choice() {
        let client = FakeClient::with_profiles(
            vec![profile("alpha", true, None), profile("beta", true, None)],
            Some("beta"),
        );
        let prompter = ScriptedPrompter {
            selections: RefCell::new(vec![0]),
            ..ScriptedPrompter::default()
        };

        let chosen = choose_profile(&client, &prompter).unwrap().unwrap();
        assert_eq!(*prompter.seen_default.borrow(), Some(1));
        assert_eq!(chosen.alias, "alpha");
        assert_eq!(client.listing.borrow().current.as_deref(), Some("alpha"));
    }

    #[test]
    fn expired_token_prompts_for_password_exactly_once() {
        let mut client = FakeClient::with_profiles(
            vec![profile("dev", false, Some(REASON_TOKEN_EXPIRED))],
            Some("dev"),
        );
        let mut fresh = profile("", true, None);
        fresh.session_token = Some("fresh".to_string());
        client.login_result = Some(fresh);
        let prompter = ScriptedPrompter {
            passwords: RefCell::new(vec!["secret".to_string()]),
            ..ScriptedPrompter::default()
        };

        let refreshed = active_config(&client, &prompter).unwrap();
        assert_eq!(*prompter.password_prompts.borrow(), 1);
        assert_eq!(*client.logins.borrow(), 1);
        assert_eq!(refreshed.alias, "dev");
        assert_eq!(refreshed.session_token.as_deref(), Some("fresh"));

        // The refreshed session replaced the stored one.
        let stored = client.from_current().unwrap();
        assert_eq!(stored.session_token.as_deref(), Some("fresh"));
    }

    #[test]
    fn other_unauthorized_reason_is_returned_unchanged() {
        let client = FakeClient::with_profiles(
            vec![profile("dev", false, Some("SOME_OTHER_REASON"))],
            Some("dev"),
        );
        let prompter = ScriptedPrompter::default();

        let config = active_config(&client, &prompter).unwrap();
        assert_eq!(*prompter.password_prompts.borrow(), 0);
        assert_eq!(*client.logins.borrow(), 0);
        assert!(!config.connection.authorized);
        assert_eq!(config.connection.reason.as_deref(), Some("SOME_OTHER_REASON"));
    }

    #[test]
    fn authorized_profile_is_returned_without_prompts() {
        let client =
            FakeClient::with_profiles(vec![profile("dev", true, None)], Some("dev"));
        let prompter = ScriptedPrompter::default();

        let config = active_config(&client, &prompter).unwrap();
        assert_eq!(*prompter.password_prompts.borrow(), 0);
        assert!(config.connection.authorized);
    }

    #[test]
    fn accepted_certificate_is_recorded_authorized() {
        let mut client = FakeClient::default();
        let mut offered = profile("", false, Some(REASON_UNTRUSTED_CERT));
        offered.connection.certificate = Some("CN=cell.example.com".to_string());
        client.login_result = Some(offered);
        let prompter = ScriptedPrompter {
            confirms: RefCell::new(vec![true]),
            ..ScriptedPrompter::default()
        };

        let stored = login_and_store(
            &client,
            &prompter,
            "dev",
            "https://cell.example.com",
            "admin",
            "dev-org",
            "secret",
        )
        .unwrap();

        assert!(stored.connection.authorized);
        assert_eq!(client.listing.borrow().current.as_deref(), Some("dev"));
        assert!(client.listing.borrow().configurations[0].connection.authorized);
    }

    #[test]
    fn rejected_certificate_is_still_persisted() {
        let mut client = FakeClient::default();
        client.login_result = Some(profile("", false, Some(REASON_UNTRUSTED_CERT)));
        let prompter = ScriptedPrompter {
            confirms: RefCell::new(vec![false]),
            ..ScriptedPrompter::default()
        };

        let stored = login_and_store(
            &client,
            &prompter,
            "dev",
            "https://cell.example.com",
            "admin",
            "dev-org",
            "secret",
        )
        .unwrap();

        assert!(!stored.connection.authorized);
        let listing = client.listing.borrow();
        assert_eq!(listing.configurations.len(), 1);
        assert_eq!(listing.configurations[0].alias, "dev");
        assert!(!listing.configurations[0].connection.authorized);
    }

    #[test]
    fn unrelated_login_failure_reason_skips_the_trust_prompt() {
        let mut client = FakeClient::default();
        client.login_result = Some(profile("", false, Some("SOME_OTHER_REASON")));
        let prompter = ScriptedPrompter::default();

        let stored = login_and_store(
            &client,
            &prompter,
            "dev",
            "https://cell.example.com",
            "admin",
            "dev-org",
            "secret",
        )
        .unwrap();

        // No confirm was scripted, so a prompt would have errored.
        assert!(!stored.connection.authorized);
        assert_eq!(client.listing.borrow().configurations.len(), 1);
    }
}
