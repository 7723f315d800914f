use anyhow::{bail, Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use perigee::cli::{AuthCommand, Cli, Command, LoginArgs, ProvenanceArgs, ServeArgs, UseArgs};
use perigee::prompt::{Prompter as _, TerminalPrompter};
use perigee::sdk::ApiClient;
use perigee::{auth, config, emulator, provenance};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("perigee=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args),
        Command::Provenance(args) => provenance_report(args),
        Command::Auth(AuthCommand::Use(args)) => auth_use(args),
        Command::Auth(AuthCommand::Login(args)) => auth_login(args),
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let cfg = config::Config::load_from_dir(&args.host_root)?;

    let folders = if args.folders.is_empty() {
        cfg.emulator.plugins.clone()
    } else {
        args.folders.clone()
    };
    if folders.is_empty() {
        bail!("no plugin folders given; pass them as arguments or set [emulator] plugins in perigee.toml");
    }
    let plugins_root = args
        .plugins_root
        .clone()
        .or_else(|| cfg.emulator.plugins_root.clone())
        .context("no plugins root; pass --plugins-root or set [emulator] plugins_root in perigee.toml")?;

    let (token, endpoint) = credentials_for(&args, &cfg)?;

    let synthesis = emulator::synthesize(&emulator::ServeSpec {
        host_root: args.host_root.clone(),
        plugins_root,
        folders,
        token,
        endpoint,
    })?;
    match &synthesis.outcome {
        emulator::Outcome::Full => {
            info!(plugins = synthesis.registrations.len(), "configuration synthesized");
        }
        emulator::Outcome::Partial { cause } => {
            warn!("configuration only partially synthesized: {cause:#}");
        }
    }

    if args.no_launch {
        return Ok(());
    }
    let server = emulator::launch_dev_server(&args.host_root, &args.extra)?;
    let status = server.wait()?;
    if !status.success() {
        bail!("dev server exited with {status}");
    }
    Ok(())
}

/// Flags win; whatever is still missing comes from the active auth profile.
fn credentials_for(args: &ServeArgs, cfg: &config::Config) -> Result<(String, String)> {
    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| cfg.emulator.endpoint.clone());
    if let (Some(token), Some(endpoint)) = (args.token.clone(), endpoint.clone()) {
        return Ok((token, endpoint));
    }

    let client = profile_client(args.profiles_file.clone())?;
    let profile = auth::active_config(&client, &TerminalPrompter)?;
    if !profile.connection.authorized {
        warn!(alias = %profile.alias, "active profile is not authorized; the control plane may reject requests");
    }

    let token = match args.token.clone() {
        Some(token) => token,
        None => profile.session_token.clone().with_context(|| {
            format!(
                "active profile '{}' has no session token; run 'perigee auth login'",
                profile.alias
            )
        })?,
    };
    Ok((token, endpoint.unwrap_or(profile.base_path)))
}

fn provenance_report(args: ProvenanceArgs) -> Result<()> {
    provenance::write_report(&args.root, &args.out)?;
    info!(report = %args.out.display(), "provenance report written");
    Ok(())
}

fn auth_use(args: UseArgs) -> Result<()> {
    let client = profile_client(args.profiles_file)?;
    if let Some(profile) = auth::choose_profile(&client, &TerminalPrompter)? {
        info!(alias = %profile.alias, username = %profile.username, org = %profile.org, "profile activated");
    }
    Ok(())
}

fn auth_login(args: LoginArgs) -> Result<()> {
    let client = profile_client(args.profiles_file)?;
    let prompter = TerminalPrompter;
    let password = prompter.password(&format!("Password for {}@{}", args.user, args.org))?;

    let profile = auth::login_and_store(
        &client,
        &prompter,
        &args.alias,
        &args.endpoint,
        &args.user,
        &args.org,
        &password,
    )?;
    if profile.connection.authorized {
        info!(alias = %args.alias, "logged in");
    } else {
        warn!(alias = %args.alias, "profile stored, but the session is not authorized");
    }
    Ok(())
}

fn profile_client(path: Option<PathBuf>) -> Result<ApiClient> {
    let path = match path {
        Some(path) => path,
        None => ApiClient::default_path()?,
    };
    Ok(ApiClient::new(path))
}
