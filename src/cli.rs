use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::provenance;

#[derive(Parser, Debug)]
#[command(name = "perigee", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rewrite the host configuration for the given plugins and launch the
    /// dev server
    Serve(ServeArgs),
    /// Aggregate lock manifests under a directory into a provenance report
    Provenance(ProvenanceArgs),
    /// Manage auth profiles for the control plane
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Plugin folders to register, in order (defaults to perigee.toml)
    pub folders: Vec<String>,

    /// Host application root (where angular.json lives)
    #[arg(long, default_value = ".")]
    pub host_root: PathBuf,

    /// Path under the host root containing the plugin folders
    #[arg(long)]
    pub plugins_root: Option<String>,

    /// Session token (overrides the active auth profile's)
    #[arg(long)]
    pub token: Option<String>,

    /// Control-plane endpoint to proxy to (overrides the active profile's)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Profile store to resolve token/endpoint from
    #[arg(long)]
    pub profiles_file: Option<PathBuf>,

    /// Rewrite configuration only, do not launch the dev server
    #[arg(long, default_value_t = false)]
    pub no_launch: bool,

    /// Extra arguments forwarded to the dev server, after --
    #[arg(last = true)]
    pub extra: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ProvenanceArgs {
    /// Directory tree to scan for lock manifests
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Report file to write
    #[arg(long, default_value = provenance::DEFAULT_REPORT)]
    pub out: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Pick the active auth profile interactively
    Use(UseArgs),
    /// Log in against the control plane and store the profile
    Login(LoginArgs),
}

#[derive(Args, Debug)]
pub struct UseArgs {
    /// Profile store location
    #[arg(long)]
    pub profiles_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Name to store the profile under
    pub alias: String,

    /// Control-plane base URL, e.g. https://cell.example.com
    #[arg(long)]
    pub endpoint: String,

    /// Account name
    #[arg(long)]
    pub user: String,

    /// Organization the account belongs to
    #[arg(long)]
    pub org: String,

    /// Profile store location
    #[arg(long)]
    pub profiles_file: Option<PathBuf>,
}
