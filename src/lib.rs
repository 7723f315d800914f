pub mod auth;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod discover;
pub mod emulator;
pub mod plugins;
pub mod prompt;
pub mod provenance;
pub mod sdk;

// Convenience re-exports (optional, but nice)
pub use config::Config;
pub use discover::{discover_module, DiscoveredModule};
pub use emulator::{launch_dev_server, synthesize, DevServer, Outcome, ServeSpec, Synthesis};
pub use plugins::{load_registrations, PluginRegistration};
pub use provenance::write_report;
pub use sdk::{ApiClient, ControlPlaneClient, ControlPlaneConfig};
