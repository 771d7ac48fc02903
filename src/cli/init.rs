//! Init command implementation

use anyhow::{bail, Result};
use std::path::PathBuf;

use pakflow::config::Settings;

/// Default configuration content for pakflow init
pub const DEFAULT_CONFIG: &str = r#"# pakflow configuration
#
# Package-manager binary to drive. Tasks run as `<program> <verb> --id <id> <flags>`.
program = "winget"

# Default execution options, merged into every task's flags.
# Per-run CLI switches override these.
[exec]
silent = false
force = false
interactive = false
purge = false
include_unknown = false
ignore_hash = false
# custom_flags = "--scope machine"

# Proxy passed to backend tasks as `--proxy http://<host>:<port>` when enabled.
[proxy]
enabled = false
host = "127.0.0.1"
port = 7890

# Directory download tasks write to. Defaults to <Downloads>/pakflow-downloads.
# download_dir = "/home/me/Downloads/pakflow-downloads"
"#;

/// Initialize a new pakflow configuration.
/// By default creates the config at ~/.pakflow/config.toml;
/// use --config to specify a custom path.
pub async fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Settings::config_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    println!("Created: {}", config_path.display());

    Ok(())
}
