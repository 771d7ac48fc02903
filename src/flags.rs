//! Command-line flag construction for the package-manager binary.
//!
//! Flags come in two layers: a per-kind base set that is always passed
//! (exactness, source pinning, agreement acceptance) and option-driven
//! behavior flags assembled from [`ExecOptions`].

use serde::{Deserialize, Serialize};

use crate::TaskKind;

/// User-tunable execution options, merged from settings and per-run
/// overrides before a task starts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecOptions {
    /// Suppress installer UI where supported
    pub silent: bool,
    /// Force the operation past backend safety checks
    pub force: bool,
    /// Hand control to the installer's own UI; overrides `silent`
    pub interactive: bool,
    /// Remove residual data on uninstall
    pub purge: bool,
    /// Include packages with unknown installed versions on upgrade
    pub include_unknown: bool,
    /// Skip installer hash verification
    pub ignore_hash: bool,
    /// Proxy URL passed straight to the backend
    pub proxy_url: Option<String>,
    /// Free-form extra flags, whitespace-separated
    pub custom_flags: Option<String>,
}

/// Invariant flags always passed for `kind`
pub fn base_flags_for(kind: TaskKind) -> Vec<String> {
    let flags: &[&str] = match kind {
        TaskKind::Install | TaskKind::Upgrade | TaskKind::Download => &[
            "--exact",
            "--source",
            "winget",
            "--accept-source-agreements",
            "--accept-package-agreements",
        ],
        TaskKind::Uninstall => &["--exact", "--accept-source-agreements"],
    };
    flags.iter().map(|s| s.to_string()).collect()
}

/// Full default flag set used when no options are supplied, matching the
/// backend's own fallback table
pub fn default_flags_for(kind: TaskKind) -> Vec<String> {
    let flags: &[&str] = match kind {
        TaskKind::Install | TaskKind::Upgrade => &[
            "--exact",
            "--source",
            "winget",
            "--accept-source-agreements",
            "--accept-package-agreements",
            "--disable-interactivity",
            "--silent",
            "--include-unknown",
            "--force",
        ],
        TaskKind::Uninstall => &["--exact", "--accept-source-agreements"],
        TaskKind::Download => &[
            "--exact",
            "--source",
            "winget",
            "--accept-source-agreements",
            "--accept-package-agreements",
            "--disable-interactivity",
        ],
    };
    flags.iter().map(|s| s.to_string()).collect()
}

/// Assemble the flag list for one task: base flags for `kind` plus the
/// behavior flags `options` selects
pub fn build_flags(kind: TaskKind, options: &ExecOptions) -> Vec<String> {
    let mut flags = base_flags_for(kind);

    if options.interactive {
        flags.push("--interactive".to_string());
    } else {
        if options.silent {
            flags.push("--silent".to_string());
        }
        flags.push("--disable-interactivity".to_string());
    }

    if options.force {
        flags.push("--force".to_string());
    }
    if options.purge && kind == TaskKind::Uninstall {
        flags.push("--purge".to_string());
    }
    if options.include_unknown && kind == TaskKind::Upgrade {
        flags.push("--include-unknown".to_string());
    }
    if options.ignore_hash {
        flags.push("--ignore-security-hash".to_string());
    }

    if let Some(url) = options.proxy_url.as_deref() {
        if !url.trim().is_empty() {
            flags.push("--proxy".to_string());
            flags.push(url.trim().to_string());
        }
    }

    if let Some(custom) = options.custom_flags.as_deref() {
        flags.extend(custom.split_whitespace().map(|s| s.to_string()));
    }

    flags
}
