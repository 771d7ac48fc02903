//! Configuration loading and management

mod io;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::flags::ExecOptions;

/// Proxy configuration, off by default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Whether the proxy is passed to backend tasks
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 7890,
        }
    }
}

impl ProxySettings {
    /// Proxy URL in the form the backend accepts
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Persistent settings, injected into flag building and the CLI rather
/// than read from a global
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Package-manager binary the backend drives
    pub program: String,

    /// Default execution options applied to every task
    pub exec: ExecOptions,

    /// Proxy defaults
    pub proxy: ProxySettings,

    /// Directory download tasks write to; a per-user default is used
    /// when unset
    pub download_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            program: "winget".to_string(),
            exec: ExecOptions::default(),
            proxy: ProxySettings::default(),
            download_dir: None,
        }
    }
}

impl Settings {
    /// Execution options with the proxy URL merged in when enabled
    pub fn exec_options(&self) -> ExecOptions {
        let mut options = self.exec.clone();
        if self.proxy.enabled && options.proxy_url.is_none() {
            options.proxy_url = Some(self.proxy.url());
        }
        options
    }

    /// Effective download directory
    pub fn download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return dir.clone();
        }
        dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("pakflow-downloads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_url_only_merged_when_enabled() {
        let mut settings = Settings::default();
        assert_eq!(settings.exec_options().proxy_url, None);

        settings.proxy.enabled = true;
        assert_eq!(
            settings.exec_options().proxy_url.as_deref(),
            Some("http://127.0.0.1:7890")
        );

        // An explicit URL in exec options wins over the proxy section
        settings.exec.proxy_url = Some("http://proxy.corp:8080".to_string());
        assert_eq!(
            settings.exec_options().proxy_url.as_deref(),
            Some("http://proxy.corp:8080")
        );
    }
}
