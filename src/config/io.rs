//! Settings file I/O operations

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::Settings;

impl Settings {
    /// Get the settings directory path (~/.pakflow/)
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pakflow")
    }

    /// Get the settings file path (~/.pakflow/config.toml)
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load settings from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Load settings from the default path, falling back to defaults when
    /// no file exists yet
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Save settings to a file with atomic write and file locking.
    ///
    /// An exclusive lock keeps concurrent writers (CLI and a front end)
    /// from interleaving, and the temp-file + rename write keeps a crash
    /// from corrupting the file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize settings")?;

        // Lock file kept separate from the settings file because of the rename
        let lock_path = path.with_extension("toml.lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

        lock_file
            .lock_exclusive()
            .with_context(|| "Failed to acquire settings lock")?;

        let temp_path = path.with_extension("toml.tmp");
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        temp_file
            .write_all(content.as_bytes())
            .with_context(|| "Failed to write settings content")?;

        temp_file
            .sync_all()
            .with_context(|| "Failed to sync settings file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename settings file: {}", path.display()))?;

        // Lock is released when lock_file is dropped
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.program = "winget-test".to_string();
        settings.exec.silent = true;
        settings.proxy.enabled = true;
        settings.proxy.port = 8888;
        settings.download_dir = Some(dir.path().join("downloads"));

        settings.save_to_file(&path).expect("Failed to save settings");
        let loaded = Settings::from_file(&path).expect("Failed to load settings");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "program = \"scoop\"\n").expect("Failed to write file");

        let loaded = Settings::from_file(&path).expect("Failed to load settings");
        assert_eq!(loaded.program, "scoop");
        assert_eq!(loaded.proxy, super::super::ProxySettings::default());
        assert!(!loaded.exec.silent);
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("config.toml");
        Settings::default()
            .save_to_file(&path)
            .expect("Failed to save settings");
        assert!(path.exists());
    }
}
