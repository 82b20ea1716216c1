//! Simple configuration persistence for the choreo CLI.
//!
//! Stores the last-used package directory and preferred output format.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// CLI configuration.
#[derive(Debug, Default)]
pub struct Config {
    /// Last frame-set package directory passed to any subcommand.
    pub last_package_dir: Option<PathBuf>,
    /// Last song-map JSON file written by `plan`.
    pub last_plan_output: Option<PathBuf>,
}

impl Config {
    /// Load config from the default location. Returns defaults if the file doesn't exist or
    /// can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("choreo").join("config.txt")
    }

    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                match key {
                    "last_package_dir" => {
                        if !value.is_empty() {
                            config.last_package_dir = Some(PathBuf::from(value));
                        }
                    }
                    "last_plan_output" => {
                        if !value.is_empty() {
                            config.last_plan_output = Some(PathBuf::from(value));
                        }
                    }
                    _ => {}
                }
            }
        }

        config
    }

    fn serialize(&self) -> String {
        let mut lines = vec!["# choreo configuration".to_string()];
        if let Some(ref dir) = self.last_package_dir {
            lines.push(format!("last_package_dir={}", dir.display()));
        }
        if let Some(ref out) = self.last_plan_output {
            lines.push(format!("last_plan_output={}", out.display()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_yields_defaults() {
        let config = Config::parse("");
        assert!(config.last_package_dir.is_none());
        assert!(config.last_plan_output.is_none());
    }

    #[test]
    fn parse_ignores_comments_and_unknown_keys() {
        let content = "# a comment\nbogus_key=nope\nlast_package_dir=/packs/dancer\n";
        let config = Config::parse(content);
        assert_eq!(config.last_package_dir, Some(PathBuf::from("/packs/dancer")));
    }

    #[test]
    fn serialize_roundtrips() {
        let mut config = Config::default();
        config.last_package_dir = Some(PathBuf::from("/packs/dancer"));
        config.last_plan_output = Some(PathBuf::from("/tmp/song.json"));
        let parsed = Config::parse(&config.serialize());
        assert_eq!(parsed.last_package_dir, config.last_package_dir);
        assert_eq!(parsed.last_plan_output, config.last_plan_output);
    }
}
