use std::path::{Path, PathBuf};

use cibus_generate::GenerateOptions;
use serde::{Deserialize, Serialize};

use crate::CliError;

/// File read when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "cibus.toml";

/// Optional TOML settings; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    pub workers: Option<usize>,
    pub channel_capacity: Option<usize>,
    pub max_normal_retries: Option<u32>,
    pub log_json: bool,
    /// Output path used when `generate` gets no `--out`.
    pub default_output: Option<PathBuf>,
}

impl CliSettings {
    pub fn generate_options(&self, workers: Option<usize>) -> GenerateOptions {
        let defaults = GenerateOptions::default();
        GenerateOptions {
            workers: workers.or(self.workers).unwrap_or(defaults.workers),
            channel_capacity: self.channel_capacity.unwrap_or(defaults.channel_capacity),
            max_normal_retries: self.max_normal_retries.unwrap_or(defaults.max_normal_retries),
        }
    }
}

/// Load settings from `path`, or from `cibus.toml` when present.
pub fn load_settings(path: Option<&Path>) -> Result<CliSettings, CliError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_SETTINGS_FILE);
            if !fallback.exists() {
                return Ok(CliSettings::default());
            }
            fallback
        }
    };
    let content = std::fs::read_to_string(&path)?;
    let settings: CliSettings = toml::from_str(&content)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let settings: CliSettings = toml::from_str("workers = 3\nmax_normal_retries = 7\n").unwrap();
        assert_eq!(settings.generate_options(None).workers, 3);
        assert_eq!(settings.generate_options(Some(8)).workers, 8);

        let options = settings.generate_options(None);
        assert_eq!(options.max_normal_retries, 7);
        assert_eq!(options.channel_capacity, GenerateOptions::default().channel_capacity);
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cibus.toml");
        std::fs::write(&path, "log_json = true\ndefault_output = \"out/records.dat\"\n").unwrap();
        let settings = load_settings(Some(&path)).unwrap();
        assert!(settings.log_json);
        assert_eq!(settings.default_output, Some(PathBuf::from("out/records.dat")));
    }

    #[test]
    fn rejects_unknown_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "workers = \"many\"\n").unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(CliError::Settings(_))));
    }
}
