use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    dates::TimeZone,
    encoding::Encoding,
    error::{MergeError, Result},
};

pub const DEFAULT_CONFIG_PATH: &str = "call-merge.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_file: PathBuf,
    pub input_date_format: String,
    pub output_date_format: String,
    pub timezone: TimeZone,
    #[serde(deserialize_with = "parse_encodings")]
    pub encodings: Vec<Encoding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("dashboard-data/data/calls/CSV"),
            output_file: PathBuf::from("dashboard-data/data/calls/all_calls.json"),
            input_date_format: "%m/%d/%Y %H:%M".to_owned(),
            output_date_format: "%Y-%m-%d %H:%M:%S".to_owned(),
            timezone: TimeZone::Utc,
            encodings: vec![Encoding::Utf8Sig, Encoding::Windows1252, Encoding::Latin1],
        }
    }
}

impl Config {
    /// Loads settings from `path`. With no explicit path the default file is
    /// optional and built-in defaults apply when it is absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            MergeError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        if config.encodings.is_empty() {
            return Err(MergeError::Config(
                "at least one encoding must be listed".to_owned(),
            ));
        }

        Ok(config)
    }
}

fn parse_encodings<'de, D>(deserializer: D) -> std::result::Result<Vec<Encoding>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let labels: Vec<String> = Vec::deserialize(deserializer)?;
    labels
        .iter()
        .map(|label| {
            Encoding::from_label(label).ok_or_else(|| {
                serde::de::Error::unknown_variant(label.trim(), Encoding::LABELS)
            })
        })
        .collect()
}
