use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::status::types::{Platform, platforms_for};

/// Default naming convention of release packages in the indexes
pub const DEFAULT_PACKAGE_PREFIX: &str = "ros-{release}-";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Pair of channels compared to detect packages still propagating
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PropagationConfig {
    pub from: String,
    pub to: String,
}

/// Run configuration: channels, platforms and rendering options
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusConfig {
    /// Active release name, substituted for `{release}` in templates
    pub release: String,
    /// Ordered channel names, from the build stage to the public stage
    pub channels: Vec<String>,
    /// Channel a package must not disappear from; defaults to the last, most
    /// downstream channel
    pub reference_channel: Option<String>,
    /// Defaults to the last two channels
    pub propagation: Option<PropagationConfig>,
    pub distributions: Vec<String>,
    pub architectures: Vec<String>,
    /// Architecture whose binary records provide the source column; defaults to the first one
    pub source_architecture: Option<String>,
    pub package_prefix: String,
    /// Prefixes of other releases sharing the same indexes
    pub foreign_prefixes: Vec<String>,
    /// Channel whose markers link to the build job; defaults to the first channel
    pub link_channel: Option<String>,
    /// Job URL template with `{release}`, `{column}` and `{pkg}` placeholders
    pub job_url: Option<String>,
    pub column_labels: BTreeMap<String, String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            release: String::new(),
            channels: vec![
                "building".to_string(),
                "shadow-fixed".to_string(),
                "public".to_string(),
            ],
            reference_channel: None,
            propagation: None,
            distributions: Vec::new(),
            architectures: vec!["i386".to_string(), "amd64".to_string()],
            source_architecture: None,
            package_prefix: DEFAULT_PACKAGE_PREFIX.to_string(),
            foreign_prefixes: Vec::new(),
            link_channel: None,
            job_url: None,
            column_labels: BTreeMap::new(),
        }
    }
}

/// Per-column rendering metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub label: Option<String>,
    /// Job URL with `{pkg}` still to be filled in
    pub job_url: Option<String>,
}

impl StatusConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: StatusConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.release.is_empty() {
            return Err(ConfigError::Invalid("release must be set".to_string()));
        }
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one channel is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.channels.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "duplicate channel {duplicate}"
            )));
        }

        let named_channels = [
            ("referenceChannel", self.reference_channel.as_ref()),
            ("linkChannel", self.link_channel.as_ref()),
            ("propagation.from", self.propagation.as_ref().map(|p| &p.from)),
            ("propagation.to", self.propagation.as_ref().map(|p| &p.to)),
        ];
        for (field, channel) in named_channels {
            if let Some(channel) = channel
                && !self.channels.contains(channel)
            {
                return Err(ConfigError::Invalid(format!(
                    "{field} names unknown channel {channel}"
                )));
            }
        }

        if let Some(arch) = &self.source_architecture
            && !self.architectures.contains(arch)
        {
            return Err(ConfigError::Invalid(format!(
                "sourceArchitecture {arch} is not a configured architecture"
            )));
        }

        Ok(())
    }

    /// Ordered platform columns
    pub fn platforms(&self) -> Vec<Platform> {
        platforms_for(&self.distributions, &self.architectures)
    }

    pub fn reference_channel(&self) -> &str {
        self.reference_channel
            .as_deref()
            .or_else(|| self.channels.last().map(String::as_str))
            .unwrap_or_default()
    }

    pub fn link_channel(&self) -> &str {
        self.link_channel
            .as_deref()
            .unwrap_or_else(|| self.channels[0].as_str())
    }

    /// Channels compared for propagation drift, `None` with a single channel
    pub fn propagation_pair(&self) -> Option<(&str, &str)> {
        match &self.propagation {
            Some(p) => Some((p.from.as_str(), p.to.as_str())),
            None if self.channels.len() >= 2 => {
                let n = self.channels.len();
                Some((self.channels[n - 2].as_str(), self.channels[n - 1].as_str()))
            }
            None => None,
        }
    }

    pub fn source_architecture(&self) -> Option<&str> {
        self.source_architecture
            .as_deref()
            .or_else(|| self.architectures.first().map(String::as_str))
    }

    /// Naming-convention prefix of the active release
    pub fn release_prefix(&self) -> String {
        self.package_prefix.replace("{release}", &self.release)
    }

    /// Rendering metadata for an interchange column key
    pub fn column_metadata(&self, column: &str) -> ColumnMetadata {
        ColumnMetadata {
            label: self.column_labels.get(column).cloned(),
            job_url: self.job_url.as_ref().map(|template| {
                template
                    .replace("{release}", &self.release)
                    .replace("{column}", column)
            }),
        }
    }
}

/// Returns the path to the data directory for release-status.
/// Uses $XDG_DATA_HOME/release-status if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/release-status,
/// or ./release-status if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the snapshot database file.
pub fn db_path() -> PathBuf {
    data_dir().join("snapshots.db")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("release-status")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn config_from(value: serde_json::Value) -> Result<StatusConfig, ConfigError> {
        StatusConfig::from_json(&value.to_string())
    }

    #[test]
    fn status_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = config_from(json!({
            "release": "groovy",
            "distributions": ["quantal"]
        }))
        .unwrap();

        assert_eq!(result.channels, vec!["building", "shadow-fixed", "public"]);
        assert_eq!(result.architectures, vec!["i386", "amd64"]);
        assert_eq!(result.reference_channel(), "public");
        assert_eq!(result.link_channel(), "building");
        assert_eq!(result.propagation_pair(), Some(("shadow-fixed", "public")));
        assert_eq!(result.source_architecture(), Some("i386"));
        assert_eq!(result.release_prefix(), "ros-groovy-");
    }

    #[test]
    fn status_config_from_full_object_parses_all_fields() {
        let result = config_from(json!({
            "release": "groovy",
            "channels": ["building", "public"],
            "referenceChannel": "public",
            "propagation": { "from": "building", "to": "public" },
            "distributions": ["quantal", "precise"],
            "architectures": ["amd64"],
            "sourceArchitecture": "amd64",
            "packagePrefix": "pkg-{release}-",
            "foreignPrefixes": ["pkg-fuerte-"],
            "linkChannel": "building",
            "jobUrl": "http://jenkins/job/{release}_{column}/{pkg}",
            "columnLabels": { "quantal_amd64": "Quantal 64" }
        }))
        .unwrap();

        assert_eq!(result.reference_channel(), "public");
        assert_eq!(result.propagation_pair(), Some(("building", "public")));
        assert_eq!(result.release_prefix(), "pkg-groovy-");
        assert_eq!(result.foreign_prefixes, vec!["pkg-fuerte-"]);
        assert_eq!(
            result.column_metadata("quantal_amd64"),
            ColumnMetadata {
                label: Some("Quantal 64".to_string()),
                job_url: Some("http://jenkins/job/groovy_quantal_amd64/{pkg}".to_string()),
            }
        );
    }

    #[rstest]
    #[case(json!({"distributions": ["quantal"]}), "release must be set")]
    #[case(json!({"release": "groovy", "channels": []}), "at least one channel")]
    #[case(json!({"release": "groovy", "channels": ["a", "a"]}), "duplicate channel a")]
    #[case(json!({"release": "groovy", "referenceChannel": "nope"}), "referenceChannel")]
    #[case(json!({"release": "groovy", "linkChannel": "nope"}), "linkChannel")]
    #[case(json!({"release": "groovy", "propagation": {"from": "building", "to": "nope"}}), "propagation.to")]
    #[case(json!({"release": "groovy", "sourceArchitecture": "armhf"}), "sourceArchitecture")]
    fn status_config_validate_rejects_inconsistent_settings(
        #[case] value: serde_json::Value,
        #[case] expected_message: &str,
    ) {
        let err = config_from(value).unwrap_err();

        assert!(
            err.to_string().contains(expected_message),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn propagation_pair_is_none_with_single_channel() {
        let result = config_from(json!({"release": "groovy", "channels": ["public"]})).unwrap();

        assert_eq!(result.propagation_pair(), None);
        assert_eq!(result.reference_channel(), "public");
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/release-status"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(
            path,
            PathBuf::from("/home/user/.local/share/release-status")
        );
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./release-status"));
    }
}
