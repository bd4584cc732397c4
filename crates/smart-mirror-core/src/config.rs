use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(std::io::Error),
    #[error("failed to write config file: {0}")]
    Write(std::io::Error),
    #[error("failed to parse toml: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize toml: {0}")]
    Serialize(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub mirror: MirrorSection,
    #[serde(default)]
    pub archive: ArchiveSection,
    #[serde(default)]
    pub popcon: PopconSection,
    #[serde(default)]
    pub http: HttpSection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSource {
    pub release: String,
    pub category: String,
    pub architecture: String,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config = toml::from_str(&content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(ConfigError::Write)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mirror.url.trim().is_empty() {
            return Err(ConfigError::Invalid("mirror.url is empty".to_string()));
        }
        if self.archive.releases.is_empty() {
            return Err(ConfigError::Invalid("archive.releases is empty".to_string()));
        }
        if self.archive.architectures.is_empty() {
            return Err(ConfigError::Invalid(
                "archive.architectures is empty".to_string(),
            ));
        }
        if self.archive.categories.is_empty() {
            return Err(ConfigError::Invalid(
                "archive.categories is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mirror_base(&self) -> String {
        with_trailing_slash(&self.mirror.url)
    }

    pub fn packages_url(&self, release: &str, category: &str, architecture: &str) -> String {
        format!(
            "{}dists/{}/{}/binary-{}/Packages.bz2",
            self.mirror_base(),
            release,
            category,
            architecture
        )
    }

    pub fn popcon_url(&self, category: &str) -> String {
        format!("{}{}/by_inst.gz", with_trailing_slash(&self.popcon.url), category)
    }

    // Release outermost, architecture innermost.
    pub fn index_sources(&self) -> Vec<IndexSource> {
        let mut sources = Vec::new();
        for release in &self.archive.releases {
            for category in &self.archive.categories {
                for architecture in &self.archive.architectures {
                    sources.push(IndexSource {
                        release: release.clone(),
                        category: category.clone(),
                        architecture: architecture.clone(),
                    });
                }
            }
        }
        sources
    }
}

fn with_trailing_slash(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MirrorSection {
    pub url: String,
}

impl Default for MirrorSection {
    fn default() -> Self {
        MirrorSection {
            url: "http://mirror.aarnet.edu.au/pub/ubuntu/archive/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveSection {
    pub releases: Vec<String>,
    pub architectures: Vec<String>,
    pub categories: Vec<String>,
}

impl Default for ArchiveSection {
    fn default() -> Self {
        ArchiveSection {
            releases: vec![
                "precise-updates".to_string(),
                "precise-security".to_string(),
                "precise".to_string(),
            ],
            architectures: vec!["i386".to_string(), "amd64".to_string()],
            categories: vec!["main".to_string(), "universe".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopconSection {
    pub url: String,
    /// Per-category minimum; a package must strictly exceed it.
    #[serde(default)]
    pub thresholds: IndexMap<String, i64>,
}

impl Default for PopconSection {
    fn default() -> Self {
        let mut thresholds = IndexMap::new();
        thresholds.insert("main".to_string(), 5000);
        thresholds.insert("universe".to_string(), 10000);
        PopconSection {
            url: "http://popcon.ubuntu.com/".to_string(),
            thresholds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpSection {
    pub timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        HttpSection { timeout_secs: 30 }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, ConfigError};

    #[test]
    fn config_round_trip() {
        let mut config = Config::default();
        config.archive.releases = vec!["noble".to_string()];
        config.popcon.thresholds.insert("multiverse".to_string(), 100);

        let toml = toml::to_string(&config).expect("serialize failed");
        let decoded: Config = toml::from_str(&toml).expect("deserialize failed");
        assert_eq!(config, decoded);
    }

    #[test]
    fn partial_config_uses_section_defaults() {
        let config: Config = toml::from_str(
            r#"
            [mirror]
            url = "http://mirror.example"
            "#,
        )
        .expect("deserialize failed");
        assert_eq!(config.mirror_base(), "http://mirror.example/");
        assert_eq!(config.archive.categories, vec!["main", "universe"]);
        assert_eq!(config.popcon.thresholds.get("main"), Some(&5000));
        assert_eq!(config.popcon.thresholds.get("universe"), Some(&10000));
    }

    #[test]
    fn thresholds_keep_file_order() {
        let config: Config = toml::from_str(
            r#"
            [popcon]
            url = "http://popcon.example/"
            [popcon.thresholds]
            universe = 1
            main = 2
            "#,
        )
        .expect("deserialize failed");
        let keys: Vec<&str> = config.popcon.thresholds.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["universe", "main"]);
    }

    #[test]
    fn builds_archive_urls() {
        let config = Config::default();
        assert_eq!(
            config.packages_url("precise", "main", "amd64"),
            "http://mirror.aarnet.edu.au/pub/ubuntu/archive/dists/precise/main/binary-amd64/Packages.bz2"
        );
        assert_eq!(
            config.popcon_url("universe"),
            "http://popcon.ubuntu.com/universe/by_inst.gz"
        );
    }

    #[test]
    fn index_sources_iterate_release_outermost() {
        let config = Config::default();
        let sources = config.index_sources();
        assert_eq!(sources.len(), 12);
        assert_eq!(sources[0].release, "precise-updates");
        assert_eq!(sources[0].category, "main");
        assert_eq!(sources[0].architecture, "i386");
        assert_eq!(sources[1].architecture, "amd64");
        assert_eq!(sources[2].category, "universe");
        assert_eq!(sources[11].release, "precise");
    }

    #[test]
    fn validate_rejects_empty_mirror() {
        let mut config = Config::default();
        config.mirror.url = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(Config::default().validate().is_ok());
    }
}
