use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "hgss.config.json";

/// HGSS configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Mirrors to maintain (e.g., "geojson", "kml")
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,

    /// Directory mirrors are written to
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Indent JSON output
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_formats() -> Vec<String> {
    vec!["geojson".to_string(), "kml".to_string()]
}

fn default_out_dir() -> String {
    "mirrors".to_string()
}

fn default_pretty() -> bool {
    true
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Absolute path of the mirror directory
    pub fn get_out_dir(&self, cwd: &str) -> PathBuf {
        PathBuf::from(cwd).join(&self.out_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            out_dir: default_out_dir(),
            pretty: default_pretty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "formats": ["kml"],
            "outDir": "dist/maps",
            "pretty": false
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.formats, vec!["kml"]);
        assert_eq!(config.out_dir, "dist/maps");
        assert!(!config.pretty);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "outDir": "out" }"#).unwrap();
        assert_eq!(config.formats, vec!["geojson", "kml"]);
        assert_eq!(config.out_dir, "out");
        assert!(config.pretty);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().display().to_string();

        assert_eq!(Config::load(&cwd).unwrap(), Config::default());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "formats": ["geojson"] }"#,
        )
        .unwrap();
        let config = Config::load(&cwd).unwrap();
        assert_eq!(config.formats, vec!["geojson"]);
        assert_eq!(config.get_out_dir(&cwd), dir.path().join("mirrors"));
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "{ formats").unwrap();

        assert!(Config::load(&dir.path().display().to_string()).is_err());
    }
}
