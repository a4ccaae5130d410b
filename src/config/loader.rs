use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::AppConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "meridian.toml",
    "config/meridian.toml",
    "meridian.yaml",
    "config/meridian.yaml",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let candidate_paths = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<PathBuf>>(),
    };

    for candidate in candidate_paths {
        if let Some(config) = try_load_file(&candidate)? {
            return Ok(config);
        }
    }

    Ok(AppConfig::default())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn try_load_file(path: &Path) -> Result<Option<AppConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: AppConfig = if is_yaml(path) {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?
    };

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::gas::Urgency;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(Some(dir.path().join("absent.toml"))).expect("defaults");
        assert_eq!(config.quote.debounce_ms, 300);
        assert_eq!(config.quote.refresh_interval_ms, 5_000);
        assert_eq!(config.tvl.retries, 3);
    }

    #[test]
    fn toml_overrides_are_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("meridian.toml");
        let mut file = fs::File::create(&path).expect("create");
        writeln!(
            file,
            "[quote]\ndebounce_ms = 150\n\n[orchestrator]\ndeposit_urgency = \"very_high\"\n"
        )
        .expect("write");

        let config = load_config(Some(path)).expect("load");
        assert_eq!(config.quote.debounce_ms, 150);
        assert_eq!(config.quote.refresh_interval_ms, 5_000);
        assert_eq!(config.orchestrator.deposit_urgency, Urgency::VeryHigh);
    }

    #[test]
    fn yaml_is_selected_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("meridian.yaml");
        fs::write(&path, "tvl:\n  ttl_secs: 5\n  retries: 1\n").expect("write");

        let config = load_config(Some(path)).expect("load");
        assert_eq!(config.tvl.ttl_secs, 5);
        assert_eq!(config.tvl.retries, 1);
        assert_eq!(config.tvl.initial_delay_ms, 1_000);
    }

    #[test]
    fn broken_toml_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[quote\n").expect("write");
        let err = load_config(Some(path.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
