use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_TOKEN_VAR: &str = "PANTRY_API_TOKEN";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Which `InventoryApi` implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Http,
    Local,
}

/// How concurrent mutations of the same item are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Mutations interleave freely; a refetch after each consumption
    /// settles the displayed values.
    #[default]
    Eventual,
    /// One in-flight mutation per `(container, item)` at a time.
    Serialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub consistency: Consistency,
    /// Environment variable the bearer token is read from before each call.
    pub token_var: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Http,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            consistency: Consistency::Eventual,
            token_var: DEFAULT_TOKEN_VAR.to_string(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides:
    /// - `PANTRY_API_BACKEND` (`http` or `local`)
    /// - `PANTRY_API_URL`
    /// - `PANTRY_API_TIMEOUT_SECS`
    /// - `PANTRY_CONSISTENCY` (`eventual` or `serialized`)
    /// - `PANTRY_API_TOKEN_VAR`
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("failed to read config {}: {e}", path.display())
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("PANTRY_API_BACKEND") {
            self.backend = match v.to_ascii_lowercase().as_str() {
                "http" => Backend::Http,
                "local" => Backend::Local,
                other => anyhow::bail!("unknown PANTRY_API_BACKEND: {other}"),
            };
        }
        if let Some(v) = var("PANTRY_API_URL")
            && !v.trim().is_empty()
        {
            self.api_url = v.trim().to_string();
        }
        if let Some(v) = var("PANTRY_API_TIMEOUT_SECS") {
            self.request_timeout_secs = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PANTRY_API_TIMEOUT_SECS {v:?}: {e}"))?;
        }
        if let Some(v) = var("PANTRY_CONSISTENCY") {
            self.consistency = match v.to_ascii_lowercase().as_str() {
                "eventual" => Consistency::Eventual,
                "serialized" => Consistency::Serialized,
                other => anyhow::bail!("unknown PANTRY_CONSISTENCY: {other}"),
            };
        }
        if let Some(v) = var("PANTRY_API_TOKEN_VAR")
            && !v.trim().is_empty()
        {
            self.token_var = v.trim().to_string();
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = Config::from_toml(
            r#"
            api_url = "https://pantry.example/api"
            consistency = "serialized"
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            Config {
                api_url: "https://pantry.example/api".to_string(),
                consistency: Consistency::Serialized,
                ..Config::default()
            }
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("PANTRY_API_BACKEND", "local"),
            ("PANTRY_API_TIMEOUT_SECS", "3"),
            ("PANTRY_API_TOKEN_VAR", "MY_TOKEN"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.token_var, "MY_TOKEN");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "PANTRY_CONSISTENCY").then(|| "strict".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PANTRY_CONSISTENCY"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pantry.toml");
        std::fs::write(&path, "request_timeout_secs = 30\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        if std::env::var_os("PANTRY_API_TIMEOUT_SECS").is_none() {
            assert_eq!(config.request_timeout_secs, 30);
        }
    }
}
