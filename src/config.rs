use std::collections::HashSet;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// A connector application and the domains whose addresses belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// How destinations without local evidence get attested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofMode {
    Dns,
    AllowAll,
    DenyAll,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub apps: Vec<AppConfig>,
    pub proof: ProofMode,
    /// Set `clear` on the first response to each peer.
    pub announce_clear: bool,
    pub proof_timeout_ms: u64,
    pub max_proof_fqdns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apps: Vec::new(),
            proof: ProofMode::Dns,
            announce_clear: true,
            proof_timeout_ms: 5_000,
            max_proof_fqdns: 8,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// Defaults, then `connector.toml`, `connector.json` and `CONNECTOR_*`.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("connector.toml"))
            .merge(Json::file("connector.json"))
            .merge(Env::prefixed("CONNECTOR_"))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            if app.name.is_empty() {
                anyhow::bail!("App with empty name");
            }
            if !seen.insert(app.name.as_str()) {
                anyhow::bail!("Duplicate app: {}", app.name);
            }
        }
        if self.proof_timeout_ms == 0 {
            anyhow::bail!("proof_timeout_ms must be positive");
        }
        if self.max_proof_fqdns == 0 {
            anyhow::bail!("max_proof_fqdns must be positive");
        }
        Ok(())
    }

    pub fn proof_timeout(&self) -> Duration {
        Duration::from_millis(self.proof_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> anyhow::Result<Config> {
        Config::from_figment(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
    }

    #[test]
    fn defaults() {
        let config = from_toml("").unwrap();
        assert!(config.apps.is_empty());
        assert_eq!(config.proof, ProofMode::Dns);
        assert!(config.announce_clear);
        assert_eq!(config.proof_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_proof_fqdns, 8);
    }

    #[test]
    fn file_overrides_defaults() {
        let config = from_toml(
            r#"
            proof = "allow_all"
            announce_clear = false
            proof_timeout_ms = 250

            [[apps]]
            name = "web"
            domains = ["example.com"]
            "#,
        )
        .unwrap();
        assert_eq!(config.proof, ProofMode::AllowAll);
        assert!(!config.announce_clear);
        assert_eq!(config.proof_timeout(), Duration::from_millis(250));
        assert_eq!(
            config.apps,
            vec![AppConfig {
                name: "web".into(),
                domains: vec!["example.com".into()],
            }]
        );
    }

    #[test]
    fn rejects_duplicate_apps() {
        let err = from_toml(
            r#"
            [[apps]]
            name = "web"
            [[apps]]
            name = "web"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate app"));
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(from_toml("proof_timeout_ms = 0").is_err());
        assert!(from_toml("max_proof_fqdns = 0").is_err());
    }
}
