//! Connection configuration
//!
//! `config.toml` names the local instance and any number of remotes:
//!
//! ```toml
//! [local]
//! url = "http://localhost:8055"
//! token = "${DIRECTUS_TOKEN}"
//!
//! [remotes.staging]
//! url = "https://staging.example.com"
//! token = "..."
//! timeout_secs = 60
//! ```

use anyhow::{Context, Result, bail};
use reconcile::store::RestStore;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Overrides the local url from the config file
pub const ENV_LOCAL_URL: &str = "DSYNC_LOCAL_URL";
/// Overrides the local token from the config file
pub const ENV_LOCAL_TOKEN: &str = "DSYNC_LOCAL_TOKEN";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One instance to talk to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Connection {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            timeout_secs: None,
        }
    }

    /// Expand `${VAR}` references in url and token.
    pub fn resolved(&self) -> Result<Self> {
        let url = shellexpand::env(&self.url)
            .with_context(|| format!("Could not expand url '{}'", self.url))?
            .into_owned();
        let token = shellexpand::env(&self.token)
            .context("Could not expand token")?
            .into_owned();
        Ok(Self {
            url,
            token,
            timeout_secs: self.timeout_secs,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Token with everything but the last four characters hidden.
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.token.chars().collect();
        if chars.is_empty() {
            return "(none)".to_string();
        }
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }

    /// Problems that would prevent connecting.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.url.trim().is_empty() {
            problems.push("url is empty".to_string());
        } else if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            problems.push(format!("url '{}' is not http(s)", self.url));
        }
        if self.token.trim().is_empty() {
            problems.push("token is empty".to_string());
        }
        if self.timeout_secs == Some(0) {
            problems.push("timeout_secs must be greater than zero".to_string());
        }
        problems
    }

    /// Open a REST store for this connection.
    pub fn connect(&self) -> Result<RestStore> {
        let resolved = self.resolved()?;
        RestStore::connect_with_timeout(&resolved.url, &resolved.token, resolved.timeout())
            .with_context(|| format!("Could not connect to {}", resolved.url))
    }
}

/// The `config.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DsyncConfig {
    #[serde(default)]
    pub local: Option<Connection>,
    #[serde(default)]
    pub remotes: BTreeMap<String, Connection>,
}

impl DsyncConfig {
    /// Load from the config directory; a missing file is an empty config.
    pub fn load() -> Result<(Self, PathBuf)> {
        let path = paths::config_file()?;
        let config = Self::load_from(&path)?;
        Ok((config, path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// The local connection with `DSYNC_LOCAL_URL` / `DSYNC_LOCAL_TOKEN` applied.
    pub fn local_connection(&self) -> Result<Connection> {
        self.local_with_overrides(
            std::env::var(ENV_LOCAL_URL).ok(),
            std::env::var(ENV_LOCAL_TOKEN).ok(),
        )
    }

    fn local_with_overrides(&self, url: Option<String>, token: Option<String>) -> Result<Connection> {
        let mut connection = self.local.clone().unwrap_or_default();
        if let Some(url) = url {
            log::debug!("Local url from {ENV_LOCAL_URL}");
            connection.url = url;
        }
        if let Some(token) = token {
            log::debug!("Local token from {ENV_LOCAL_TOKEN}");
            connection.token = token;
        }
        if connection.url.is_empty() {
            bail!("No local instance configured. Set [local] in config.toml or {ENV_LOCAL_URL}");
        }
        Ok(connection)
    }

    /// A named remote, or an ad hoc one built from `--url`/`--token`.
    pub fn remote_connection(
        &self,
        name: Option<&str>,
        url: Option<&str>,
        token: Option<&str>,
    ) -> Result<Connection> {
        match (name, url) {
            (Some(name), _) => {
                let mut connection = self.remotes.get(name).cloned().with_context(|| {
                    let known: Vec<&str> = self.remotes.keys().map(String::as_str).collect();
                    if known.is_empty() {
                        format!("Unknown remote '{name}' (no remotes configured)")
                    } else {
                        format!("Unknown remote '{name}' (known: {})", known.join(", "))
                    }
                })?;
                if let Some(token) = token {
                    connection.token = token.to_string();
                }
                Ok(connection)
            }
            (None, Some(url)) => Ok(Connection::new(url, token.unwrap_or_default())),
            (None, None) => bail!("Specify a remote name or --url and --token"),
        }
    }

    /// Every connection with its problems; empty when the config is usable.
    pub fn validate(&self) -> Vec<(String, Vec<String>)> {
        let mut report = Vec::new();
        if let Some(local) = &self.local {
            let problems = local.problems();
            if !problems.is_empty() {
                report.push(("local".to_string(), problems));
            }
        }
        for (name, remote) in &self.remotes {
            let problems = remote.problems();
            if !problems.is_empty() {
                report.push((format!("remotes.{name}"), problems));
            }
        }
        report
    }
}
