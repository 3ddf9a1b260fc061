//! Settings file and profile resolution.
//!
//! The settings file is YAML:
//!
//! ```yaml
//! current_profile: default
//! profiles:
//!   default:
//!     endpoint: https://terrapin.example.com
//! run:
//!   poll_interval_ms: 1000
//!   wait_timeout_secs: 3600
//!   log_chunk_size: 65536
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Service name under which API tokens are stored in the OS keychain.
pub const KEYRING_SERVICE: &str = "terrapin";

const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("profile '{0}' is not defined in the settings file")]
    UnknownProfile(String),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrapinConfig {
    pub current_profile: Option<String>,
    pub profiles: BTreeMap<String, Profile>,
    pub run: RunConfig,
}

/// Connection settings for one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Timing knobs for the run lifecycle, as written in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub poll_interval_ms: u64,
    /// 0 disables the deadline.
    pub wait_timeout_secs: u64,
    pub log_chunk_size: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            wait_timeout_secs: 3600,
            log_chunk_size: 64 * 1024,
        }
    }
}

impl RunConfig {
    /// Validates the raw values and converts them for one invocation.
    pub fn to_settings(&self) -> Result<RunSettings, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "run.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.log_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "run.log_chunk_size must be greater than zero".to_string(),
            ));
        }

        Ok(RunSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            wait_timeout: (self.wait_timeout_secs > 0)
                .then(|| Duration::from_secs(self.wait_timeout_secs)),
            log_chunk_size: self.log_chunk_size,
        })
    }
}

/// Immutable run lifecycle settings for a single command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub poll_interval: Duration,
    pub wait_timeout: Option<Duration>,
    pub log_chunk_size: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            wait_timeout: Some(Duration::from_secs(3600)),
            log_chunk_size: 64 * 1024,
        }
    }
}

/// Profile-related environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileEnv {
    /// `TERRAPIN_PROFILE`
    pub profile: Option<String>,
    /// `TERRAPIN_ENDPOINT`
    pub endpoint: Option<String>,
    /// `TERRAPIN_TOKEN`
    pub token: Option<String>,
}

impl ProfileEnv {
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            profile: var("TERRAPIN_PROFILE"),
            endpoint: var("TERRAPIN_ENDPOINT"),
            token: var("TERRAPIN_TOKEN"),
        }
    }
}

/// The profile a command talks to, after overrides.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub name: String,
    pub endpoint: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for ResolvedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProfile")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "****"))
            .finish()
    }
}

impl TerrapinConfig {
    /// Default settings location: `$HOME/.terrapin/settings.yml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(".terrapin").join("settings.yml"))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Picks the active profile and applies environment overrides.
    ///
    /// Profile name precedence: `requested` (the `--profile` flag), then
    /// `TERRAPIN_PROFILE`, then `current_profile`, then `default`. The token
    /// comes from `TERRAPIN_TOKEN`, then the profile, then `keychain`.
    pub fn resolve_profile(
        &self,
        requested: Option<&str>,
        env: &ProfileEnv,
        keychain: impl FnOnce(&str) -> Option<String>,
    ) -> Result<ResolvedProfile, ConfigError> {
        let name = requested
            .map(str::to_string)
            .or_else(|| env.profile.clone())
            .or_else(|| self.current_profile.clone())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let profile = self.profiles.get(&name);
        let endpoint = match (env.endpoint.as_ref(), profile) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(profile)) => profile.endpoint.clone(),
            (None, None) => return Err(ConfigError::UnknownProfile(name)),
        };
        if endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "profile '{name}' has no endpoint"
            )));
        }

        let token = env
            .token
            .clone()
            .or_else(|| profile.and_then(|p| p.token.clone()))
            .or_else(|| keychain(&name));

        debug!(
            profile = %name,
            endpoint = %endpoint,
            has_token = token.is_some(),
            "Resolved profile"
        );

        Ok(ResolvedProfile {
            name,
            endpoint,
            token,
        })
    }
}

/// Looks up a stored API token for `profile` in the OS keychain.
pub fn keychain_token(profile: &str) -> Option<String> {
    let entry = match keyring::Entry::new(KEYRING_SERVICE, profile) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Keychain unavailable: {}", e);
            return None;
        }
    };
    match entry.get_password() {
        Ok(token) => Some(token),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            debug!(profile, "Failed to read token from keychain: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r"
current_profile: staging
profiles:
  staging:
    endpoint: https://staging.example.com
    token: staging-token
  prod:
    endpoint: https://prod.example.com
run:
  poll_interval_ms: 250
  wait_timeout_secs: 0
";

    fn no_keychain(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_settings_with_partial_run_section() {
        let config = TerrapinConfig::parse_yaml(SETTINGS).unwrap();
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.run.poll_interval_ms, 250);
        assert_eq!(config.run.log_chunk_size, 64 * 1024);
    }

    #[test]
    fn empty_settings_use_defaults() {
        let config = TerrapinConfig::parse_yaml("{}").unwrap();
        assert_eq!(config, TerrapinConfig::default());
        assert_eq!(config.run.to_settings().unwrap(), RunSettings::default());
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = TerrapinConfig::parse_yaml(SETTINGS).unwrap();
        let settings = config.run.to_settings().unwrap();
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.wait_timeout, None);
    }

    #[test]
    fn zero_poll_interval_is_invalid() {
        let run = RunConfig {
            poll_interval_ms: 0,
            ..RunConfig::default()
        };
        assert!(matches!(run.to_settings(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn current_profile_is_the_fallback() {
        let config = TerrapinConfig::parse_yaml(SETTINGS).unwrap();
        let profile = config
            .resolve_profile(None, &ProfileEnv::default(), no_keychain)
            .unwrap();
        assert_eq!(profile.name, "staging");
        assert_eq!(profile.endpoint, "https://staging.example.com");
        assert_eq!(profile.token.as_deref(), Some("staging-token"));
    }

    #[test]
    fn flag_beats_environment_profile() {
        let config = TerrapinConfig::parse_yaml(SETTINGS).unwrap();
        let env = ProfileEnv {
            profile: Some("staging".to_string()),
            ..Default::default()
        };
        let profile = config
            .resolve_profile(Some("prod"), &env, |_| Some("from-keychain".to_string()))
            .unwrap();
        assert_eq!(profile.name, "prod");
        assert_eq!(profile.token.as_deref(), Some("from-keychain"));
    }

    #[test]
    fn environment_overrides_endpoint_and_token() {
        let config = TerrapinConfig::parse_yaml(SETTINGS).unwrap();
        let env = ProfileEnv {
            profile: None,
            endpoint: Some("http://localhost:8000".to_string()),
            token: Some("env-token".to_string()),
        };
        let profile = config.resolve_profile(None, &env, no_keychain).unwrap();
        assert_eq!(profile.endpoint, "http://localhost:8000");
        assert_eq!(profile.token.as_deref(), Some("env-token"));
    }

    #[test]
    fn unknown_profile_without_endpoint_override_fails() {
        let config = TerrapinConfig::parse_yaml(SETTINGS).unwrap();
        let err = config
            .resolve_profile(Some("missing"), &ProfileEnv::default(), no_keychain)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(name) if name == "missing"));
    }

    #[test]
    fn debug_output_masks_token() {
        let profile = ResolvedProfile {
            name: "prod".to_string(),
            endpoint: "https://prod.example.com".to_string(),
            token: Some("secret".to_string()),
        };
        let rendered = format!("{profile:?}");
        assert!(!rendered.contains("secret"));
    }
}
