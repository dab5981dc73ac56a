//! Configuration captured once at the process boundary and threaded through the resolver and the
//! strategies.
//!
//! Layers, lowest to highest precedence: [`FetchConfig::default`], a TOML file
//! ([`FetchConfig::from_toml_str`]), the environment ([`FetchConfig::from_lookup`]) and explicit
//! overrides. Combine layers with [`FetchConfig::overlay`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_HOST: &str = "gitlab.com";
pub const DEFAULT_SSH_USER: &str = "git";
pub const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";
pub const API_SUFFIX: &str = "/api/v4";

/// Transport used when a shorthand source is expanded into a clone address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ssh,
    Https,
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Self::Ssh),
            "https" => Ok(Self::Https),
            other => Err(Error::Config(format!(
                "unknown protocol '{other}': expected 'ssh' or 'https'"
            ))),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// Location and credentials of the generic artifact service.
#[derive(Default, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactConfig {
    pub url: Option<String>,
    pub user: Option<String>,
    pub token: Option<String>,
    pub password: Option<String>,
}

/// Every option the resolver and the strategies read. Unset fields fall back to the documented
/// defaults through the accessor methods.
#[derive(Default, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub git_binary: Option<PathBuf>,
    pub host: Option<String>,
    pub protocol: Option<Protocol>,
    pub ssh_user: Option<String>,
    pub token: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: Option<u64>,
    pub artifact: ArtifactConfig,
}

fn overlay_opt<T>(low: Option<T>, high: Option<T>) -> Option<T> {
    high.or(low)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    })
}

impl FetchConfig {
    /// Parse a TOML configuration document.
    pub fn from_toml_str<S: AsRef<str>>(document: S) -> Result<Self, Error> {
        Ok(toml::from_str(document.as_ref())?)
    }

    /// Read a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let document = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(document)
    }

    /// Capture configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        let protocol = get("FETCH_ASSET_GIT_PROTO")
            .map(|p| p.parse::<Protocol>())
            .transpose()?;
        let timeout_secs = get("FETCH_ASSET_TIMEOUT")
            .map(|t| {
                t.parse::<u64>().map_err(|_| {
                    Error::Config(format!("FETCH_ASSET_TIMEOUT must be whole seconds, got '{t}'"))
                })
            })
            .transpose()?;
        Ok(Self {
            git_binary: get("FETCH_ASSET_GIT_BINARY")
                .or_else(|| get("GIT_BINARY"))
                .map(PathBuf::from),
            host: get("FETCH_ASSET_GIT_HOST"),
            protocol,
            ssh_user: get("FETCH_ASSET_GIT_USER"),
            token: get("FETCH_ASSET_TOKEN").or_else(|| get("GITLAB_TOKEN")),
            api_base: get("FETCH_ASSET_API_BASE"),
            timeout_secs,
            artifact: ArtifactConfig {
                url: get("FETCH_ASSET_ARTIFACT_URL"),
                user: get("FETCH_ASSET_ARTIFACT_USER"),
                token: get("FETCH_ASSET_ARTIFACT_TOKEN"),
                password: get("FETCH_ASSET_ARTIFACT_PASSWORD"),
            },
        })
    }

    /// Combine two layers; every field set in `higher` wins.
    pub fn overlay(self, higher: FetchConfig) -> FetchConfig {
        FetchConfig {
            git_binary: overlay_opt(self.git_binary, higher.git_binary),
            host: overlay_opt(self.host, higher.host),
            protocol: overlay_opt(self.protocol, higher.protocol),
            ssh_user: overlay_opt(self.ssh_user, higher.ssh_user),
            token: overlay_opt(self.token, higher.token),
            api_base: overlay_opt(self.api_base, higher.api_base),
            timeout_secs: overlay_opt(self.timeout_secs, higher.timeout_secs),
            artifact: ArtifactConfig {
                url: overlay_opt(self.artifact.url, higher.artifact.url),
                user: overlay_opt(self.artifact.user, higher.artifact.user),
                token: overlay_opt(self.artifact.token, higher.artifact.token),
                password: overlay_opt(self.artifact.password, higher.artifact.password),
            },
        }
    }

    /// The configured host with any scheme and trailing slash removed.
    pub fn host(&self) -> &str {
        match self.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => {
                let host = host
                    .strip_prefix("https://")
                    .or_else(|| host.strip_prefix("http://"))
                    .unwrap_or(host);
                host.trim_end_matches('/')
            }
            _ => DEFAULT_HOST,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or_default()
    }

    pub fn ssh_user(&self) -> &str {
        self.ssh_user.as_deref().unwrap_or(DEFAULT_SSH_USER)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// The git executable: the configured path, else the first `git` on `PATH`, else the bare name
    /// (so that a missing binary surfaces when the process is spawned).
    pub fn git_binary(&self) -> PathBuf {
        self.git_binary
            .clone()
            .or_else(|| which::which("git").ok())
            .unwrap_or_else(|| PathBuf::from("git"))
    }

    /// The REST API base derived from configuration alone.
    ///
    /// Precedence: explicit override verbatim, then the configured host (scheme kept when present,
    /// https assumed otherwise) with the API suffix appended, then the public default.
    pub fn api_base(&self) -> String {
        if let Some(base) = non_empty(self.api_base.clone()) {
            return base.trim_end_matches('/').to_string();
        }
        match non_empty(self.host.clone()) {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                match url::Url::parse(&host) {
                    Ok(parsed) => {
                        let origin = parsed.origin().ascii_serialization();
                        let path = parsed.path().trim_end_matches('/');
                        format!("{origin}{path}{API_SUFFIX}")
                    }
                    Err(_) => format!("{}{API_SUFFIX}", host.trim_end_matches('/')),
                }
            }
            Some(host) => format!("https://{}{API_SUFFIX}", host.trim_end_matches('/')),
            None => DEFAULT_API_BASE.to_string(),
        }
    }
}

fn secret(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for ArtifactConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactConfig")
            .field("url", &self.url.as_deref().map(crate::redact))
            .field("user", &self.user)
            .field("token", &secret(&self.token))
            .field("password", &secret(&self.password))
            .finish()
    }
}

impl std::fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchConfig")
            .field("git_binary", &self.git_binary)
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("ssh_user", &self.ssh_user)
            .field("token", &secret(&self.token))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("artifact", &self.artifact)
            .finish()
    }
}

#[cfg(test)]
mod test_api_base {
    use super::*;

    fn with_host(host: &str) -> FetchConfig {
        FetchConfig {
            host: Some(host.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn explicit_override_is_used_verbatim() {
        let config = FetchConfig {
            api_base: Some("https://git.myco.local/custom/api/v4/".into()),
            host: Some("ignored.example".into()),
            ..Default::default()
        };
        assert_eq!(config.api_base(), "https://git.myco.local/custom/api/v4");
    }

    #[test]
    fn host_with_scheme_keeps_scheme_and_path() {
        assert_eq!(
            with_host("http://git.local:8080/gitlab/").api_base(),
            "http://git.local:8080/gitlab/api/v4"
        );
    }

    #[test]
    fn host_without_scheme_assumes_https() {
        assert_eq!(
            with_host("git.private.example").api_base(),
            "https://git.private.example/api/v4"
        );
    }

    #[test]
    fn default_is_public_host() {
        assert_eq!(FetchConfig::default().api_base(), DEFAULT_API_BASE);
    }
}
