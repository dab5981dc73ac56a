//! Plain downloads from a generic artifact service.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ArtifactConfig;
use crate::content::split_target;
use crate::destination::{basename, write_file};
use crate::error::Error;
use crate::http::{Transport, send};
use crate::plan::{Action, Auth, BodyHandling, ExecutionPlan, Provider, Request};
use crate::sanitize::redact;
use crate::source::decode_segment;

fn is_absolute_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolve a repository-relative path against the configured base URL.
pub fn artifact_url(location: &str, config: &ArtifactConfig) -> Result<String, Error> {
    let location = location.trim();
    if is_absolute_url(location) {
        url::Url::parse(location).map_err(|e| Error::invalid_source(location, e.to_string()))?;
        return Ok(location.to_string());
    }
    if let Some((scheme, _)) = location.split_once("://") {
        return Err(Error::invalid_source(
            location,
            format!("unsupported scheme '{scheme}://' for an artifact download"),
        ));
    }
    let base = config.url.as_deref().ok_or_else(|| {
        Error::invalid_source(
            location,
            "relative artifact path but no artifact base URL is configured (FETCH_ASSET_ARTIFACT_URL)",
        )
    })?;
    let relative = location.trim_start_matches('/');
    if relative.is_empty() {
        return Err(Error::invalid_source(location, "artifact path is empty"));
    }
    if relative.split('/').any(|s| s == "..") {
        return Err(Error::path_traversal(relative, redact(base).into_owned()));
    }
    Ok(format!("{}/{relative}", base.trim_end_matches('/')))
}

/// Basic when a user is configured, bearer when only a token is, anonymous otherwise.
pub fn auth(config: &ArtifactConfig) -> Auth {
    match (&config.user, &config.password, &config.token) {
        (Some(user), password, token) => Auth::Basic {
            user: user.clone(),
            password: password.clone().or_else(|| token.clone()),
        },
        (None, _, Some(token)) => Auth::Bearer(token.clone()),
        (None, _, None) => Auth::None,
    }
}

/// One artifact download into a destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDownload {
    pub request: Request,
    pub target: PathBuf,
}

impl ArtifactDownload {
    pub fn new(location: &str, dest_root: &Path, config: &ArtifactConfig) -> Result<Self, Error> {
        let url = artifact_url(location, config)?;
        let path = url::Url::parse(&url)
            .map(|u| u.path().to_string())
            .map_err(|e| Error::invalid_source(&url, e.to_string()))?;
        let name = basename(&path)
            .map(|name| decode_segment(&url, name))
            .transpose()?
            .filter(|name| basename(name) == Some(name.as_str()) && !name.contains('\\'))
            .ok_or_else(|| Error::invalid_source(&url, "URL does not name a file"))?;
        Ok(Self {
            target: dest_root.join(name),
            request: Request {
                url,
                auth: auth(config),
                body: BodyHandling::WriteFile,
            },
        })
    }

    pub fn plan(&self) -> ExecutionPlan {
        ExecutionPlan {
            provider: Provider::Artifact,
            target: self.target.clone(),
            action: Action::Request(self.request.clone()),
        }
    }

    pub fn run(&self, transport: &dyn Transport, deadline: Option<Instant>) -> Result<PathBuf, Error> {
        tracing::info!(url = %redact(&self.request.url), "downloading artifact");
        let mut response = send(transport, &self.request, deadline)?;
        let (dir, name) = split_target(&self.target)?;
        write_file(dir, name, &mut response.body, &self.request.url)
    }
}
