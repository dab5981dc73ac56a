//! The entry point: resolve a source, select a strategy and run it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::artifact::ArtifactDownload;
use crate::config::FetchConfig;
use crate::content::ContentFetch;
use crate::destination::prepare_root;
use crate::error::Error;
use crate::git::GitClone;
use crate::http::{ReqwestTransport, Transport};
use crate::plan::{ExecutionPlan, Provider};
use crate::process::{ProcessRunner, SystemRunner};
use crate::source::{ContentKind, SourceDescriptor, SourceKind};

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub destination: PathBuf,
    /// Branch or tag, overriding a ref embedded in the source.
    pub git_ref: Option<String>,
    /// Inferred from the source when absent.
    pub provider: Option<Provider>,
    pub content_kind: Option<ContentKind>,
    pub deadline: Option<Instant>,
}

impl FetchOptions {
    pub fn new<P: Into<PathBuf>>(destination: P) -> Self {
        Self {
            destination: destination.into(),
            git_ref: None,
            provider: None,
            content_kind: None,
            deadline: None,
        }
    }

    pub fn with_ref<S: Into<String>>(mut self, git_ref: S) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_content_kind(mut self, kind: ContentKind) -> Self {
        self.content_kind = Some(kind);
        self
    }

    /// Set the deadline `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

/// The provider used for `source` when none is requested.
pub fn infer_provider(source: &SourceDescriptor) -> Provider {
    match source.kind {
        SourceKind::DirectUrl | SourceKind::Scp | SourceKind::Shorthand => Provider::Git,
        SourceKind::ArchiveUri => Provider::Content,
    }
}

enum Strategy {
    Clone(GitClone),
    Content(ContentFetch),
    Artifact(ArtifactDownload),
}

/// Fetches sources with a fixed configuration and backends.
pub struct Fetcher {
    config: FetchConfig,
    transport: Box<dyn Transport>,
    runner: Box<dyn ProcessRunner>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// A fetcher using the network and the host's git.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        Ok(Self::with_backends(
            config,
            Box::new(ReqwestTransport::new()?),
            Box::new(SystemRunner),
        ))
    }

    pub fn with_backends(
        config: FetchConfig,
        transport: Box<dyn Transport>,
        runner: Box<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config,
            transport,
            runner,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Parse `source` with this fetcher's configuration.
    pub fn resolve(&self, source: &str) -> Result<SourceDescriptor, Error> {
        SourceDescriptor::resolve(source, &self.config).map_err(Error::redacted)
    }

    /// What [`Fetcher::fetch`] would do, without touching the destination.
    pub fn plan(&self, source: &str, options: &FetchOptions) -> Result<ExecutionPlan, Error> {
        let root = std::path::absolute(&options.destination)?;
        let plan = match self.strategy(source, options, &root).map_err(Error::redacted)? {
            Strategy::Clone(clone) => clone.plan(self.config.git_binary()),
            Strategy::Content(content) => content.plan(),
            Strategy::Artifact(download) => download.plan(),
        };
        Ok(plan)
    }

    /// Fetch `source` into `options.destination`, returning the path holding the result.
    ///
    /// Every returned error has been passed through [`crate::redact`].
    pub fn fetch(&self, source: &str, options: &FetchOptions) -> Result<PathBuf, Error> {
        self.fetch_unredacted(source, options)
            .map_err(Error::redacted)
    }

    fn fetch_unredacted(&self, source: &str, options: &FetchOptions) -> Result<PathBuf, Error> {
        let deadline = options.deadline.or_else(|| {
            self.config
                .timeout()
                .map(|timeout| Instant::now() + timeout)
        });
        let root = std::path::absolute(&options.destination)?;
        let strategy = self.strategy(source, options, &root)?;
        prepare_root(&root)?;
        match strategy {
            Strategy::Clone(clone) => {
                clone.run(self.config.git_binary(), self.runner.as_ref(), deadline)
            }
            Strategy::Content(content) => content.run(self.transport.as_ref(), deadline),
            Strategy::Artifact(download) => download.run(self.transport.as_ref(), deadline),
        }
    }

    fn strategy(&self, source: &str, options: &FetchOptions, root: &Path) -> Result<Strategy, Error> {
        let artifact = || -> Result<Strategy, Error> {
            Ok(Strategy::Artifact(ArtifactDownload::new(
                source,
                root,
                &self.config.artifact,
            )?))
        };
        if options.provider == Some(Provider::Artifact) {
            tracing::debug!("artifact provider requested, skipping source resolution");
            return artifact();
        }
        let descriptor = SourceDescriptor::resolve(source, &self.config)?
            .with_content_kind(options.content_kind);
        let provider = options.provider.unwrap_or_else(|| infer_provider(&descriptor));
        tracing::debug!(source = %descriptor, %provider, "resolved");
        let git_ref = options.git_ref.as_deref();
        match provider {
            Provider::Git => Ok(Strategy::Clone(GitClone::new(
                &descriptor.normalized_address,
                git_ref.or(descriptor.git_ref.as_deref()),
                root,
            )?)),
            Provider::Content => Ok(Strategy::Content(ContentFetch::new(
                &descriptor,
                git_ref,
                root,
                &self.config,
            )?)),
            Provider::Artifact => artifact(),
        }
    }
}

#[cfg(test)]
mod test_infer {
    use super::*;

    fn provider_for(source: &str) -> Provider {
        infer_provider(&SourceDescriptor::resolve(source, &FetchConfig::default()).unwrap())
    }

    #[test]
    fn clone_sources_default_to_git() {
        assert_eq!(provider_for("https://h/ns/repo.git"), Provider::Git);
        assert_eq!(provider_for("git@h:ns/repo.git"), Provider::Git);
        assert_eq!(provider_for("ns/repo"), Provider::Git);
    }

    #[test]
    fn archive_scheme_defaults_to_content() {
        assert_eq!(provider_for("gitlab://ns/repo@main//docs"), Provider::Content);
    }

    #[test]
    fn options_builder() {
        let options = FetchOptions::new("/tmp/x")
            .with_ref("main")
            .with_provider(Provider::Content)
            .with_content_kind(ContentKind::Dir)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(options.git_ref.as_deref(), Some("main"));
        assert!(options.deadline.is_some());
    }
}
