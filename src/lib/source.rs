//! Parsing of raw source identifiers into a typed [`SourceDescriptor`].
//!
//! Recognised forms, tried in order (first match wins):
//!
//! 1. `http://`, `https://`, `ssh://` URLs and `git@host:path` SCP addresses, passed through as-is.
//! 2. The archive scheme [`ARCHIVE_SCHEME`], either wrapping a web URL
//!    (`gitlab://https://host/group/repo/-/tree/<ref>/<path>`) or in the compact form
//!    `gitlab://<namespace>/<repo>[@<ref>][//<path>]`.
//! 3. A bare `namespace/repo` shorthand, expanded with the configured host, protocol and user.
//!
//! Anything else, including every other `scheme://`, is rejected before any I/O happens.

use crate::config::{FetchConfig, Protocol};
use crate::error::Error;

/// Prefix of the archive-browsing scheme.
pub const ARCHIVE_SCHEME: &str = "gitlab://";

const PASSTHROUGH_URL_PREFIXES: &[&str] = &["http://", "https://", "ssh://"];
const SCP_PREFIX: &str = "git@";

/// The grammar a source identifier was recognised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DirectUrl,
    Scp,
    Shorthand,
    ArchiveUri,
}

/// What a content retrieval should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// The whole repository tree.
    Repo,
    /// A sub-directory, flattened into the destination.
    Dir,
    /// A single file.
    File,
}

impl ContentKind {
    /// Guess the kind of a sub-path: a final segment containing a `.` is taken to be a file.
    ///
    /// This is imprecise for directories with dots in their names (`v1.2/`), which is why an
    /// explicit kind always takes precedence.
    pub fn infer(sub_path: &str) -> Self {
        match sub_path.rsplit('/').next() {
            Some(last) if last.contains('.') => Self::File,
            _ => Self::Dir,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo => write!(f, "repo"),
            Self::Dir => write!(f, "dir"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A source identifier resolved against configuration defaults.
///
/// Serializes with both addresses passed through [`crate::redact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub raw_input: String,
    /// A valid URL or SCP address usable as a clone remote.
    pub normalized_address: String,
    pub namespace: Option<String>,
    pub repo: Option<String>,
    pub git_ref: Option<String>,
    /// Relative, without leading slash or `..` segments.
    pub sub_path: Option<String>,
    pub content_kind: ContentKind,
    /// Origin (`scheme://host[:port]`) of a wrapped web URL.
    pub web_origin: Option<String>,
}

impl serde::Serialize for SourceDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SourceDescriptor", 9)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("raw_input", &crate::redact(&self.raw_input))?;
        state.serialize_field(
            "normalized_address",
            &crate::redact(&self.normalized_address),
        )?;
        state.serialize_field("namespace", &self.namespace)?;
        state.serialize_field("repo", &self.repo)?;
        state.serialize_field("ref", &self.git_ref)?;
        state.serialize_field("sub_path", &self.sub_path)?;
        state.serialize_field("content_kind", &self.content_kind)?;
        match &self.web_origin {
            Some(origin) => state.serialize_field("web_origin", origin)?,
            None => state.skip_field("web_origin")?,
        }
        state.end()
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::redact(&self.normalized_address))?;
        if let Some(git_ref) = &self.git_ref {
            write!(f, " (ref: {git_ref})")?;
        }
        if let Some(sub_path) = &self.sub_path {
            write!(f, " [{}: {sub_path}]", self.content_kind)?;
        }
        Ok(())
    }
}

struct RepoPath {
    namespace: String,
    repo: String,
}

impl RepoPath {
    fn project_path(&self) -> String {
        format!("{}/{}", self.namespace, self.repo)
    }
}

impl SourceDescriptor {
    /// Resolve `raw` against `config`.
    pub fn resolve<S: AsRef<str>>(raw: S, config: &FetchConfig) -> Result<Self, Error> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(Error::invalid_source(raw, "source is empty"));
        }
        if PASSTHROUGH_URL_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            return Self::parse_direct_url(raw);
        }
        if raw.starts_with(SCP_PREFIX) {
            return Self::parse_scp(raw);
        }
        if let Some(rest) = raw.strip_prefix(ARCHIVE_SCHEME) {
            return if rest.starts_with("http://") || rest.starts_with("https://") {
                Self::parse_wrapped_web_url(raw, rest)
            } else {
                Self::parse_compact_archive(raw, rest, config)
            };
        }
        if let Some((scheme, _)) = raw.split_once("://") {
            return Err(Error::invalid_source(
                raw,
                format!("unsupported scheme '{scheme}://'"),
            ));
        }
        if raw.contains('/') {
            return Self::parse_shorthand(raw, config);
        }
        Err(Error::invalid_source(
            raw,
            "expected a git URL (https/ssh/scp), 'namespace/repo' or a gitlab:// identifier",
        ))
    }

    /// Replace the inferred content kind with an explicit one.
    pub fn with_content_kind(mut self, kind: Option<ContentKind>) -> Self {
        if let Some(kind) = kind {
            self.content_kind = kind;
        }
        self
    }

    /// `namespace/repo`, when the source names one.
    pub fn project_path(&self) -> Option<String> {
        match (&self.namespace, &self.repo) {
            (Some(namespace), Some(repo)) => Some(format!("{namespace}/{repo}")),
            _ => None,
        }
    }

    fn parse_direct_url(raw: &str) -> Result<Self, Error> {
        let parsed =
            url::Url::parse(raw).map_err(|e| Error::invalid_source(raw, format!("{e}")))?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_source(raw, "URL has no host"));
        }
        if parsed.path().trim_matches('/').is_empty() {
            return Err(Error::invalid_source(raw, "URL has no repository path"));
        }
        if parsed.path().contains('@') {
            return Err(stray_ref(raw));
        }
        Ok(Self::passthrough(SourceKind::DirectUrl, raw))
    }

    fn parse_scp(raw: &str) -> Result<Self, Error> {
        let Some((host_part, path)) = raw.split_once(':') else {
            return Err(Error::invalid_source(
                raw,
                "SCP-style address needs 'user@host:path'",
            ));
        };
        let host = &host_part[SCP_PREFIX.len()..];
        if host.is_empty() || path.trim_matches('/').is_empty() {
            return Err(Error::invalid_source(
                raw,
                "SCP-style address needs 'user@host:path'",
            ));
        }
        if path.contains('@') {
            return Err(stray_ref(raw));
        }
        Ok(Self::passthrough(SourceKind::Scp, raw))
    }

    fn passthrough(kind: SourceKind, raw: &str) -> Self {
        Self {
            kind,
            raw_input: raw.to_string(),
            normalized_address: raw.to_string(),
            namespace: None,
            repo: None,
            git_ref: None,
            sub_path: None,
            content_kind: ContentKind::Repo,
            web_origin: None,
        }
    }

    fn parse_shorthand(raw: &str, config: &FetchConfig) -> Result<Self, Error> {
        if raw.contains('@') {
            return Err(stray_ref(raw));
        }
        let repo_path = split_repo_path(raw, raw)?;
        Ok(Self {
            kind: SourceKind::Shorthand,
            raw_input: raw.to_string(),
            normalized_address: shorthand_address(&repo_path, config),
            namespace: Some(repo_path.namespace),
            repo: Some(repo_path.repo),
            git_ref: None,
            sub_path: None,
            content_kind: ContentKind::Repo,
            web_origin: None,
        })
    }

    /// `<namespace>/<repo>[@<ref>][//<path>]`
    fn parse_compact_archive(raw: &str, rest: &str, config: &FetchConfig) -> Result<Self, Error> {
        let (head, sub_path) = match rest.split_once("//") {
            Some((head, path)) => (head, Some(path)),
            None => (rest, None),
        };
        let (before_ref, git_ref) = match head.split_once('@') {
            Some((before, git_ref)) => (before, non_empty(git_ref)),
            None => (head, None),
        };
        let repo_path = split_repo_path(raw, before_ref)?;
        let sub_path = sub_path
            .map(|p| clean_sub_path(p, &repo_path.project_path()))
            .transpose()?
            .flatten();
        let content_kind = sub_path
            .as_deref()
            .map_or(ContentKind::Repo, ContentKind::infer);
        Ok(Self {
            kind: SourceKind::ArchiveUri,
            raw_input: raw.to_string(),
            normalized_address: shorthand_address(&repo_path, config),
            namespace: Some(repo_path.namespace),
            repo: Some(repo_path.repo),
            git_ref,
            sub_path,
            content_kind,
            web_origin: None,
        })
    }

    /// `https://host/<namespace>/<repo>[/-/(tree|blob)/<ref>[/<path>]]`
    fn parse_wrapped_web_url(raw: &str, web_url: &str) -> Result<Self, Error> {
        let parsed =
            url::Url::parse(web_url).map_err(|e| Error::invalid_source(raw, format!("{e}")))?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_source(raw, "wrapped URL has no host"));
        }
        let segments = parsed
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(|s| decode_segment(raw, s))
            .collect::<Result<Vec<_>, _>>()?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        let (project, browse) = match segments.iter().position(|s| *s == "-") {
            Some(idx) => (&segments[..idx], Some(&segments[idx + 1..])),
            None => (&segments[..], None),
        };
        let repo_path = split_repo_path(raw, &project.join("/"))?;

        let (git_ref, sub_path, browse_kind) = match browse {
            None => (None, None, None),
            Some([]) => (None, None, None),
            Some([mode]) if *mode == "tree" || *mode == "blob" => (None, None, None),
            Some([mode, git_ref, path @ ..]) if *mode == "tree" || *mode == "blob" => {
                let kind = if *mode == "tree" {
                    ContentKind::Dir
                } else {
                    ContentKind::File
                };
                let sub_path = clean_sub_path(&path.join("/"), &repo_path.project_path())?;
                if kind == ContentKind::File && sub_path.is_none() {
                    return Err(Error::invalid_source(raw, "blob URL does not name a file"));
                }
                (non_empty(git_ref), sub_path, Some(kind))
            }
            Some(_) => {
                return Err(Error::invalid_source(
                    raw,
                    "only '-/tree/<ref>/<path>' and '-/blob/<ref>/<path>' pages can be fetched",
                ));
            }
        };
        let content_kind = match (browse_kind, &sub_path) {
            (Some(kind), Some(_)) => kind,
            _ => ContentKind::Repo,
        };
        let origin = parsed.origin().ascii_serialization();
        Ok(Self {
            kind: SourceKind::ArchiveUri,
            raw_input: raw.to_string(),
            normalized_address: format!("{origin}/{}.git", repo_path.project_path()),
            namespace: Some(repo_path.namespace),
            repo: Some(repo_path.repo),
            git_ref,
            sub_path,
            content_kind,
            web_origin: Some(origin),
        })
    }
}

fn stray_ref(raw: &str) -> Error {
    Error::invalid_source(
        raw,
        "found '@' after the repository path; pass the branch or tag as a separate ref option",
    )
}

/// Percent-decode one URL path segment.
pub(crate) fn decode_segment(raw: &str, segment: &str) -> Result<String, Error> {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::invalid_source(raw, "URL path is not valid UTF-8 once decoded"))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Split `group[/sub...]/repo` into namespace and repo, dropping a trailing `.git`.
fn split_repo_path(raw: &str, path: &str) -> Result<RepoPath, Error> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let [namespace @ .., repo] = parts.as_slice() else {
        return Err(Error::invalid_source(raw, "expected 'namespace/repo'"));
    };
    let repo: &str = repo;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if namespace.is_empty() || repo.is_empty() {
        return Err(Error::invalid_source(raw, "expected 'namespace/repo'"));
    }
    if parts
        .iter()
        .any(|p| *p == "." || *p == ".." || p.chars().any(char::is_whitespace))
    {
        return Err(Error::invalid_source(
            raw,
            "namespace and repo segments must be plain names",
        ));
    }
    Ok(RepoPath {
        namespace: namespace.join("/"),
        repo: repo.to_string(),
    })
}

/// Normalise a sub-path: strip surrounding slashes and empty segments, reject `..`.
fn clean_sub_path(path: &str, root: &str) -> Result<Option<String>, Error> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.contains(&"..") {
        return Err(Error::path_traversal(path, root));
    }
    Ok((!segments.is_empty()).then(|| segments.join("/")))
}

fn shorthand_address(repo_path: &RepoPath, config: &FetchConfig) -> String {
    let host = config.host();
    let project = repo_path.project_path();
    match config.protocol() {
        Protocol::Https => format!("https://{host}/{project}.git"),
        Protocol::Ssh => format!("{}@{host}:{project}.git", config.ssh_user()),
    }
}
