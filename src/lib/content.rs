//! Repository snapshots and single files over the GitLab v4 REST API.
//!
//! `repo` and `dir` retrievals download the repository archive as zip and extract it with
//! [`crate::archive::extract`]; `file` retrievals download one raw blob. No git executable is
//! involved.

use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use url::Url;

use crate::config::FetchConfig;
use crate::destination::{basename, write_file};
use crate::error::Error;
use crate::http::{Transport, copy_body, send};
use crate::plan::{Action, Auth, BodyHandling, ExecutionPlan, Provider, Request};
use crate::sanitize::redact;
use crate::source::{ContentKind, SourceDescriptor};

/// The API base for `source`: an explicit override, else the origin of a wrapped web URL, else the
/// base derived from the configured host.
pub fn api_base(source: &SourceDescriptor, config: &FetchConfig) -> String {
    if config.api_base.as_deref().is_some_and(|b| !b.trim().is_empty()) {
        return config.api_base();
    }
    match &source.web_origin {
        Some(origin) => format!("{origin}{}", crate::config::API_SUFFIX),
        None => config.api_base(),
    }
}

/// Anonymous unless a token is configured.
pub fn auth(config: &FetchConfig) -> Auth {
    match &config.token {
        Some(token) => Auth::PrivateToken(token.clone()),
        None => Auth::None,
    }
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn endpoint(api_base: &str, path: &str) -> Result<Url, Error> {
    let raw = format!("{}/{path}", api_base.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| Error::Config(format!("invalid API base '{}': {e}", redact(api_base))))
}

/// `GET /projects/:id/repository/archive.zip?sha=<ref>[&path=<sub_path>]`
pub fn archive_url(
    api_base: &str,
    project: &str,
    git_ref: Option<&str>,
    sub_path: Option<&str>,
) -> Result<String, Error> {
    let mut url = endpoint(
        api_base,
        &format!("projects/{}/repository/archive.zip", encode(project)),
    )?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("sha", git_ref.unwrap_or("HEAD"));
        if let Some(path) = sub_path {
            query.append_pair("path", path);
        }
    }
    Ok(url.into())
}

/// `GET /projects/:id/repository/files/:file_path/raw?ref=<ref>`
pub fn raw_file_url(
    api_base: &str,
    project: &str,
    file_path: &str,
    git_ref: Option<&str>,
) -> Result<String, Error> {
    let mut url = endpoint(
        api_base,
        &format!(
            "projects/{}/repository/files/{}/raw",
            encode(project),
            encode(file_path)
        ),
    )?;
    url.query_pairs_mut()
        .append_pair("ref", git_ref.unwrap_or("HEAD"));
    Ok(url.into())
}

/// One REST retrieval of repository content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFetch {
    pub request: Request,
    /// Directory populated by an archive, or the file written for a blob.
    pub target: PathBuf,
    /// Prefix flattened away during extraction.
    pub sub_path: Option<String>,
}

impl ContentFetch {
    /// Build the retrieval for `source` into `dest_root`. `git_ref` overrides the source's own ref.
    pub fn new(
        source: &SourceDescriptor,
        git_ref: Option<&str>,
        dest_root: &Path,
        config: &FetchConfig,
    ) -> Result<Self, Error> {
        let project = source.project_path().ok_or_else(|| {
            Error::invalid_source(
                &source.raw_input,
                "content retrieval needs a 'namespace/repo' or gitlab:// source",
            )
        })?;
        let base = api_base(source, config);
        let git_ref = git_ref.or(source.git_ref.as_deref());
        let sub_path = source.sub_path.as_deref();

        let (url, body, target, flatten) = match (source.content_kind, sub_path) {
            (ContentKind::File, Some(path)) => {
                let name = basename(path).ok_or_else(|| {
                    Error::invalid_source(&source.raw_input, "file path has no file name")
                })?;
                let url = raw_file_url(&base, &project, path, git_ref)?;
                (url, BodyHandling::WriteFile, dest_root.join(name), None)
            }
            (ContentKind::File, None) => {
                return Err(Error::invalid_source(
                    &source.raw_input,
                    "file retrieval needs a path, e.g. gitlab://group/repo@main//README.md",
                ));
            }
            (ContentKind::Dir, Some(path)) => {
                let url = archive_url(&base, &project, git_ref, Some(path))?;
                let flatten = Some(path.to_string());
                (url, BodyHandling::ExtractArchive, dest_root.to_path_buf(), flatten)
            }
            (ContentKind::Repo | ContentKind::Dir, _) => {
                let url = archive_url(&base, &project, git_ref, None)?;
                (url, BodyHandling::ExtractArchive, dest_root.to_path_buf(), None)
            }
        };
        Ok(Self {
            request: Request {
                url,
                auth: auth(config),
                body,
            },
            target,
            sub_path: flatten,
        })
    }

    pub fn plan(&self) -> ExecutionPlan {
        ExecutionPlan {
            provider: Provider::Content,
            target: self.target.clone(),
            action: Action::Request(self.request.clone()),
        }
    }

    /// Download and materialise. Returns the destination root for archives and the file path for
    /// blobs.
    pub fn run(&self, transport: &dyn Transport, deadline: Option<Instant>) -> Result<PathBuf, Error> {
        let url = &self.request.url;
        tracing::info!(url = %redact(url), target = %self.target.display(), "fetching content");
        let mut response = send(transport, &self.request, deadline)?;
        match self.request.body {
            BodyHandling::WriteFile => {
                let (dir, name) = split_target(&self.target)?;
                write_file(dir, name, &mut response.body, url)
            }
            BodyHandling::ExtractArchive => {
                let mut spool = tempfile::tempfile()?;
                let bytes = copy_body(&mut response.body, &mut spool, url)?;
                spool.seek(SeekFrom::Start(0))?;
                tracing::debug!(bytes, "archive downloaded");
                let extracted =
                    crate::archive::extract(spool, &self.target, self.sub_path.as_deref())?;
                if self.sub_path.is_some() && extracted.files == 0 && extracted.dirs == 0 {
                    return Err(Error::ResourceNotFound {
                        url: redact(url).into_owned(),
                    });
                }
                tracing::info!(files = extracted.files, "extracted archive");
                Ok(self.target.clone())
            }
        }
    }
}

pub(crate) fn split_target(target: &Path) -> Result<(&Path, &str), Error> {
    match (target.parent(), target.file_name().and_then(|n| n.to_str())) {
        (Some(dir), Some(name)) => Ok((dir, name)),
        _ => Err(Error::path_traversal(
            target.display().to_string(),
            target.display().to_string(),
        )),
    }
}



#[cfg(test)]
mod test_content_fetch {
    use super::*;

    fn fetch_for(source: &str) -> Result<ContentFetch, Error> {
        let config = FetchConfig::default();
        let descriptor = SourceDescriptor::resolve(source, &config)?;
        ContentFetch::new(&descriptor, None, Path::new("/out"), &config)
    }

    #[test]
    fn file_targets_basename() {
        let fetch = fetch_for("gitlab://g/r@v1//docs/guide.md").unwrap();
        assert_eq!(fetch.target, Path::new("/out/guide.md"));
        assert_eq!(fetch.request.body, BodyHandling::WriteFile);
        assert!(fetch.request.url.contains("/files/docs%2Fguide.md/raw?ref=v1"));
    }

    #[test]
    fn dir_sends_server_side_path_and_flattens() {
        let fetch = fetch_for("gitlab://g/r//services/auth").unwrap();
        assert_eq!(fetch.target, Path::new("/out"));
        assert_eq!(fetch.sub_path.as_deref(), Some("services/auth"));
        assert!(fetch.request.url.ends_with("?sha=HEAD&path=services%2Fauth"));
    }

    #[test]
    fn explicit_file_without_path_is_invalid() {
        let config = FetchConfig::default();
        let descriptor = SourceDescriptor::resolve("g/r", &config)
            .unwrap()
            .with_content_kind(Some(ContentKind::File));
        let err = ContentFetch::new(&descriptor, None, Path::new("/out"), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
    }

    #[test]
    fn direct_urls_cannot_be_browsed() {
        let err = fetch_for("https://h/g/r.git").unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
    }

    #[test]
    fn ref_override_wins() {
        let config = FetchConfig::default();
        let descriptor = SourceDescriptor::resolve("gitlab://g/r@main", &config).unwrap();
        let fetch = ContentFetch::new(&descriptor, Some("dev"), Path::new("/out"), &config).unwrap();
        assert!(fetch.request.url.ends_with("?sha=dev"));
    }
}
