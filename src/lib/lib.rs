//! Fetch git repositories, repository content and build artifacts into a local directory.
//!
//! A source string is resolved into a [`SourceDescriptor`] and handed to one of three strategies:
//!
//! - **git**: a shallow `git clone` (requires `git`, found on `PATH` or configured explicitly).
//! - **content**: a repository archive or a single raw file over the GitLab v4 REST API, with the
//!   requested sub-directory flattened into the destination. No `git` needed.
//! - **artifact**: a plain download from a generic artifact service.
//!
//! # Source grammars
//!
//! | Form | Example | Default provider |
//! |---|---|---|
//! | URL | `https://gitlab.com/group/repo.git`, `ssh://git@host:2222/group/repo.git` | git |
//! | SCP | `git@gitlab.com:group/repo.git` | git |
//! | Shorthand | `group/sub/repo` | git |
//! | Compact archive | `gitlab://group/repo@main//docs` | content |
//! | Wrapped web URL | `gitlab://https://host/group/repo/-/tree/main/docs` | content |
//!
//! # Usage
//!
//! Resolving never touches the network:
//!
//! ```rust
//! use fetch_asset::{ContentKind, FetchConfig, SourceDescriptor, SourceKind};
//!
//! let config = FetchConfig::default();
//! let source = SourceDescriptor::resolve("gitlab://group/repo@v1.2//docs/guide.md", &config)?;
//! assert_eq!(source.kind, SourceKind::ArchiveUri);
//! assert_eq!(source.git_ref.as_deref(), Some("v1.2"));
//! assert_eq!(source.content_kind, ContentKind::File);
//! # Ok::<(), fetch_asset::Error>(())
//! ```
//!
//! Fetching goes through a [`Fetcher`]:
//!
//! ```rust,no_run
//! use fetch_asset::{FetchConfig, FetchOptions, Fetcher};
//!
//! # fn main() -> Result<(), fetch_asset::Error> {
//! let fetcher = Fetcher::new(FetchConfig::from_env()?)?;
//! let path = fetcher.fetch("group/repo", &FetchOptions::new("vendor").with_ref("main"))?;
//! println!("cloned into {}", path.display());
//! # Ok(())
//! # }
//! ```
//!
//! Errors returned by [`Fetcher`] never contain credentials embedded in source URLs; see
//! [`redact`].

pub mod archive;
pub mod artifact;
pub mod config;
pub mod content;
pub mod destination;
mod dispatch;
mod error;
pub mod git;
pub mod http;
pub mod plan;
pub mod process;
mod sanitize;
pub mod source;

pub use crate::config::{ArtifactConfig, FetchConfig, Protocol};
pub use crate::dispatch::{FetchOptions, Fetcher, infer_provider};
pub use crate::error::{Error, ErrorKind};
pub use crate::http::{Response, Transport};
pub use crate::plan::{Action, Auth, BodyHandling, ExecutionPlan, Invocation, Provider, Request};
pub use crate::process::{ProcessOutput, ProcessRunner};
pub use crate::sanitize::{REDACTION_MARKER, redact};
pub use crate::source::{ContentKind, SourceDescriptor, SourceKind};
