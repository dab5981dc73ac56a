use std::path::PathBuf;

use crate::sanitize::redact;

/// The main error enum for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source identifier is malformed or uses an unsupported scheme.
    #[error("invalid source '{input}': {reason}")]
    InvalidSource { input: String, reason: String },

    /// A required external executable could not be found.
    ///
    /// `searched_path` is set when `tool` was a bare name looked up on `PATH` rather than a
    /// configured location.
    #[error("{}", missing_tool(tool, *searched_path))]
    ToolNotFound { tool: String, searched_path: bool },

    /// The target exists and is not empty, and clobbering it is not allowed.
    #[error("destination '{}' already exists and is not empty", path.display())]
    DestinationConflict { path: PathBuf },

    /// The clone subprocess failed or ran past its deadline.
    #[error("git clone failed for source '{address}' ({status})\n{diagnostic}")]
    CloneExecution {
        address: String,
        status: String,
        diagnostic: String,
    },

    #[error("remote resource not found: {url}")]
    ResourceNotFound { url: String },

    #[error("not authorized to access {url} (HTTP {status})")]
    Authorization { status: u16, url: String },

    #[error("request to {url} failed with HTTP {status}")]
    RemoteRequest { status: u16, url: String },

    /// The exchange failed before a complete response was read. Safe to retry.
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    /// An archive entry or sub-path resolves outside of its root.
    #[error("path '{path}' resolves outside of '{root}'")]
    PathTraversal { path: String, root: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Fieldless mirror of [`Error`] for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSource,
    ToolNotFound,
    DestinationConflict,
    CloneExecution,
    ResourceNotFound,
    Authorization,
    RemoteRequest,
    Transport,
    PathTraversal,
    Io,
    Archive,
    Config,
}

impl Error {
    pub(crate) fn invalid_source<S: Into<String>, R: Into<String>>(input: S, reason: R) -> Self {
        Self::InvalidSource {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn path_traversal<P: Into<String>, R: Into<String>>(path: P, root: R) -> Self {
        Self::PathTraversal {
            path: path.into(),
            root: root.into(),
        }
    }

    pub(crate) fn transport<U: AsRef<str>, M: ToString>(url: U, message: M) -> Self {
        Self::Transport {
            url: redact(url.as_ref()).into_owned(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSource { .. } => ErrorKind::InvalidSource,
            Self::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            Self::DestinationConflict { .. } => ErrorKind::DestinationConflict,
            Self::CloneExecution { .. } => ErrorKind::CloneExecution,
            Self::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::RemoteRequest { .. } => ErrorKind::RemoteRequest,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::Io(_) => ErrorKind::Io,
            Self::Archive(_) => ErrorKind::Archive,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether repeating the same call could succeed without changing any input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }

    /// Pass every address-bearing payload through the credential sanitizer.
    pub fn redacted(self) -> Self {
        let clean = |s: String| redact(&s).into_owned();
        match self {
            Self::InvalidSource { input, reason } => Self::InvalidSource {
                input: clean(input),
                reason: clean(reason),
            },
            Self::CloneExecution {
                address,
                status,
                diagnostic,
            } => Self::CloneExecution {
                address: clean(address),
                status,
                diagnostic: clean(diagnostic),
            },
            Self::ResourceNotFound { url } => Self::ResourceNotFound { url: clean(url) },
            Self::Authorization { status, url } => Self::Authorization {
                status,
                url: clean(url),
            },
            Self::RemoteRequest { status, url } => Self::RemoteRequest {
                status,
                url: clean(url),
            },
            Self::Transport { url, message } => Self::Transport {
                url: clean(url),
                message: clean(message),
            },
            Self::PathTraversal { path, root } => Self::PathTraversal {
                path: clean(path),
                root: clean(root),
            },
            other => other,
        }
    }
}

fn missing_tool(tool: &str, searched_path: bool) -> String {
    if searched_path {
        format!("required tool '{tool}' was not found on PATH (set FETCH_ASSET_GIT_BINARY to override)")
    } else {
        format!(
            "configured tool '{tool}' was not found (check FETCH_ASSET_GIT_BINARY or --git-binary)"
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod test_redaction {
    use super::*;

    #[test]
    fn redacted_scrubs_clone_diagnostics() {
        let err = Error::CloneExecution {
            address: "https://user:token@h/ns/repo.git".into(),
            status: "exit status: 128".into(),
            diagnostic: "fatal: unable to access 'https://user:token@h/ns/repo.git/'".into(),
        }
        .redacted();
        let msg = err.to_string();
        assert!(!msg.contains("token"), "{msg}");
        assert!(msg.contains("https://***@h/ns/repo.git"), "{msg}");
    }

    #[test]
    fn transport_constructor_sanitizes_url() {
        let err = Error::transport("https://a:b@host/x", "timed out");
        assert!(matches!(err, Error::Transport { ref url, .. } if url == "https://***@host/x"));
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_tool_message_names_where_it_looked() {
        let bare = Error::ToolNotFound {
            tool: "git".into(),
            searched_path: true,
        };
        assert!(bare.to_string().contains("not found on PATH"), "{bare}");
        let configured = Error::ToolNotFound {
            tool: "/opt/git/bin/git".into(),
            searched_path: false,
        };
        let msg = configured.to_string();
        assert!(msg.contains("configured tool '/opt/git/bin/git'"), "{msg}");
        assert!(!msg.contains("PATH"), "{msg}");
    }

    #[test]
    fn kinds_are_distinct() {
        let conflict = Error::DestinationConflict {
            path: PathBuf::from("x"),
        };
        assert_eq!(conflict.kind(), ErrorKind::DestinationConflict);
        assert!(!conflict.is_retryable());
        assert_eq!(
            Error::path_traversal("../x", "out").kind(),
            ErrorKind::PathTraversal
        );
    }
}
