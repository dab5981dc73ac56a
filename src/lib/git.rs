//! Shallow clones with the git executable.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::destination::ensure_vacant;
use crate::error::Error;
use crate::plan::{Action, ExecutionPlan, Invocation, Provider};
use crate::process::{ProcessRunner, tail_lines};
use crate::sanitize::redact;

/// Lines of git's stderr kept in a [`Error::CloneExecution`].
pub const DIAGNOSTIC_LINES: usize = 20;

/// The repository name of a clone address: its final path or SCP segment without `.git`.
///
/// ```
/// use fetch_asset::git::repo_name;
///
/// assert_eq!(repo_name("https://h/ns/repo.git"), Some("repo"));
/// assert_eq!(repo_name("u@h:ns/repo.git"), Some("repo"));
/// assert_eq!(repo_name("u@h:repo"), Some("repo"));
/// ```
pub fn repo_name(address: &str) -> Option<&str> {
    let trimmed = address.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

/// One shallow clone of a remote into a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitClone {
    pub address: String,
    /// Branch or tag; the remote's default branch when absent.
    pub git_ref: Option<String>,
    pub target: PathBuf,
}

impl GitClone {
    /// Clone `address` into `dest_root/<repo name>`.
    pub fn new(address: &str, git_ref: Option<&str>, dest_root: &Path) -> Result<Self, Error> {
        let name = repo_name(address).ok_or_else(|| {
            Error::invalid_source(address, "cannot derive a repository name from the address")
        })?;
        Ok(Self {
            address: address.to_string(),
            git_ref: git_ref.map(str::to_string),
            target: dest_root.join(name),
        })
    }

    pub fn invocation<P: AsRef<Path>>(&self, git: P) -> Invocation {
        let mut cmd = Invocation::new(git.as_ref()).args(["clone", "--depth", "1", "--no-tags"]);
        if let Some(git_ref) = &self.git_ref {
            cmd = cmd.args(["--branch", git_ref.as_str()]);
        }
        cmd.arg(self.address.as_str())
            .arg(self.target.to_string_lossy())
    }

    pub fn plan<P: AsRef<Path>>(&self, git: P) -> ExecutionPlan {
        ExecutionPlan {
            provider: Provider::Git,
            target: self.target.clone(),
            action: Action::Command(self.invocation(git)),
        }
    }

    /// Run the clone. The target is checked before anything is spawned.
    pub fn run<P: AsRef<Path>>(
        &self,
        git: P,
        runner: &dyn ProcessRunner,
        deadline: Option<Instant>,
    ) -> Result<PathBuf, Error> {
        ensure_vacant(&self.target)?;
        let precreated = self.target.is_dir();
        let git = git.as_ref();
        let invocation = self.invocation(git);
        tracing::info!(source = %self, "cloning");
        let output = runner.run(&invocation, deadline).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound {
                    tool: git.display().to_string(),
                    searched_path: git.components().count() == 1,
                }
            } else {
                Error::Io(e)
            }
        })?;
        if output.success {
            tracing::info!(path = %self.target.display(), "clone complete");
            return Ok(self.target.clone());
        }
        self.discard_partial(precreated);
        Err(Error::CloneExecution {
            address: redact(&self.address).into_owned(),
            status: output.status_text(),
            diagnostic: redact(&tail_lines(&output.stderr, DIAGNOSTIC_LINES)).into_owned(),
        })
    }

    /// Remove what a failed clone left behind. A target directory that existed beforehand is
    /// emptied, not removed.
    fn discard_partial(&self, precreated: bool) {
        let result = if precreated {
            clear_dir(&self.target)
        } else if self.target.exists() {
            std::fs::remove_dir_all(&self.target)
        } else {
            Ok(())
        };
        if let Err(e) = result {
            tracing::warn!(
                path = %self.target.display(),
                error = %e,
                "could not remove partial clone"
            );
        }
    }
}

fn clear_dir(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

impl std::fmt::Display for GitClone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", redact(&self.address))?;
        if let Some(git_ref) = &self.git_ref {
            write!(f, " (ref: {git_ref})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_repo_name {
    use super::*;

    #[test]
    fn url_and_scp_forms_agree() {
        assert_eq!(repo_name("https://h/ns/repo.git"), Some("repo"));
        assert_eq!(repo_name("u@h:ns/repo.git"), Some("repo"));
        assert_eq!(repo_name("ssh://git@h:2222/group/sub/tool"), Some("tool"));
        assert_eq!(repo_name("https://h/ns/repo/"), Some("repo"));
    }

    #[test]
    fn degenerate_addresses_have_no_name() {
        assert_eq!(repo_name("https://h/.git"), None);
        assert_eq!(repo_name(""), None);
    }
}

#[cfg(test)]
mod test_invocation {
    use super::*;

    #[test]
    fn shallow_clone_without_tags() {
        let clone = GitClone::new("https://h/ns/repo.git", None, Path::new("/dest")).unwrap();
        assert_eq!(clone.target, Path::new("/dest/repo"));
        assert_eq!(
            clone.invocation("git").args,
            ["clone", "--depth", "1", "--no-tags", "https://h/ns/repo.git", "/dest/repo"]
        );
    }

    #[test]
    fn ref_selects_branch() {
        let clone = GitClone::new("u@h:ns/repo.git", Some("v2.0"), Path::new("/dest")).unwrap();
        let args = clone.invocation("/usr/bin/git").args;
        assert_eq!(&args[4..6], ["--branch", "v2.0"]);
    }

    #[test]
    fn display_is_sanitized() {
        let clone =
            GitClone::new("https://u:secret@h/ns/repo.git", Some("main"), Path::new("/d")).unwrap();
        assert_eq!(clone.to_string(), "https://***@h/ns/repo.git (ref: main)");
    }
}
