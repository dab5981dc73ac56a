//! Target paths, the overwrite/conflict policy, and atomic single-file writes.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use crate::error::Error;

/// Make `dest` absolute and create it if missing.
pub fn prepare_root(dest: &Path) -> Result<PathBuf, Error> {
    let root = std::path::absolute(dest)?;
    std::fs::create_dir_all(&root)?;
    Ok(root)
}

/// Whole-repository targets must be absent or empty.
pub fn ensure_vacant(target: &Path) -> Result<(), Error> {
    let occupied = match std::fs::read_dir(target) {
        Ok(mut entries) => entries.next().is_some(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        // Exists but is not a readable directory: a file in the way counts as occupied.
        Err(_) => target.exists(),
    };
    if occupied {
        return Err(Error::DestinationConflict {
            path: target.to_path_buf(),
        });
    }
    Ok(())
}

/// Join a relative, `/`-separated path onto `root`, refusing anything that could escape it.
pub fn join_within(root: &Path, relative: &str) -> Result<PathBuf, Error> {
    let rel = Path::new(relative);
    let escapes = relative.contains('\\')
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::path_traversal(relative, root.display().to_string()));
    }
    Ok(root.join(rel))
}

/// The final segment of a `/`-separated path or URL path.
pub fn basename(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Stream `body` into `dir/name`, replacing any existing file only once the body is complete.
pub fn write_file<R: Read + ?Sized>(
    dir: &Path,
    name: &str,
    body: &mut R,
    url: &str,
) -> Result<PathBuf, Error> {
    let target = join_within(dir, name)?;
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    let bytes = crate::http::copy_body(body, staged.as_file_mut(), url)?;
    staged.persist(&target).map_err(|e| Error::Io(e.error))?;
    tracing::debug!(path = %target.display(), bytes, "wrote file");
    Ok(target)
}
