//! Zip extraction with top-level stripping, sub-path flattening and a traversal guard.
//!
//! Extraction is two passes over the central directory: the first maps every entry to its output
//! path and rejects the whole archive if any entry would land outside the root, the second
//! writes. A rejected archive therefore writes nothing.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use crate::destination::join_within;
use crate::error::Error;

/// Counts reported after a successful extraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Extracted {
    pub files: usize,
    pub dirs: usize,
    /// Entries outside the requested sub-path.
    pub skipped: usize,
}

struct Planned {
    index: usize,
    target: PathBuf,
    is_dir: bool,
    mode: Option<u32>,
}

/// The single directory every entry of a repository archive is wrapped in, taken from the first
/// entry.
fn wrapping_dir<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<Option<String>, Error> {
    if archive.len() == 0 {
        return Ok(None);
    }
    let first = archive.by_index_raw(0)?;
    Ok(first
        .name()
        .split_once('/')
        .map(|(top, _)| top.to_string())
        .filter(|top| !top.is_empty()))
}

/// The path of `name` below the wrapping directory and the requested sub-path, or `None` when the
/// entry is not part of the requested content.
fn relative_path<'a>(name: &'a str, top: Option<&str>, sub_path: Option<&str>) -> Option<&'a str> {
    let mut rest = match top {
        Some(top) => match name.strip_prefix(top) {
            Some(r) if r.starts_with('/') => &r[1..],
            Some("") => "",
            _ => name,
        },
        None => name,
    };
    if let Some(sub) = sub_path {
        rest = match rest.strip_prefix(sub) {
            Some("") => "",
            Some(r) if r.starts_with('/') => &r[1..],
            _ => return None,
        };
    }
    Some(rest.trim_end_matches('/'))
}

/// Extract `reader` into `root`, keeping only entries under `sub_path` (flattened) when given.
///
/// Existing files at the same relative paths are overwritten.
pub fn extract<R: Read + Seek>(
    reader: R,
    root: &Path,
    sub_path: Option<&str>,
) -> Result<Extracted, Error> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let top = wrapping_dir(&mut archive)?;
    let root_label = root.display().to_string();

    let mut planned = Vec::with_capacity(archive.len());
    let mut summary = Extracted::default();
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();
        if entry.enclosed_name().is_none() {
            return Err(Error::path_traversal(name, root_label));
        }
        let Some(rel) = relative_path(&name, top.as_deref(), sub_path) else {
            summary.skipped += 1;
            continue;
        };
        if rel.is_empty() {
            continue;
        }
        let target = join_within(root, rel)?;
        planned.push(Planned {
            index,
            target,
            is_dir: entry.is_dir(),
            mode: entry.unix_mode(),
        });
    }
    tracing::debug!(
        entries = archive.len(),
        kept = planned.len(),
        skipped = summary.skipped,
        top = top.as_deref().unwrap_or(""),
        "validated archive"
    );

    for item in planned {
        if item.is_dir {
            std::fs::create_dir_all(&item.target)?;
            summary.dirs += 1;
            continue;
        }
        if let Some(parent) = item.target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut entry = archive.by_index(item.index)?;
        let mut out = std::fs::File::create(&item.target)?;
        std::io::copy(&mut entry, &mut out)?;
        set_mode(&item.target, item.mode)?;
        summary.files += 1;
    }
    Ok(summary)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode.map(|m| m & 0o777).filter(|m| *m != 0) {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_: &Path, _: Option<u32>) -> Result<(), Error> {
    Ok(())
}

#[cfg(test)]
mod test_extract {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn build(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(contents.as_bytes()).unwrap();
            }
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn files_under(root: &Path) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap();
                    out.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        out.sort();
        out
    }

    #[test]
    fn strips_wrapping_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build(&[
            ("repo-main-abc/", ""),
            ("repo-main-abc/README.md", "hi"),
            ("repo-main-abc/src/lib.rs", "fn x() {}"),
        ]);
        let summary = extract(archive, tmp.path(), None).unwrap();
        assert_eq!(files_under(tmp.path()), ["README.md", "src/lib.rs"]);
        assert_eq!(summary.files, 2);
    }

    #[test]
    fn flattens_sub_path_and_skips_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build(&[
            ("top/docs/a.txt", "a"),
            ("top/docs/sub/b.txt", "b"),
            ("top/other/c.txt", "c"),
            ("top/docsextra/d.txt", "d"),
        ]);
        let summary = extract(archive, tmp.path(), Some("docs")).unwrap();
        assert_eq!(files_under(tmp.path()), ["a.txt", "sub/b.txt"]);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn traversal_rejects_whole_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build(&[("top/ok.txt", "fine"), ("top/../../evil.txt", "pwned")]);
        let err = extract(archive, tmp.path(), None).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err}");
        assert!(files_under(tmp.path()).is_empty());
        assert!(!tmp.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn escape_hidden_by_wrapping_dir_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build(&[("top/a.txt", "a"), ("top/../b.txt", "b")]);
        let err = extract(archive, tmp.path(), None).unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }), "{err}");
        assert!(files_under(tmp.path()).is_empty());
    }

    #[test]
    fn existing_files_are_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "stale and longer").unwrap();
        extract(build(&[("top/a.txt", "fresh")]), tmp.path(), None).unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "fresh");
    }

    #[test]
    fn garbage_is_an_archive_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = extract(Cursor::new(b"not a zip".to_vec()), tmp.path(), None).unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_survives() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(
            "top/run.sh",
            SimpleFileOptions::default().unix_permissions(0o755),
        )
        .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        extract(cursor, tmp.path(), None).unwrap();
        let mode = std::fs::metadata(tmp.path().join("run.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn relative_path_rules() {
        assert_eq!(relative_path("top/a/b", Some("top"), None), Some("a/b"));
        assert_eq!(relative_path("top/", Some("top"), None), Some(""));
        assert_eq!(relative_path("top/docs/x", Some("top"), Some("docs")), Some("x"));
        assert_eq!(relative_path("top/docs/", Some("top"), Some("docs")), Some(""));
        assert_eq!(relative_path("top/docs2/x", Some("top"), Some("docs")), None);
        assert_eq!(relative_path("loose.txt", None, None), Some("loose.txt"));
    }
}
