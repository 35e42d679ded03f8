//! Splitting of host paths into an archive path and an entry name.
//!
//! A path such as `/app/data.zip/templates/index.html` names the entry
//! `templates/index.html` inside the archive `/app/data.zip`. The archive is
//! recognised by the first `.zip` extension (in any letter case) that is
//! directly followed by the host path separator.

use std::path::{Component, Path, PathBuf};

/// The extension that marks an archive container, without the leading dot.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// The separator used by entry names inside a zip archive, independent of the
/// host platform.
pub const PATH_ZIP_SEP: &str = "/";

#[cfg(not(windows))]
/// The platform-specific separator as a string, used when searching
/// canonical host paths for an archive marker.
pub const PATH_PLATFORM_SEP: &str = "/";

#[cfg(windows)]
/// The platform-specific separator as a string, used when searching
/// canonical host paths for an archive marker.
pub const PATH_PLATFORM_SEP: &str = "\\";

/// Outcome of looking for an archive marker in a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Split {
    /// The path names an entry inside an archive.
    Entry { archive: PathBuf, entry: String },
    /// No archive marker followed by a separator was found.
    NoMarker,
    /// The marker was found but nothing follows the separator.
    EmptyEntry { archive: PathBuf },
}

impl Split {
    /// Converts into the `(archive, entry)` pair, if there is one.
    pub fn into_parts(self) -> Option<(PathBuf, String)> {
        match self {
            Split::Entry { archive, entry } => Some((archive, entry)),
            Split::NoMarker | Split::EmptyEntry { .. } => None,
        }
    }
}

/// Splits `path` into an archive path and an entry name.
///
/// Returns `None` when the path does not point inside an archive, including
/// when the archive marker is followed by an empty entry name. Use
/// [`classify`] to tell those cases apart.
pub fn split<P: AsRef<Path>>(path: P) -> Option<(PathBuf, String)> {
    classify(path).into_parts()
}

/// Canonicalizes `path` and reports whether, and how, it names an archive
/// entry.
pub fn classify<P: AsRef<Path>>(path: P) -> Split {
    let path = path.as_ref();
    let canonical = canonicalize(path);
    let mut text = match canonical.to_str() {
        Some(v) => v.to_string(),
        None => return Split::NoMarker,
    };

    // Normalization drops a trailing separator; keep it so that
    // `data.zip/` is reported as an archive with no entry name.
    let trailing = path
        .to_str()
        .map(|x| x.ends_with(PATH_PLATFORM_SEP) || x.ends_with(PATH_ZIP_SEP))
        .unwrap_or(false);
    if trailing && !text.ends_with(PATH_PLATFORM_SEP) {
        text.push_str(PATH_PLATFORM_SEP);
    }

    let marker = format!(".{}{}", ARCHIVE_EXTENSION, PATH_PLATFORM_SEP);
    // ASCII lowering keeps byte offsets identical to `text`.
    let pos = match text.to_ascii_lowercase().find(&marker) {
        Some(v) => v,
        None => return Split::NoMarker,
    };

    let archive_end = pos + 1 + ARCHIVE_EXTENSION.len();
    let archive = PathBuf::from(&text[..archive_end]);
    let entry = &text[archive_end + PATH_PLATFORM_SEP.len()..];

    if entry.is_empty() {
        return Split::EmptyEntry { archive };
    }

    Split::Entry {
        archive,
        entry: entry.to_string(),
    }
}

/// Returns `true` if `path` carries the archive extension.
pub fn has_archive_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|x| x.to_str())
        .map(|x| x.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false)
}

/// Resolves `path` to an absolute path with `.` and `..` removed and
/// symlinks resolved.
///
/// Components are resolved left to right, so a `..` following a symlink
/// leaves the link's target, as `realpath` does. Unlike
/// [`std::fs::canonicalize`] this never fails: from the first component that
/// does not exist on disk (such as the part of a path that lies inside an
/// archive) the rest is normalized lexically.
pub fn canonicalize<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    let mut on_disk = true;

    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::Normal(name) => {
                out.push(name);
                if on_disk {
                    match std::fs::canonicalize(&out) {
                        Ok(real) => out = real,
                        Err(_) => on_disk = false,
                    }
                }
            }
        }
    }

    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn splits_entry_after_marker() {
        let split = classify("/app/data.zip/templates/index.html");
        assert_eq!(
            split,
            Split::Entry {
                archive: PathBuf::from("/app/data.zip"),
                entry: "templates/index.html".into(),
            }
        );
    }

    #[test]
    fn marker_is_case_insensitive() {
        let (archive, entry) = split("/app/DATA.Zip/a.txt").unwrap();
        assert_eq!(archive, PathBuf::from("/app/DATA.Zip"));
        assert_eq!(entry, "a.txt");
    }

    #[test]
    fn first_marker_wins() {
        let (archive, entry) = split("/app/outer.zip/inner.zip/a.txt").unwrap();
        assert_eq!(archive, PathBuf::from("/app/outer.zip"));
        assert_eq!(entry, "inner.zip/a.txt");
    }

    #[test]
    fn archive_without_separator_is_not_split() {
        assert_eq!(classify("/app/data.zip"), Split::NoMarker);
        assert_eq!(split("/app/data.zip"), None);
    }

    #[test]
    fn trailing_separator_is_empty_entry() {
        assert_eq!(
            classify("/app/data.zip/"),
            Split::EmptyEntry {
                archive: PathBuf::from("/app/data.zip")
            }
        );
        assert_eq!(split("/app/data.zip/"), None);
        assert_eq!(classify("/app/data.zip/."), Split::NoMarker);
    }

    #[test]
    fn extension_must_be_followed_by_separator() {
        assert_eq!(classify("/app/data.zipper/a.txt"), Split::NoMarker);
        assert_eq!(classify("/app/zip/a.txt"), Split::NoMarker);
    }

    #[test]
    fn relative_segments_are_removed() {
        let (archive, entry) = split("/app/./lib/../data.zip/a/./b/../c.txt").unwrap();
        assert_eq!(archive, PathBuf::from("/app/data.zip"));
        assert_eq!(entry, "a/c.txt");
    }

    #[test]
    fn relative_paths_become_absolute() {
        let canonical = canonicalize("definitely-missing.zip/a.txt");
        assert!(canonical.is_absolute());
        assert!(canonical.ends_with("definitely-missing.zip/a.txt"));
    }

    #[test]
    fn symlinked_prefix_is_resolved() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::fs::write(real.join("data.zip"), b"").unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("link")).unwrap();

        let (archive, entry) = split(dir.path().join("link/data.zip/x/y.txt")).unwrap();
        assert_eq!(archive, std::fs::canonicalize(real.join("data.zip")).unwrap());
        assert_eq!(entry, "x/y.txt");
    }

    #[test]
    fn parent_of_symlink_follows_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir_all(real.join("sub")).unwrap();
        std::fs::write(real.join("data.zip"), b"").unwrap();
        std::os::unix::fs::symlink(real.join("sub"), dir.path().join("link")).unwrap();

        let (archive, entry) = split(dir.path().join("link/../data.zip/x.txt")).unwrap();
        assert_eq!(archive, std::fs::canonicalize(real.join("data.zip")).unwrap());
        assert_eq!(entry, "x.txt");
    }

    #[test]
    fn archive_extension_check() {
        assert!(has_archive_extension("data.zip"));
        assert!(has_archive_extension("/a/b/DATA.ZIP"));
        assert!(!has_archive_extension("data.zip.bak"));
        assert!(!has_archive_extension("zip"));
    }
}
