use std::io;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Image extensions picked up by a scan, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Recursively list image files under `root` as sorted, `/`-separated paths
/// relative to `root`.
///
/// An unreadable directory aborts the scan with [`Error::UnreadableFile`]
/// rather than returning a silently partial list. Files whose path is not
/// valid UTF-8 have no catalog key and are skipped with a warning.
pub fn scan_directory(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(Error::ImageRootNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
            Error::UnreadableFile { path, source }
        })?;

        if !entry.file_type().is_file() || !is_image_path(entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        match relative_key(relative) {
            Some(key) => files.push(key),
            None => warn!(path = %entry.path().display(), "skipping file with a non UTF-8 name"),
        }
    }

    files.sort();
    Ok(files)
}

/// Canonical string form of a relative path: components joined with `/`.
///
/// `None` if any component is not valid UTF-8; a lossy key would not
/// resolve back to the file.
pub fn relative_key(relative: &Path) -> Option<String> {
    relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_filters_by_extension_case_insensitively() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.JPG"), b"x").unwrap();
        fs::write(tmp.path().join("b.png"), b"x").unwrap();
        fs::write(tmp.path().join("c.txt"), b"x").unwrap();

        let files = scan_directory(tmp.path()).unwrap();
        assert_eq!(files, vec!["a.JPG".to_string(), "b.png".to_string()]);
    }

    #[test]
    fn test_scan_recurses_into_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("2021/09")).unwrap();
        fs::write(tmp.path().join("2021/09/x.Jpeg"), b"x").unwrap();
        fs::write(tmp.path().join("2021/y.GIF"), b"x").unwrap();
        fs::write(tmp.path().join("2021/09/notes.md"), b"x").unwrap();

        let files = scan_directory(tmp.path()).unwrap();
        assert_eq!(files, vec!["2021/09/x.Jpeg", "2021/y.GIF"]);
    }

    #[test]
    fn test_scan_ignores_directories_named_like_images() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("album.jpg")).unwrap();
        fs::write(tmp.path().join("album.jpg/inner.png"), b"x").unwrap();

        let files = scan_directory(tmp.path()).unwrap();
        assert_eq!(files, vec!["album.jpg/inner.png"]);
    }

    #[test]
    fn test_scan_is_restartable() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.jpg"), b"x").unwrap();
        assert_eq!(scan_directory(tmp.path()).unwrap().len(), 1);

        fs::write(tmp.path().join("b.jpg"), b"x").unwrap();
        assert_eq!(scan_directory(tmp.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_scan_missing_root() {
        let err = scan_directory(Path::new("/nonexistent/photos")).unwrap_err();
        assert!(matches!(err, Error::ImageRootNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_unreadable_directory_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("hidden.jpg"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can read the directory anyway; nothing to assert then.
        let blocked = fs::read_dir(&locked).is_err();
        let result = scan_directory(tmp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if blocked {
            assert!(matches!(result, Err(Error::UnreadableFile { .. })));
        } else {
            assert_eq!(result.unwrap(), vec!["locked/hidden.jpg"]);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_scan_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(OsStr::from_bytes(b"bad\xff.jpg")), b"x").unwrap();
        fs::write(tmp.path().join("good.jpg"), b"x").unwrap();

        let files = scan_directory(tmp.path()).unwrap();
        assert_eq!(files, vec!["good.jpg"]);
    }

    #[test]
    fn test_relative_key_joins_components() {
        assert_eq!(
            relative_key(Path::new("2021/09/x.jpg")).as_deref(),
            Some("2021/09/x.jpg")
        );
    }

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a/b.JpEg")));
        assert!(!is_image_path(Path::new("a/b.tiff")));
        assert!(!is_image_path(Path::new("jpg")));
    }
}
