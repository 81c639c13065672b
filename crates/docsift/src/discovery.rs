//! Directory discovery
//!
//! Finds files under a root whose extension maps to a [`FileKind`]. Hidden
//! files and directories are skipped; symlinks are not followed.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::types::FileKind;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

/// Supported files under `root`, sorted by path
pub fn discover(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| FileKind::from_path(p).is_some())
        .collect();

    found.sort();
    found
}

/// Run [`discover`] over several roots, dropping duplicates
pub fn discover_all<I, P>(roots: I, recursive: bool) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut all = Vec::new();
    for root in roots {
        let root = root.as_ref();
        if root.is_file() {
            if FileKind::from_path(root).is_some() {
                all.push(root.to_path_buf());
            }
            continue;
        }
        all.extend(discover(root, recursive));
    }
    all.sort();
    all.dedup();
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("invoice.pdf"), b"%PDF").unwrap();
        fs::write(root.join("notes.md"), b"# notes").unwrap();
        fs::write(root.join("setup.exe"), b"MZ").unwrap();
        fs::write(root.join(".secret.txt"), b"hidden").unwrap();
        fs::create_dir(root.join("photos")).unwrap();
        fs::write(root.join("photos").join("cat.jpeg"), b"jpeg").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache").join("thumb.png"), b"png").unwrap();
        dir
    }

    #[test]
    fn test_flat_discovery_filters_kinds() {
        let dir = fixture();
        let found = discover(dir.path(), false);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["invoice.pdf", "notes.md"]);
    }

    #[test]
    fn test_recursive_skips_hidden() {
        let dir = fixture();
        let found = discover(dir.path(), true);
        assert_eq!(found.len(), 3);
        assert!(found.iter().any(|p| p.ends_with("photos/cat.jpeg")));
        assert!(!found.iter().any(|p| p.to_string_lossy().contains(".cache")));
    }

    #[test]
    fn test_discover_all_accepts_files() {
        let dir = fixture();
        let file = dir.path().join("notes.md");
        let found = discover_all([dir.path().to_path_buf(), file.clone()], false);
        assert_eq!(found.iter().filter(|p| **p == file).count(), 1);
    }
}
