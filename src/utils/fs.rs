use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::model::source::Language;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "build", "out", "__pycache__"];

fn is_walkable(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !(entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}

/// Every source file under `root` in a language we handle, as root-relative
/// paths in sorted order. Hidden entries and build output are skipped;
/// unreadable directory entries are ignored.
pub fn find_source_files(root: &Path) -> Vec<PathBuf> {
    let mut results: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(is_walkable)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| Language::from_path(e.path()).is_some())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(normalize))
        .collect();
    results.sort();
    results
}

/// `/`-separated form of a relative path, without `.` components.
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// The path as matched by include/exclude patterns.
pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_source_files() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/main/java/com/acme")).unwrap();
        fs::create_dir_all(tmp.path().join("src/main/webapp/WEB-INF")).unwrap();
        fs::write(tmp.path().join("src/main/java/com/acme/B.java"), "class B {}").unwrap();
        fs::write(tmp.path().join("src/main/java/com/acme/A.java"), "class A {}").unwrap();
        fs::write(tmp.path().join("src/main/webapp/WEB-INF/web.xml"), "<web-app/>").unwrap();
        fs::write(tmp.path().join("README.md"), "# Hi").unwrap();

        let results = find_source_files(tmp.path());
        assert_eq!(
            results,
            vec![
                PathBuf::from("src/main/java/com/acme/A.java"),
                PathBuf::from("src/main/java/com/acme/B.java"),
                PathBuf::from("src/main/webapp/WEB-INF/web.xml"),
            ]
        );
    }

    #[test]
    fn test_skips_hidden_and_build_dirs() {
        let tmp = TempDir::new().unwrap();
        for dir in [".git", "target/classes", "build", "node_modules/x"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
            fs::write(tmp.path().join(dir).join("X.java"), "class X {}").unwrap();
        }
        fs::write(tmp.path().join("Main.java"), "class Main {}").unwrap();
        assert_eq!(find_source_files(tmp.path()), vec![PathBuf::from("Main.java")]);
    }

    #[test]
    fn test_normalize_drops_current_dir() {
        assert_eq!(normalize(Path::new("./src/./A.java")), PathBuf::from("src/A.java"));
    }
}
