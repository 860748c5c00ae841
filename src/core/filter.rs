use glob::{MatchOptions, Pattern};
use std::path::Path;

use super::error::FatalError;
use crate::utils::fs::display_path;

/// One `--include` / `--exclude` entry: a glob or a path prefix, optionally
/// narrowed to a single 1-based line with a `:<line>` suffix.
#[derive(Debug, Clone)]
struct PathRule {
    glob: Pattern,
    prefix: String,
    line: Option<u32>,
}

impl PathRule {
    fn parse(raw: &str) -> Result<Self, FatalError> {
        let (path, line) = match raw.rsplit_once(':') {
            Some((path, line)) if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) => {
                (path, line.parse::<u32>().ok())
            }
            _ => (raw, None),
        };
        let prefix = path
            .trim()
            .trim_start_matches("./")
            .trim_end_matches('/')
            .replace('\\', "/");
        let glob = Pattern::new(&prefix).map_err(|e| FatalError::InvalidPattern {
            pattern: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { glob, prefix, line })
    }

    /// Length of the pattern when it matches, so longer patterns can win.
    fn specificity(&self, path: &str, line: Option<u32>) -> Option<usize> {
        match (self.line, line) {
            (Some(_), None) => return None,
            (Some(want), Some(got)) if want != got => return None,
            _ => {}
        }
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let matched = self.prefix.is_empty()
            || self.glob.matches_with(path, options)
            || path == self.prefix
            || path.starts_with(&format!("{}/", self.prefix));
        matched.then_some(self.prefix.len())
    }
}

/// Decides which files, and which lines within them, a run may touch.
///
/// Without includes everything is in scope. With includes, a path must match
/// one of them. Includes win over excludes unless the matching exclude is the
/// longer pattern.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    includes: Vec<PathRule>,
    excludes: Vec<PathRule>,
}

impl PathFilter {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, FatalError> {
        Ok(Self {
            includes: includes
                .iter()
                .map(|p| PathRule::parse(p))
                .collect::<Result<_, _>>()?,
            excludes: excludes
                .iter()
                .map(|p| PathRule::parse(p))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Whether the file is loaded at all. A line-level include keeps its file
    /// in scope; a line-level exclude does not remove it.
    pub fn allows_file(&self, path: &Path) -> bool {
        let path = display_path(path);
        let include = self
            .includes
            .iter()
            .filter_map(|r| r.specificity(&path, r.line))
            .max();
        let exclude = self
            .excludes
            .iter()
            .filter_map(|r| r.specificity(&path, None))
            .max();
        self.decide(include, exclude)
    }

    /// Whether a change starting on `line` (1-based) is allowed.
    pub fn allows_line(&self, path: &Path, line: u32) -> bool {
        let path = display_path(path);
        let include = self
            .includes
            .iter()
            .filter_map(|r| r.specificity(&path, Some(line)))
            .max();
        let exclude = self
            .excludes
            .iter()
            .filter_map(|r| r.specificity(&path, Some(line)))
            .max();
        self.decide(include, exclude)
    }

    fn decide(&self, include: Option<usize>, exclude: Option<usize>) -> bool {
        match (self.includes.is_empty(), include, exclude) {
            (true, _, None) => true,
            (true, _, Some(_)) => false,
            (false, None, _) => false,
            (false, Some(inc), Some(exc)) => inc >= exc,
            (false, Some(_), None) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(includes: &[&str], excludes: &[&str]) -> PathFilter {
        let inc: Vec<String> = includes.iter().map(|s| s.to_string()).collect();
        let exc: Vec<String> = excludes.iter().map(|s| s.to_string()).collect();
        PathFilter::new(&inc, &exc).unwrap()
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        let f = filter(&[], &[]);
        assert!(f.allows_file(Path::new("src/A.java")));
        assert!(f.allows_line(Path::new("src/A.java"), 3));
    }

    #[test]
    fn test_includes_win_unless_exclude_is_longer() {
        let f = filter(&["src"], &["src/test"]);
        assert!(f.allows_file(Path::new("src/main/A.java")));
        assert!(!f.allows_file(Path::new("src/test/ATest.java")));
        assert!(!f.allows_file(Path::new("other/B.java")));

        let f = filter(&["src/test/Keep.java"], &["src/test"]);
        assert!(f.allows_file(Path::new("src/test/Keep.java")));
    }

    #[test]
    fn test_glob_patterns() {
        let f = filter(&[], &["**/generated/**"]);
        assert!(!f.allows_file(Path::new("src/generated/X.java")));
        assert!(f.allows_file(Path::new("src/main/X.java")));
    }

    #[test]
    fn test_line_suffix_narrows_to_one_line() {
        let f = filter(&["src/A.java:10"], &[]);
        assert!(f.allows_file(Path::new("src/A.java")));
        assert!(f.allows_line(Path::new("src/A.java"), 10));
        assert!(!f.allows_line(Path::new("src/A.java"), 11));
        assert!(!f.allows_file(Path::new("src/B.java")));

        let f = filter(&[], &["src/A.java:4"]);
        assert!(f.allows_file(Path::new("src/A.java")));
        assert!(!f.allows_line(Path::new("src/A.java"), 4));
        assert!(f.allows_line(Path::new("src/A.java"), 5));
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let err = PathFilter::new(&["src/[".to_string()], &[]).unwrap_err();
        assert!(matches!(err, FatalError::InvalidPattern { .. }));
    }
}
