//! Glob-based file search shared by discovery and history loading.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;
use walkdir::WalkDir;

/// Compiles a glob where `*` stops at path separators and `**` crosses them.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Recursively finds files under `root` matching `include` but not `exclude`.
///
/// Relative patterns are matched against the path relative to `root`;
/// absolute patterns against the full path. Unreadable directory entries
/// are skipped. The result is sorted.
pub fn find_files(
    root: &Path,
    include: &str,
    exclude: Option<&str>,
) -> Result<Vec<PathBuf>, globset::Error> {
    let include = PathGlob::new(include)?;
    let exclude = exclude.map(PathGlob::new).transpose()?;

    let matches = |glob: &PathGlob, path: &Path| {
        if glob.absolute {
            glob.matcher.is_match(path)
        } else {
            glob.matcher.is_match(path.strip_prefix(root).unwrap_or(path))
        }
    };

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| matches(&include, path))
        .filter(|path| match &exclude {
            Some(exclude) if matches(exclude, path) => {
                debug!("Excluding file {}", path.display());
                false
            }
            _ => true,
        })
        .collect();

    files.sort();
    Ok(files)
}

struct PathGlob {
    matcher: GlobMatcher,
    absolute: bool,
}

impl PathGlob {
    fn new(pattern: &str) -> Result<Self, globset::Error> {
        Ok(Self {
            matcher: compile_glob(pattern)?,
            absolute: Path::new(pattern).is_absolute(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn relative(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_find_files_with_include_and_exclude() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "core/src/test/java/a/FooTest.java");
        touch(root, "core/src/test/java/a/Helper.java");
        touch(root, "web/src/test/java/b/BarTest.java");
        touch(root, "web/src/test/java/b/integration/SlowTest.java");

        let files = find_files(root, "**/src/test/java/**/*Test.java", Some("**/integration/**"))
            .unwrap();
        assert_eq!(
            relative(root, &files),
            vec![
                "core/src/test/java/a/FooTest.java",
                "web/src/test/java/b/BarTest.java"
            ]
        );
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "TopTest.java");
        touch(root, "nested/InnerTest.java");

        let files = find_files(root, "*Test.java", None).unwrap();
        assert_eq!(relative(root, &files), vec!["TopTest.java"]);
    }

    #[test]
    fn test_invalid_glob() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_files(temp_dir.path(), "a[", None).is_err());
    }
}
