use platform_core::paths::PLATFORM_DIR;
use std::path::{Path, PathBuf};

/// Resolve the workspace root.
///
/// Priority:
/// 1. `--root` flag / `PLATFORM_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.platform/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_marker(&cwd, PLATFORM_DIR)
        .or_else(|| find_marker(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_marker(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn platform_dir_found_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".platform")).unwrap();
        let subdir = dir.path().join("src/deep");
        std::fs::create_dir_all(&subdir).unwrap();
        assert_eq!(find_marker(&subdir, PLATFORM_DIR).unwrap(), dir.path());
    }

    #[test]
    fn platform_dir_preferred_over_git() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let inner = dir.path().join("ops");
        std::fs::create_dir_all(inner.join(".platform")).unwrap();
        let start = inner.join("plans");
        std::fs::create_dir_all(&start).unwrap();
        assert_eq!(find_marker(&start, PLATFORM_DIR).unwrap(), inner);
        assert_eq!(find_marker(&start, ".git").unwrap(), dir.path());
    }
}
