use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLATFORM_DIR: &str = ".platform";
pub const TOOLS_DIR: &str = ".platform/tools";
pub const CONFIG_FILE: &str = ".platform/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn tools_dir(root: &Path) -> PathBuf {
    root.join(TOOLS_DIR)
}

pub fn tool_record_path(root: &Path, tool_name: &str) -> PathBuf {
    tools_dir(root).join(format!("{tool_name}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_record_lives_under_tools_dir() {
        let p = tool_record_path(Path::new("/repo"), "list_pods");
        assert_eq!(p, PathBuf::from("/repo/.platform/tools/list_pods.json"));
    }
}
