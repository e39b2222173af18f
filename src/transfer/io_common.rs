use std::path::{Path, PathBuf};

/// The special output path that prints the summary.
pub const STDOUT: &str = "stdout";

/// Resolves a path found in a configuration file against the directory of
/// that file. Absolute paths are kept.
pub fn resolve_path(root: Option<&Path>, path: &str) -> String {
    let p = Path::new(path);
    match root {
        Some(r) if p.is_relative() => {
            let full: PathBuf = r.join(p);
            full.display().to_string()
        }
        _ => path.to_string(),
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_paths() {
        let root = Path::new("/data/configs");
        assert_eq!(
            resolve_path(Some(root), "input.csv"),
            "/data/configs/input.csv"
        );
        assert_eq!(resolve_path(Some(root), "/tmp/x.csv"), "/tmp/x.csv");
        assert_eq!(resolve_path(None, "input.csv"), "input.csv");
        assert_eq!(simplify_file_name("/data/configs/input.csv"), "input.csv");
    }
}
