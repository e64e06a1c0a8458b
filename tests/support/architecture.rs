use std::fs;
use std::path::{Path, PathBuf};

/// (crate-relative path, line number, line) of a rule violation.
pub type Hit = (String, usize, String);

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Every `.rs` file under `relative_dir`, sorted, with its contents.
fn sources(relative_dir: &str) -> Vec<(String, String)> {
    let root = manifest_dir();
    let mut pending = vec![root.join(relative_dir)];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).unwrap_or_else(|e| panic!("cannot list {}: {e}", dir.display()));
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|ext| ext.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let content = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
            (display_path(&root, &path), content)
        })
        .collect()
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Production lines (before the first `#[cfg(test)]`) containing any pattern.
pub fn find_lines_containing(relative_dir: &str, patterns: &[&str]) -> Vec<Hit> {
    let mut hits = Vec::new();
    for (file, content) in sources(relative_dir) {
        let production = content
            .lines()
            .enumerate()
            .take_while(|(_, line)| line.trim() != "#[cfg(test)]");
        for (idx, line) in production {
            if patterns.iter().any(|p| line.contains(p)) {
                hits.push((file.clone(), idx + 1, line.to_string()));
            }
        }
    }
    hits
}

pub fn path_exists(relative_path: &str) -> bool {
    manifest_dir().join(relative_path).exists()
}

/// Lines in `mod.rs` files other than docs, module declarations and re-exports.
pub fn find_non_export_lines_in_mod_files(relative_dir: &str) -> Vec<Hit> {
    const ALLOWED: [&str; 5] = ["//", "pub mod ", "mod ", "pub use ", "#[cfg"];

    sources(relative_dir)
        .into_iter()
        .filter(|(file, _)| file.ends_with("/mod.rs"))
        .flat_map(|(file, content)| {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| {
                    let line = line.trim();
                    !line.is_empty() && !ALLOWED.iter().any(|prefix| line.starts_with(prefix))
                })
                .map(|(idx, line)| (file.clone(), idx + 1, line.to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}
