//! Source tree resolution for self-analysis and self-modification.

use std::path::{Path, PathBuf};

/// Directories never descended into: dependency caches, build output,
/// and virtualenvs. Hidden directories are excluded separately.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    "venv",
    ".venv",
    "vendor",
];

/// File extensions considered source.
const SOURCE_EXTENSIONS: &[&str] = &["rs", "ts", "js", "py", "json", "toml", "md"];

/// Resolve analysis/modification targets.
///
/// Explicit paths are filtered to files that exist; otherwise the
/// designated roots are walked recursively up to `cap` files.
pub fn resolve_targets(
    explicit: Option<&[PathBuf]>,
    roots: &[PathBuf],
    cap: usize,
) -> Vec<PathBuf> {
    match explicit {
        Some(paths) => paths
            .iter()
            .filter(|p| p.is_file())
            .take(cap)
            .cloned()
            .collect(),
        None => {
            let mut files = Vec::new();
            for root in roots {
                if files.len() >= cap {
                    break;
                }
                walk(root, cap, &mut files);
            }
            files
        }
    }
}

fn walk(dir: &Path, cap: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if out.len() >= cap {
            return;
        }
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            if EXCLUDED_DIRS.iter().any(|d| *d == name) {
                continue;
            }
            walk(&path, cap, out);
        } else if is_source_file(&path) {
            out.push(path);
        }
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Keep only paths inside one of the safe subtrees.
pub fn restrict_to_safe_dirs(paths: Vec<PathBuf>, safe_dirs: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|path| {
            safe_dirs.iter().any(|safe| {
                let safe = if safe.is_absolute() {
                    safe.clone()
                } else {
                    std::env::current_dir().unwrap_or_default().join(safe)
                };
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    std::env::current_dir().unwrap_or_default().join(path)
                };
                path.starts_with(&safe)
            })
        })
        .collect()
}

/// Detect the language of a file from its extension.
pub fn detect_language(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("rs") => "rust",
        Some("ts") => "typescript",
        Some("js") => "javascript",
        Some("py") => "python",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("md") => "markdown",
        _ => "text",
    }
}
