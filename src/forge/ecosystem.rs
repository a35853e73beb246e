//! Ecosystem detection and conventional build commands.
//!
//! The ecosystem of an acquired project is inferred from marker files:
//! a `package.json` marks a Node project, a `requirements.txt` or
//! `pyproject.toml` marks a Python project. Anything else is Unknown and
//! the build is skipped (not an error).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Language/toolchain family of an acquired project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Node,
    Python,
    Unknown,
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Ecosystem::Node => "node",
            Ecosystem::Python => "python",
            Ecosystem::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Detect the ecosystem of a project directory from its marker files.
pub fn detect(dir: &Path) -> Ecosystem {
    if dir.join("package.json").is_file() {
        Ecosystem::Node
    } else if dir.join("requirements.txt").is_file() || dir.join("pyproject.toml").is_file() {
        Ecosystem::Python
    } else {
        Ecosystem::Unknown
    }
}

/// The conventional dependency-install command for an ecosystem.
pub fn install_command(ecosystem: Ecosystem, dir: &Path) -> Option<String> {
    match ecosystem {
        Ecosystem::Node => Some("npm install".to_string()),
        Ecosystem::Python => {
            if dir.join("requirements.txt").is_file() {
                Some("pip install -r requirements.txt".to_string())
            } else {
                Some("pip install -e .".to_string())
            }
        }
        Ecosystem::Unknown => None,
    }
}

/// The conventional build command, if the project declares one.
///
/// Only Node manifests can declare a build step (`scripts.build`); the
/// conventional Python flow has no separate build.
pub fn build_command(ecosystem: Ecosystem, dir: &Path) -> Option<String> {
    match ecosystem {
        Ecosystem::Node => {
            let manifest = std::fs::read_to_string(dir.join("package.json")).ok()?;
            let parsed: serde_json::Value = serde_json::from_str(&manifest).ok()?;
            parsed
                .get("scripts")
                .and_then(|s| s.get("build"))
                .and_then(|b| b.as_str())
                .map(|_| "npm run build".to_string())
        }
        Ecosystem::Python | Ecosystem::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn empty_dir_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect(dir.path()), Ecosystem::Unknown);
        assert!(install_command(Ecosystem::Unknown, dir.path()).is_none());
        assert!(build_command(Ecosystem::Unknown, dir.path()).is_none());
    }

    #[test]
    fn package_json_marks_node() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name": "x"}"#);
        assert_eq!(detect(dir.path()), Ecosystem::Node);
        assert_eq!(
            install_command(Ecosystem::Node, dir.path()).as_deref(),
            Some("npm install")
        );
    }

    #[test]
    fn node_build_step_requires_declared_script() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name": "x", "scripts": {"test": "jest"}}"#);
        assert!(build_command(Ecosystem::Node, dir.path()).is_none());

        write(
            dir.path(),
            "package.json",
            r#"{"name": "x", "scripts": {"build": "tsc"}}"#,
        );
        assert_eq!(
            build_command(Ecosystem::Node, dir.path()).as_deref(),
            Some("npm run build")
        );
    }

    #[test]
    fn requirements_marks_python() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "requirements.txt", "requests\n");
        assert_eq!(detect(dir.path()), Ecosystem::Python);
        assert_eq!(
            install_command(Ecosystem::Python, dir.path()).as_deref(),
            Some("pip install -r requirements.txt")
        );
        assert!(build_command(Ecosystem::Python, dir.path()).is_none());
    }

    #[test]
    fn pyproject_only_installs_editable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pyproject.toml", "[project]\nname = \"x\"\n");
        assert_eq!(detect(dir.path()), Ecosystem::Python);
        assert_eq!(
            install_command(Ecosystem::Python, dir.path()).as_deref(),
            Some("pip install -e .")
        );
    }

    #[test]
    fn node_wins_over_python_markers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"name": "x"}"#);
        write(dir.path(), "requirements.txt", "requests\n");
        assert_eq!(detect(dir.path()), Ecosystem::Node);
    }

    #[test]
    fn malformed_manifest_means_no_build_step() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", "{not json");
        assert!(build_command(Ecosystem::Node, dir.path()).is_none());
    }
}
