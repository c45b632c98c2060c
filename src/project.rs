//! Laravel project discovery and preflight checks.

use crate::error::ProjectValidationError;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const REQUIRED_FILES: [&str; 2] = ["artisan", "composer.json"];

fn read_composer_manifest(project: &Path) -> Option<Value> {
    let content = fs::read_to_string(project.join("composer.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn manifest_lists(manifest: &Value, section: &str, package: &str) -> bool {
    manifest
        .get(section)
        .and_then(Value::as_object)
        .is_some_and(|deps| deps.contains_key(package))
}

pub fn is_laravel_project(path: &Path) -> bool {
    if !path.join("artisan").exists() || !path.join("composer.json").exists() {
        return false;
    }
    read_composer_manifest(path)
        .is_some_and(|manifest| manifest_lists(&manifest, "require", "laravel/framework"))
}

/// Direct child directories of `root` that are Laravel projects, by name.
pub fn list_projects(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut projects = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && is_laravel_project(&path) {
            projects.push(path);
        }
    }
    projects.sort_by_key(|p| {
        p.file_name()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    Ok(projects)
}

/// Collapses a doubled trailing segment such as `/code/projects/projects`.
pub fn normalize_projects_root(path: &Path) -> PathBuf {
    let parts: Vec<_> = path.components().collect();
    if parts.len() >= 2 && parts[parts.len() - 1] == parts[parts.len() - 2] {
        return parts[..parts.len() - 1].iter().collect();
    }
    path.to_path_buf()
}

/// Preflight before generating docker files: no side effects.
pub fn validate_project(project: &Path) -> Result<(), ProjectValidationError> {
    let missing: Vec<String> = REQUIRED_FILES
        .iter()
        .filter(|name| !project.join(name).is_file())
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProjectValidationError { missing })
    }
}

pub fn sail_installed(project: &Path) -> bool {
    read_composer_manifest(project)
        .is_some_and(|manifest| manifest_lists(&manifest, "require-dev", "laravel/sail"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_project(root: &Path, name: &str, composer: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("artisan"), "#!/usr/bin/env php\n").unwrap();
        fs::write(dir.join("composer.json"), composer).unwrap();
        dir
    }

    const LARAVEL: &str = r#"{"require":{"php":"^8.2","laravel/framework":"^11.0"}}"#;

    #[test]
    fn lists_only_laravel_projects_sorted_case_insensitively() {
        let root = tempdir().unwrap();
        make_project(root.path(), "zeta", LARAVEL);
        make_project(root.path(), "Alpha", LARAVEL);
        make_project(root.path(), "symfony", r#"{"require":{"symfony/console":"^7"}}"#);
        make_project(root.path(), "broken", "{not json");
        fs::create_dir_all(root.path().join("empty")).unwrap();
        fs::write(root.path().join("file.txt"), "x").unwrap();

        let names: Vec<String> = list_projects(root.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }

    #[test]
    fn normalize_collapses_doubled_segment() {
        assert_eq!(
            normalize_projects_root(Path::new("/code/projects/projects")),
            PathBuf::from("/code/projects")
        );
        assert_eq!(
            normalize_projects_root(Path::new("/code/projects")),
            PathBuf::from("/code/projects")
        );
    }

    #[test]
    fn validation_reports_missing_files() {
        let dir = tempdir().unwrap();
        let err = validate_project(dir.path()).unwrap_err();
        assert_eq!(err.missing, vec!["artisan", "composer.json"]);

        fs::write(dir.path().join("artisan"), "").unwrap();
        let err = validate_project(dir.path()).unwrap_err();
        assert_eq!(err.missing, vec!["composer.json"]);

        fs::write(dir.path().join("composer.json"), "{}").unwrap();
        assert!(validate_project(dir.path()).is_ok());
    }

    #[test]
    fn sail_detection_reads_require_dev() {
        let root = tempdir().unwrap();
        let without = make_project(root.path(), "plain", LARAVEL);
        let with = make_project(
            root.path(),
            "sail",
            r#"{"require":{"laravel/framework":"^11"},"require-dev":{"laravel/sail":"^1.26"}}"#,
        );
        let broken = make_project(root.path(), "broken", "{");
        assert!(!sail_installed(&without));
        assert!(sail_installed(&with));
        assert!(!sail_installed(&broken));
    }
}
