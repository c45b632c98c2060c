//! Generates the docker files a Laravel project needs.

use crate::env_defaults::apply_defaults;
use crate::error::{AppError, MountError};
use crate::fs_guard::{
    backup, ensure_directory, ensure_file, write_atomic_text_file_preserving_mode, DEFAULT_FILE_MODE,
};
use crate::marker::MarkerStore;
use crate::project::validate_project;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const COMPOSE_OVERRIDE_FILE: &str = "docker-compose.override.yml";
pub const COMPOSE_YAML_FILE: &str = "compose.yaml";

const COMPOSE_TEMPLATE: &str = include_str!("../templates/docker-compose.yml");
const NGINX_TEMPLATE: &str = include_str!("../templates/nginx-default.conf");
const DOCKERFILE_TEMPLATE: &str = include_str!("../templates/php.Dockerfile");
const PHP_INI_TEMPLATE: &str = include_str!("../templates/zz-overrides.ini");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Back up an existing compose file and drop the override file.
    pub overwrite_compose: bool,
    pub update_env: bool,
    /// Rename `compose.yaml`, which compose would otherwise prefer.
    pub disable_compose_yaml: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            overwrite_compose: true,
            update_env: true,
            disable_compose_yaml: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateReport {
    pub actions: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn generate<M: MarkerStore>(
    project: &Path,
    options: &GenerateOptions,
    markers: &M,
) -> Result<GenerateReport, AppError> {
    validate_project(project)?;

    let mut report = GenerateReport::default();
    if markers.is_initialized(project) {
        report.warnings.push(
            "Existing MySQL data detected. If credentials changed, consider running `docker compose down -v`."
                .to_string(),
        );
    }

    let docker_dir = project.join("docker");
    let nginx_dir = docker_dir.join("nginx");
    let php_dir = docker_dir.join("php");
    for dir in [&docker_dir, &nginx_dir, &php_dir] {
        ensure_directory(dir)?;
    }
    report
        .actions
        .push("Ensured docker/, nginx/, php/ directories".to_string());

    let static_files = [
        (nginx_dir.join("default.conf"), NGINX_TEMPLATE, "nginx default.conf"),
        (php_dir.join("Dockerfile"), DOCKERFILE_TEMPLATE, "PHP Dockerfile"),
        (php_dir.join("zz-overrides.ini"), PHP_INI_TEMPLATE, "PHP ini overrides"),
    ];
    for (path, content, label) in &static_files {
        if ensure_file(path, content)? {
            report.actions.push(format!("Generated {label}"));
        } else {
            report.actions.push(format!("Kept existing {label}"));
        }
    }

    let compose_path = project.join(COMPOSE_FILE);
    let override_path = project.join(COMPOSE_OVERRIDE_FILE);
    if compose_path.is_dir() {
        return Err(MountError::ExpectedFile(compose_path).into());
    }
    if options.overwrite_compose {
        if compose_path.exists() {
            let saved = backup(&compose_path)?;
            report
                .actions
                .push(format!("Backed up {COMPOSE_FILE} → {}", file_name(&saved)));
        }
        if override_path.is_file() {
            let saved = backup(&override_path)?;
            fs::remove_file(&override_path)?;
            report.actions.push(format!(
                "Removed {COMPOSE_OVERRIDE_FILE} (backup → {})",
                file_name(&saved)
            ));
        }
    }
    write_atomic_text_file_preserving_mode(&compose_path, COMPOSE_TEMPLATE, DEFAULT_FILE_MODE)?;
    report
        .actions
        .push(format!("Generated {COMPOSE_FILE} (authoritative)"));

    let compose_yaml = project.join(COMPOSE_YAML_FILE);
    if compose_yaml.is_file() {
        if options.disable_compose_yaml {
            let renamed = project.join(format!("{COMPOSE_YAML_FILE}.bak"));
            fs::rename(&compose_yaml, &renamed)?;
            report
                .actions
                .push(format!("Renamed {COMPOSE_YAML_FILE} → {}", file_name(&renamed)));
        } else {
            report.warnings.push(format!(
                "{COMPOSE_YAML_FILE} found; Docker prefers it over {COMPOSE_FILE}"
            ));
        }
    }

    if options.update_env {
        let changed = apply_defaults(project)?;
        if changed.is_empty() {
            report.actions.push("No .env changes required".to_string());
        } else {
            let keys: Vec<&str> = changed.iter().map(String::as_str).collect();
            report
                .actions
                .push(format!("Updated .env keys: {}", keys.join(", ")));
        }
    }

    info!(project = %project.display(), actions = report.actions.len(), "generated docker files");
    Ok(report)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
