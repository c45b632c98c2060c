//! Injects the container-network defaults into a project's `.env`.
//!
//! The rewrite is line based: comments, blank lines, ordering and every
//! unrelated line survive byte for byte.

use crate::fs_guard::{write_atomic_text_file_preserving_mode, DEFAULT_FILE_MODE};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub const ENV_FILE: &str = ".env";
pub const DEFAULTS_BLOCK_HEADER: &str = "# --- docker defaults ---";

/// Always forced to these values; they point at compose service names.
pub const INFRA_OVERRIDES: [(&str, &str); 4] = [
    ("DB_HOST", "mysql"),
    ("DB_PORT", "3306"),
    ("MAIL_HOST", "mailpit"),
    ("MAIL_PORT", "1025"),
];

/// Filled in only when the project has no non-empty value of its own.
pub const MAIL_FALLBACKS: [(&str, &str); 4] = [
    ("MAIL_MAILER", "smtp"),
    ("MAIL_USERNAME", "null"),
    ("MAIL_PASSWORD", "null"),
    ("MAIL_ENCRYPTION", "null"),
];

/// Applies the defaults to `<project>/.env` and returns the keys that were
/// added or modified. A project without `.env` is left alone.
pub fn apply_defaults(project: &Path) -> io::Result<BTreeSet<String>> {
    let env_path = project.join(ENV_FILE);
    if !env_path.is_file() {
        debug!(path = %env_path.display(), "no env file, skipping defaults");
        return Ok(BTreeSet::new());
    }
    let content = fs::read_to_string(&env_path)?;
    let (rewritten, changed) = rewrite_env(&content);
    if !changed.is_empty() {
        write_atomic_text_file_preserving_mode(&env_path, &rewritten, DEFAULT_FILE_MODE)?;
        debug!(path = %env_path.display(), keys = ?changed, "updated env defaults");
    }
    Ok(changed)
}

/// Pure form of [`apply_defaults`]: returns the new file text and the changed keys.
/// The input's line ending (`\n` or `\r\n`) is kept.
pub fn rewrite_env(content: &str) -> (String, BTreeSet<String>) {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let existing = parse_values(content);
    let desired = desired_values(&existing);

    let mut changed = BTreeSet::new();
    let mut remaining: BTreeSet<&str> = desired.keys().map(String::as_str).collect();
    let mut lines: Vec<String> = Vec::new();

    for line in content.lines() {
        let Some((key, value)) = split_assignment(line) else {
            lines.push(line.to_string());
            continue;
        };
        match desired.get(key) {
            Some(wanted) => {
                remaining.remove(key);
                if unquote(value) == unquote(wanted) {
                    lines.push(line.to_string());
                } else {
                    lines.push(format!("{key}={wanted}"));
                    changed.insert(key.to_string());
                }
            }
            None => lines.push(line.to_string()),
        }
    }

    if !remaining.is_empty() {
        lines.push(String::new());
        lines.push(DEFAULTS_BLOCK_HEADER.to_string());
        for key in remaining {
            lines.push(format!("{key}={}", desired[key]));
            changed.insert(key.to_string());
        }
    }

    let mut rewritten = lines.join(newline);
    rewritten.push_str(newline);
    (rewritten, changed)
}

fn desired_values(existing: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut desired: BTreeMap<String, String> = INFRA_OVERRIDES
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (key, fallback) in MAIL_FALLBACKS {
        let value = existing
            .get(key)
            .filter(|value| !unquote(value).is_empty())
            .cloned()
            .unwrap_or_else(|| fallback.to_string());
        desired.insert(key.to_string(), value);
    }
    desired
}

/// Raw values by key; later assignments win.
fn parse_values(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(split_assignment)
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys(changed: &BTreeSet<String>) -> Vec<&str> {
        changed.iter().map(String::as_str).collect()
    }

    #[test]
    fn missing_env_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        let changed = apply_defaults(dir.path()).unwrap();
        assert!(changed.is_empty());
        assert!(!dir.path().join(ENV_FILE).exists());
    }

    #[test]
    fn overrides_db_host_and_keeps_unrelated_lines() {
        let dir = tempdir().unwrap();
        let input = "APP_NAME=Shop\n# database\nDB_HOST=old\n\nAPP_KEY = base64:abc\nnot an assignment\n";
        fs::write(dir.path().join(ENV_FILE), input).unwrap();

        let changed = apply_defaults(dir.path()).unwrap();
        let output = fs::read_to_string(dir.path().join(ENV_FILE)).unwrap();

        assert!(changed.contains("DB_HOST"));
        assert!(output.contains("\nDB_HOST=mysql\n"));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "APP_NAME=Shop");
        assert_eq!(lines[1], "# database");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], "APP_KEY = base64:abc");
        assert_eq!(lines[5], "not an assignment");
    }

    #[test]
    fn missing_keys_are_appended_in_a_marked_block() {
        let (output, changed) = rewrite_env("APP_NAME=Shop\n");
        assert_eq!(
            keys(&changed),
            vec![
                "DB_HOST",
                "DB_PORT",
                "MAIL_ENCRYPTION",
                "MAIL_HOST",
                "MAIL_MAILER",
                "MAIL_PASSWORD",
                "MAIL_PORT",
                "MAIL_USERNAME",
            ]
        );
        let expected = "APP_NAME=Shop\n\n# --- docker defaults ---\nDB_HOST=mysql\nDB_PORT=3306\nMAIL_ENCRYPTION=null\nMAIL_HOST=mailpit\nMAIL_MAILER=smtp\nMAIL_PASSWORD=null\nMAIL_PORT=1025\nMAIL_USERNAME=null\n";
        assert_eq!(output, expected);
    }

    #[test]
    fn existing_mail_credentials_are_preserved() {
        let input = "MAIL_MAILER=ses\nMAIL_USERNAME=\"team@example.com\"\nMAIL_PASSWORD=\nMAIL_ENCRYPTION=tls\n";
        let (output, changed) = rewrite_env(input);
        assert!(output.contains("MAIL_MAILER=ses\n"));
        assert!(output.contains("MAIL_USERNAME=\"team@example.com\"\n"));
        assert!(output.contains("MAIL_ENCRYPTION=tls\n"));
        assert!(output.contains("MAIL_PASSWORD=null\n"));
        assert!(changed.contains("MAIL_PASSWORD"));
        assert!(!changed.contains("MAIL_MAILER"));
        assert!(!changed.contains("MAIL_USERNAME"));
        assert!(!changed.contains("MAIL_ENCRYPTION"));
    }

    #[test]
    fn already_configured_file_is_not_rewritten() {
        let dir = tempdir().unwrap();
        let input = "DB_HOST=mysql\nDB_PORT=\"3306\"\nMAIL_HOST=mailpit\nMAIL_PORT=1025\nMAIL_MAILER=smtp\nMAIL_USERNAME=null\nMAIL_PASSWORD=null\nMAIL_ENCRYPTION=null";
        let path = dir.path().join(ENV_FILE);
        fs::write(&path, input).unwrap();

        let changed = apply_defaults(dir.path()).unwrap();

        assert!(changed.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), input);
    }

    #[test]
    fn second_application_changes_nothing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ENV_FILE), "DB_HOST=127.0.0.1\n").unwrap();
        assert!(!apply_defaults(dir.path()).unwrap().is_empty());
        let first = fs::read_to_string(dir.path().join(ENV_FILE)).unwrap();
        assert!(apply_defaults(dir.path()).unwrap().is_empty());
        assert_eq!(fs::read_to_string(dir.path().join(ENV_FILE)).unwrap(), first);
    }

    #[test]
    fn commented_defaults_do_not_count_as_present() {
        let (output, changed) = rewrite_env("# DB_HOST=mysql\n");
        assert!(output.starts_with("# DB_HOST=mysql\n"));
        assert!(changed.contains("DB_HOST"));
        assert!(output.ends_with("MAIL_USERNAME=null\n"));
    }

    #[test]
    fn crlf_files_keep_their_line_endings() {
        let input = "APP_NAME=Shop\r\n# local\r\nDB_HOST=127.0.0.1\r\nDB_PORT=3306\r\nMAIL_HOST=mailpit\r\nMAIL_PORT=1025\r\nMAIL_MAILER=smtp\r\nMAIL_USERNAME=null\r\nMAIL_PASSWORD=null\r\nMAIL_ENCRYPTION=null\r\n";
        let (output, changed) = rewrite_env(input);
        assert_eq!(keys(&changed), vec!["DB_HOST"]);
        assert_eq!(output, input.replace("DB_HOST=127.0.0.1", "DB_HOST=mysql"));
    }

    #[test]
    fn crlf_block_for_missing_keys_uses_crlf() {
        let (output, _) = rewrite_env("APP_NAME=Shop\r\n");
        assert!(output.starts_with("APP_NAME=Shop\r\n\r\n# --- docker defaults ---\r\nDB_HOST=mysql\r\n"));
        assert!(!output.replace("\r\n", "").contains('\n'));
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_env_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join(ENV_FILE);
        fs::write(&path, "APP_KEY=base64:secret\nDB_HOST=127.0.0.1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let changed = apply_defaults(dir.path()).unwrap();

        assert!(changed.contains("DB_HOST"));
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
