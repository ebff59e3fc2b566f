//! Migration class and file naming
//!
//! A migration name such as `add_user_email` becomes the class name
//! `AddUserEmail` and the file `20260101120000_add_user_email.sql`. The
//! numeric prefix of the file name is the migration version.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::error::MigrationError;

/// CamelCase words, each optionally led by digits
pub const CLASS_NAME_PATTERN: &str = r"^([0-9]*[A-Z][a-z0-9]*)+$";

/// Format of the version prefix
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Upper-case the first letter of every word, then drop the separators
pub fn class_name(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn validate_class_name(class_name: &str) -> Result<(), MigrationError> {
    let rule = Regex::new(CLASS_NAME_PATTERN)?;
    if rule.is_match(class_name) {
        Ok(())
    } else {
        Err(MigrationError::InvalidClassName(class_name.to_string()))
    }
}

/// `CreateUserTable` → `create_user_table`
pub fn snake_case(class_name: &str) -> String {
    let mut out = String::with_capacity(class_name.len() + 4);
    for (i, c) in class_name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

pub fn version(now: DateTime<Utc>) -> String {
    now.format(VERSION_FORMAT).to_string()
}

pub fn file_name(version: &str, class_name: &str, extension: &str) -> String {
    format!("{}_{}.{}", version, snake_case(class_name), extension)
}

/// Version prefix of a migration file name (everything before the first `_`)
pub fn version_of(file_name: &str) -> &str {
    file_name.split('_').next().unwrap_or(file_name)
}

/// Map a migration file name back to its class name
///
/// Only names of the form `<digits>_<name>[.ext]` are migration files.
pub fn class_name_from_file(file_name: &str) -> Option<String> {
    let (prefix, rest) = file_name.split_once('_')?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let stem = match rest.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => rest,
    };
    if stem.is_empty() {
        return None;
    }
    Some(class_name(stem))
}

/// Class names of every migration already present in `dir`
pub fn existing_class_names(dir: &Path) -> Result<Vec<String>, MigrationError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(MigrationError::io(dir))? {
        let entry = entry.map_err(MigrationError::io(dir))?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str().and_then(class_name_from_file) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub fn ensure_unique(dir: &Path, class_name: &str) -> Result<(), MigrationError> {
    if existing_class_names(dir)?.iter().any(|n| n == class_name) {
        return Err(MigrationError::DuplicateClassName(class_name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("add_user_email"), "AddUserEmail");
        assert_eq!(class_name("2 users"), "2Users");
        assert_eq!(class_name("  create   posts "), "CreatePosts");
        assert_eq!(class_name("fixPK"), "FixPK");
        assert_eq!(class_name(""), "");
    }

    #[test]
    fn test_validate_class_name() {
        for ok in ["CreateUsers", "2Users", "V2Schema", "ABC"] {
            assert!(validate_class_name(ok).is_ok(), "{}", ok);
        }
        for bad in ["createUsers", "Create-Users", "", "123", "Créer"] {
            assert!(
                matches!(validate_class_name(bad), Err(MigrationError::InvalidClassName(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_file_name_and_version() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let name = file_name(&version(now), "AddUserEmail", "sql");

        assert_eq!(name, "20260304050607_add_user_email.sql");
        assert_eq!(version_of(&name), "20260304050607");
        assert_eq!(file_name("1", "2Users", "sql"), "1_2_users.sql");
    }

    #[test]
    fn test_class_name_from_file() {
        assert_eq!(
            class_name_from_file("20260304050607_add_user_email.sql").as_deref(),
            Some("AddUserEmail")
        );
        assert_eq!(class_name_from_file("1_2_users.sql").as_deref(), Some("2Users"));
        assert_eq!(class_name_from_file("README.md"), None);
        assert_eq!(class_name_from_file("v1_users.sql"), None);
    }

    #[test]
    fn test_uniqueness_scan() {
        let dir = tempdir().unwrap();
        assert!(ensure_unique(&dir.path().join("missing"), "Anything").is_ok());

        fs::write(dir.path().join("20250101000000_2_users.sql"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("20250101000001_archive")).unwrap();

        assert_eq!(existing_class_names(dir.path()).unwrap(), vec!["2Users"]);
        assert!(matches!(
            ensure_unique(dir.path(), "2Users"),
            Err(MigrationError::DuplicateClassName(_))
        ));
        assert!(ensure_unique(dir.path(), "Archive").is_ok());
    }
}
