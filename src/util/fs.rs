//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Expand `@file` arguments in place.
///
/// Any argument beginning with `@` is replaced by the whitespace-split
/// contents of the referenced file. Expansion is not recursive.
pub fn expand_arg_files(args: Vec<String>) -> Result<Vec<String>> {
    let mut expanded = Vec::with_capacity(args.len());
    for arg in args {
        match arg.strip_prefix('@') {
            Some(path) => {
                let contents = read_to_string(Path::new(path))?;
                expanded.extend(contents.split_whitespace().map(str::to_string));
            }
            None => expanded.push(arg),
        }
    }
    Ok(expanded)
}

/// Convert a dotted package name to a directory path (`com.x` -> `com/x`).
pub fn package_to_path(base: &Path, package: &str) -> PathBuf {
    let mut path = base.to_path_buf();
    for part in package.split('.') {
        path.push(part);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_arg_files() {
        let tmp = TempDir::new().unwrap();
        let list = tmp.path().join("args.txt");
        fs::write(&list, "one.flat\ntwo.flat three.flat\n").unwrap();

        let args = vec![
            "first".to_string(),
            format!("@{}", list.display()),
            "last".to_string(),
        ];
        let expanded = expand_arg_files(args).unwrap();
        assert_eq!(expanded, ["first", "one.flat", "two.flat", "three.flat", "last"]);
    }

    #[test]
    fn test_expand_missing_arg_file_fails() {
        let result = expand_arg_files(vec!["@/definitely/not/here".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_package_to_path() {
        assert_eq!(
            package_to_path(Path::new("gen"), "com.example.app"),
            Path::new("gen/com/example/app")
        );
    }
}
