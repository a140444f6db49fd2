//! Minimal `.env` support for the binary.
//!
//! Accepts `KEY=value`, optional `export ` prefix, `#` comments, and single or
//! double quoted values (double quotes understand `\n`, `\r`, `\t`, `\\`, `\"`).
//! Values already present in the process environment are never overwritten.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    /// Given with `--env-file` rather than found in the working directory.
    pub explicit: bool,
    pub applied: usize,
}

/// Load `explicit` if given (it must exist), otherwise `.env` from the working directory if present.
pub fn load(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path.to_path_buf(), true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            (path, false)
        }
    };

    let contents = fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let mut applied = 0;
    for (key, value) in parse(&contents).map_err(|e| format!("{}:{}", path.display(), e))? {
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(&key, value);
            }
            applied += 1;
        }
    }
    Ok(Some(LoadedEnvFile { path, explicit, applied }))
}

/// Parse a whole file. Errors carry the 1-based line number.
pub fn parse(contents: &str) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(pair)) => pairs.push(pair),
            Ok(None) => {}
            Err(e) => return Err(format!("{}: {}", index + 1, e)),
        }
    }
    Ok(pairs)
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let raw = raw.trim();
    let value = if let Some(rest) = raw.strip_prefix('"') {
        double_quoted(rest)?
    } else if let Some(rest) = raw.strip_prefix('\'') {
        single_quoted(rest)?
    } else {
        raw.split('#').next().unwrap_or_default().trim_end().to_string()
    };
    Ok(Some((key.to_string(), value)))
}

fn closing_tail(remainder: &str, quote: &str) -> Result<(), String> {
    let remainder = remainder.trim();
    if remainder.is_empty() || remainder.starts_with('#') {
        Ok(())
    } else {
        Err(format!("unexpected characters after closing {} quote", quote))
    }
}

fn double_quoted(input: &str) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            '"' => {
                closing_tail(chars.as_str(), "double")?;
                return Ok(value);
            }
            other => value.push(other),
        }
    }
    Err("unterminated double-quoted value".to_string())
}

fn single_quoted(input: &str) -> Result<String, String> {
    match input.split_once('\'') {
        Some((value, rest)) => {
            closing_tail(rest, "single")?;
            Ok(value.to_string())
        }
        None => Err("unterminated single-quoted value".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        let pairs = parse(
            "# credentials\n\
             INDEGO_USERNAME=me@example.com\n\
             export INDEGO_SERIAL = 123 # the garden one\n\
             INDEGO_PASSWORD=\"p#ss \\\"word\\\"\"\n\
             RUST_LOG='debug'\n\
             EMPTY=\n",
        )
        .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("INDEGO_USERNAME".to_string(), "me@example.com".to_string()),
                ("INDEGO_SERIAL".to_string(), "123".to_string()),
                ("INDEGO_PASSWORD".to_string(), "p#ss \"word\"".to_string()),
                ("RUST_LOG".to_string(), "debug".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn reports_line_of_bad_assignment() {
        let err = parse("A=1\nnot an assignment\n").unwrap_err();
        assert!(err.starts_with("2:"), "{}", err);
        assert!(parse("A=\"open").is_err());
        assert!(parse("A='x' trailing").is_err());
        assert!(parse("MY KEY=1").is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.env"))).is_err());
    }

    #[test]
    fn loads_without_overriding_existing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.env");
        std::fs::write(&path, "INDEGO_ENV_FILE_TEST_NEW=from-file\nPATH=overridden\n").unwrap();
        let loaded = load(Some(&path)).unwrap().unwrap();
        assert!(loaded.explicit);
        assert_eq!(loaded.applied, 1);
        assert_eq!(std::env::var("INDEGO_ENV_FILE_TEST_NEW").unwrap(), "from-file");
        assert_ne!(std::env::var("PATH").unwrap(), "overridden");
    }
}
