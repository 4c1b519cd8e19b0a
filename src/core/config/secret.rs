use std::fs;
use std::path::Path;

use super::parsing::env_optional;
use super::types::ConfigError;

/// Resolves a credential from `KEY` or, failing that, from the file named by `KEY_FILE`.
/// Returns an empty string when neither is set; callers decide whether that is fatal.
pub(super) fn load_secret(field: &'static str) -> Result<String, ConfigError> {
    if let Some(value) = env_optional(field) {
        return Ok(value);
    }

    let file_var = format!("{field}_FILE");
    match env_optional(&file_var) {
        Some(path) => read_secret_file(field, Path::new(&path)),
        None => Ok(String::new()),
    }
}

fn read_secret_file(field: &'static str, path: &Path) -> Result<String, ConfigError> {
    let value = fs::read_to_string(path).map_err(|source| ConfigError::SecretFile {
        field,
        path: path.display().to_string(),
        source,
    })?;

    let trimmed = value.trim();
    if trimmed.is_empty() {
        tracing::warn!(path = %path.display(), field, "Secret file is empty");
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_secret_file_trims_trailing_newline() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "sk-test-key").expect("write secret");

        let value = read_secret_file("OPENAI_API_KEY", file.path()).expect("secret");
        assert_eq!(value, "sk-test-key");
    }

    #[test]
    fn read_secret_file_reports_missing_path() {
        let err = read_secret_file("OPENAI_API_KEY", Path::new("/nonexistent/__secrets/openai"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::SecretFile { field: "OPENAI_API_KEY", .. }));
    }
}
