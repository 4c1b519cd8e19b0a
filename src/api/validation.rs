use std::path::Path;

use crate::api::errors::ApiError;

/// An empty allow-list accepts any extension.
pub(crate) fn validate_submission_extension(
    filename: &str,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    if allowed_extensions.is_empty() {
        return Ok(());
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Submission '{filename}' must have a file extension"))
        })?;

    if allowed_extensions.iter().any(|allowed| allowed == &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")))
    }
}

pub(crate) fn decode_submission_text(filename: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
    String::from_utf8(bytes).map_err(|_| {
        ApiError::BadRequest(format!("Submission '{filename}' is not valid UTF-8 text"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(list: &[&str]) -> Vec<String> {
        list.iter().map(|ext| ext.to_string()).collect()
    }

    #[test]
    fn empty_allow_list_accepts_anything() {
        assert!(validate_submission_extension("Makefile", &[]).is_ok());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let list = allowed(&["py", "txt"]);
        assert!(validate_submission_extension("main.PY", &list).is_ok());
        assert!(validate_submission_extension("notes.md", &list).is_err());
        assert!(validate_submission_extension("README", &list).is_err());
    }

    #[test]
    fn non_utf8_is_rejected() {
        assert_eq!(decode_submission_text("a.py", b"print(1)".to_vec()).unwrap(), "print(1)");
        assert!(matches!(
            decode_submission_text("a.bin", vec![0xff, 0xfe, 0x00]),
            Err(ApiError::BadRequest(_))
        ));
    }
}
