use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::services::session::{Direction, UploadedFile};
use crate::services::store::Submission;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) model: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionCreatedResponse {
    pub(crate) session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NavigateRequest {
    pub(crate) direction: Direction,
}

#[derive(Debug, Serialize)]
pub(crate) struct CurrentSubmissionResponse {
    pub(crate) cursor: usize,
    pub(crate) total: usize,
    pub(crate) submission: Submission,
}

/// Multipart batch upload after the raw fields have been collected.
#[derive(Debug, Validate)]
pub(crate) struct BatchForm {
    #[validate(length(min = 1, message = "assignment must not be empty"))]
    pub(crate) assignment: String,
    pub(crate) focus: Option<String>,
    #[validate(length(min = 1, message = "at least one submission file is required"))]
    pub(crate) files: Vec<UploadedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> UploadedFile {
        UploadedFile { filename: "a.py".to_string(), content: "print(1)".to_string() }
    }

    #[test]
    fn batch_form_requires_assignment_and_files() {
        let valid = BatchForm {
            assignment: "Sum two numbers".to_string(),
            focus: None,
            files: vec![file()],
        };
        assert!(valid.validate().is_ok());

        let no_files = BatchForm { files: Vec::new(), ..valid };
        let errors = no_files.validate().expect_err("empty file list");
        assert!(errors.field_errors().contains_key("files"));

        let no_assignment =
            BatchForm { assignment: String::new(), focus: None, files: vec![file()] };
        let errors = no_assignment.validate().expect_err("blank assignment");
        assert!(errors.field_errors().contains_key("assignment"));
    }
}
