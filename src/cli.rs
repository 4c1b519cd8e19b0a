use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use uuid::Uuid;

use crate::core::{config::Settings, telemetry};
use crate::services::grading::{lock_session, GradingService, SessionHandle};
use crate::services::model;
use crate::services::records::GradedLog;
use crate::services::session::{Direction, GradingSession, UploadedFile};

/// Inputs for a terminal grading run. Missing text inputs are asked for on stdin.
#[derive(Debug, Clone)]
pub struct CliOptions {
    pub assignment: Option<String>,
    pub focus: Option<String>,
    pub dir: Option<PathBuf>,
    pub extension: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    graded: usize,
    failed: usize,
}

pub async fn run_cli(options: CliOptions) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_cli_tracing(&settings)?;

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut stdout = std::io::stdout();

    let assignment = match options.assignment {
        Some(value) => value,
        None => prompt_line(&mut input, &mut stdout, "Enter the assignment description: ")?,
    };
    let focus = match options.focus {
        Some(value) => value,
        None => prompt_line(
            &mut input,
            &mut stdout,
            "Enter the key points for grading (comma-separated, optional): ",
        )?,
    };
    let dir = match options.dir {
        Some(dir) => dir,
        None => PathBuf::from(prompt_line(
            &mut input,
            &mut stdout,
            "Enter the directory containing student submissions: ",
        )?),
    };
    drop(input);

    let files = load_submissions(&dir, &options.extension)?;
    let model = model::from_settings(&settings)?;
    tracing::info!(model = %model.describe(), files = files.len(), "Starting terminal grading run");

    let grading = GradingService::from_settings(&settings, model, Arc::new(GradedLog::new()));
    let session_id = Uuid::new_v4();
    let scratch = settings.storage().upload_dir.join(format!("cli-{session_id}"));
    let session: SessionHandle = Arc::new(Mutex::new(GradingSession::new(session_id, scratch)));
    lock_session(&session).start(&assignment, Some(focus.as_str()), files)?;

    let summary = grade_all(&grading, &session, &mut stdout).await;

    if let Err(err) = lock_session(&session).discard() {
        tracing::warn!(error = %err, "Failed to remove scratch directory");
    }

    let summary = summary?;
    tracing::info!(
        graded = summary.graded,
        failed = summary.failed,
        "Terminal grading run finished"
    );
    Ok(())
}

fn prompt_line(
    input: &mut impl BufRead,
    out: &mut impl Write,
    label: &str,
) -> anyhow::Result<String> {
    write!(out, "{label}")?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Reads every regular file directly inside `dir` whose extension matches. Files
/// that are not UTF-8 text are skipped with a warning.
fn load_submissions(dir: &Path, extension: &str) -> anyhow::Result<Vec<UploadedFile>> {
    let extension = extension.trim_start_matches('.');
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("cannot read directory {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let filename =
            path.file_name().and_then(|name| name.to_str()).unwrap_or("upload").to_string();
        let bytes =
            std::fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
        match String::from_utf8(bytes) {
            Ok(content) => files.push(UploadedFile { filename, content }),
            Err(_) => {
                tracing::warn!(file = %path.display(), "Skipping file that is not UTF-8 text")
            }
        }
    }

    if files.is_empty() {
        bail!("no .{extension} submissions found in {}", dir.display());
    }
    Ok(files)
}

/// Grades the batch front to back. A failed pass is reported and the run continues.
async fn grade_all(
    grading: &GradingService,
    session: &SessionHandle,
    out: &mut impl Write,
) -> anyhow::Result<RunSummary> {
    let total = lock_session(session).snapshot().total;
    let mut summary = RunSummary::default();

    for index in 0..total {
        if index > 0 {
            lock_session(session).advance(Direction::Next)?;
        }
        let submission_id = lock_session(session).current()?.id.clone();

        match grading.grade_current(session).await {
            Ok(result) => {
                summary.graded += 1;
                writeln!(out, "\nFeedback for {submission_id}:")?;
                writeln!(out, "{}", result.feedback)?;
                if !result.errors.is_empty() {
                    writeln!(out, "\nErrors:")?;
                    for (line, message) in &result.errors {
                        writeln!(out, "  line {line}: {message}")?;
                    }
                }
            }
            Err(err) => {
                summary.failed += 1;
                tracing::error!(submission_id, error = %err, "Grading pass failed");
                writeln!(out, "\nGrading failed for {submission_id}: {err}")?;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::model::ModelClient;
    use crate::test_support::{FailingModel, StaticModel};

    fn session_with(root: &tempfile::TempDir, files: Vec<UploadedFile>) -> SessionHandle {
        let id = Uuid::new_v4();
        let mut session = GradingSession::new(id, root.path().join(id.to_string()));
        session.start("Print a greeting", Some("style"), files).expect("start");
        Arc::new(Mutex::new(session))
    }

    fn file(name: &str) -> UploadedFile {
        UploadedFile { filename: name.to_string(), content: "print('hi')\n".to_string() }
    }

    fn service(model: Arc<dyn ModelClient>) -> GradingService {
        GradingService::new(model, Arc::new(GradedLog::new()), 150, Duration::from_secs(5))
    }

    #[test]
    fn load_submissions_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.TXT"), "first").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        std::fs::write(dir.path().join("binary.txt"), [0xffu8, 0xfe]).unwrap();
        std::fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let files = load_submissions(dir.path(), ".txt").expect("load");
        let names: Vec<_> = files.iter().map(|file| file.filename.as_str()).collect();
        assert_eq!(names, vec!["a.TXT", "b.txt"]);
        assert_eq!(files[0].content, "first");
    }

    #[test]
    fn load_submissions_requires_at_least_one_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.py"), "x").unwrap();
        assert!(load_submissions(dir.path(), "txt").is_err());
        assert!(load_submissions(&dir.path().join("missing"), "txt").is_err());
    }

    #[test]
    fn prompt_line_trims_input() {
        let mut input = std::io::Cursor::new(b"  Reverse a string \n".to_vec());
        let mut out = Vec::new();
        let value = prompt_line(&mut input, &mut out, "Task: ").expect("prompt");
        assert_eq!(value, "Reverse a string");
        assert_eq!(out, b"Task: ");
    }

    #[tokio::test]
    async fn grade_all_prints_feedback_for_every_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let session = session_with(&root, vec![file("b.txt"), file("a.txt")]);
        let model = StaticModel::new("1: use f-strings\n\nClear and short.");
        let grading = service(model.clone());

        let mut out = Vec::new();
        let summary = grade_all(&grading, &session, &mut out).await.expect("run");

        assert_eq!(summary, RunSummary { graded: 2, failed: 0 });
        assert_eq!(model.prompts().len(), 2);
        let printed = String::from_utf8(out).unwrap();
        let first = printed.find("Feedback for a.txt:").expect("a.txt");
        let second = printed.find("Feedback for b.txt:").expect("b.txt");
        assert!(first < second);
        assert!(printed.contains("line 1: use f-strings"));
        assert_eq!(grading.records().records_for("Unknown-Unknown").len(), 2);
    }

    #[tokio::test]
    async fn grade_all_continues_after_failures() {
        let root = tempfile::tempdir().expect("tempdir");
        let session = session_with(&root, vec![file("a.txt"), file("b.txt"), file("c.txt")]);
        let grading = service(Arc::new(FailingModel));

        let mut out = Vec::new();
        let summary = grade_all(&grading, &session, &mut out).await.expect("run");

        assert_eq!(summary, RunSummary { graded: 0, failed: 3 });
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Grading failed for c.txt"));
    }
}
